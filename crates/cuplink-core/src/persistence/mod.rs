// ── Persistence ──
//
// Pooled connections, the per-worker transaction context, and the
// in-memory sensor table.

mod memory;
mod pool;
mod transaction;

pub use memory::{MemoryConnection, MemoryPool};
pub use pool::{ConnectionPool, PooledConnection, SensorRepository};
pub use transaction::TransactionContext;
