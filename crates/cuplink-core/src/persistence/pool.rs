// Pool and connection capabilities the transaction context is written against.

use crate::error::PersistenceError;
use crate::model::{SensorKind, SensorRecord};

/// A connection checked out of a [`ConnectionPool`].
///
/// Closing returns it to the pool; after `close` the value is dropped.
pub trait PooledConnection: Send {
    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), PersistenceError>;

    fn commit(&mut self) -> Result<(), PersistenceError>;

    fn rollback(&mut self) -> Result<(), PersistenceError>;

    fn close(&mut self) -> Result<(), PersistenceError>;
}

/// Source of connections shared by every worker.
///
/// Concurrency limits are the pool's own business; `acquire` fails when it
/// cannot yield a connection.
pub trait ConnectionPool: Send + Sync {
    type Conn: PooledConnection;

    fn acquire(&self) -> Result<Self::Conn, PersistenceError>;
}

/// Access to the sensor table through a connection.
pub trait SensorRepository {
    fn upsert_reading(&mut self, record: &SensorRecord) -> Result<(), PersistenceError>;

    fn latest_reading(
        &mut self,
        device_id: &str,
        kind: SensorKind,
    ) -> Result<Option<SensorRecord>, PersistenceError>;
}
