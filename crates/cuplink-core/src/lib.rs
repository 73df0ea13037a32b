// cuplink-core: Connector lifecycle, device bindings, sensor cache and
// persistence between cuplink-api and the request handlers.

pub mod config;
pub mod connector;
pub mod error;
pub mod model;
pub mod persistence;
pub mod registry;
pub mod service;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::ConnectorConfig;
pub use connector::{ConnectionState, IgnoreInbound, InboundHandler, TransportConnector};
pub use error::{CoreError, PersistenceError};
pub use model::{DeviceBinding, DevicePush, SensorKind, SensorRecord};
pub use persistence::{
    ConnectionPool, MemoryConnection, MemoryPool, PooledConnection, SensorRepository,
    TransactionContext,
};
pub use registry::{DeviceRegistry, OriginCheck};
pub use service::{
    AnalyticsSink, CupContext, CupService, DeviceValidator, ReadResponse,
    RegistryOwnershipValidator, ResponseStatus, TracingAnalyticsSink,
};
pub use store::SensorStore;
