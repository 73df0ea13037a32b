// ── Core error types ──
//
// Domain errors from cuplink-core. Transport failures from cuplink-api are
// translated by the `From` impl below; persistence failures have their
// own enum because the data-access layer reports them independently.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Transport errors ─────────────────────────────────────────────
    #[error("Invalid publish request: {message}")]
    InvalidRequest { message: String },

    #[error("Transport failure: {message}")]
    Transport { message: String },

    #[error("Connector is not connected to the broker")]
    ConnectorDisconnected,

    // ── Authorization ────────────────────────────────────────────────
    #[error("Device {device_id} does not belong to owner {owner}")]
    AuthorizationDenied { owner: String, device_id: String },

    // ── Collaborators ────────────────────────────────────────────────
    #[error("Device management lookup failed: {message}")]
    DeviceManagement { message: String },

    #[error("Analytics forwarding failed: {message}")]
    Analytics { message: String },

    // ── Persistence ──────────────────────────────────────────────────
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Failures of the pooled-connection data-access layer.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Error occurred while retrieving datasource connection: {reason}")]
    Acquire { reason: String },

    #[error("Connection pool exhausted ({max} connections in use)")]
    PoolExhausted { max: usize },

    #[error("A transaction is already active for this unit of work")]
    TransactionActive,

    #[error("Error occurred while committing the transaction: {reason}")]
    Commit { reason: String },

    #[error("Error occurred while rolling back the transaction: {reason}")]
    Rollback { reason: String },

    #[error("Error occurred while closing the connection: {reason}")]
    Close { reason: String },

    #[error("Query failed: {reason}")]
    Query { reason: String },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<cuplink_api::Error> for CoreError {
    fn from(err: cuplink_api::Error) -> Self {
        match err {
            cuplink_api::Error::NotConnected => CoreError::ConnectorDisconnected,
            e if e.is_invalid_input() => CoreError::InvalidRequest {
                message: e.to_string(),
            },
            cuplink_api::Error::InvalidBrokerUrl(reason) => CoreError::Config {
                message: format!("Invalid broker URL: {reason}"),
            },
            e => CoreError::Transport {
                message: e.to_string(),
            },
        }
    }
}

impl CoreError {
    /// Returns `true` if the error was raised by a transport operation.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest { .. } | Self::Transport { .. } | Self::ConnectorDisconnected
        )
    }
}
