use thiserror::Error;

/// Top-level error type for the `cuplink-api` crate.
///
/// Every broker-facing failure lands here: malformed publish arguments,
/// connect/subscribe/publish/close failures and broker configuration
/// problems. `cuplink-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Publish arguments ───────────────────────────────────────────
    /// Wrong number of publish arguments.
    #[error(
        "Incorrect number of publish arguments: expected {expected} \
         [owner, deviceId, resource, state], got {got}"
    )]
    InvalidArity { expected: usize, got: usize },

    /// A publish argument has the wrong shape (empty, or contains a topic wildcard).
    #[error("Malformed publish argument '{field}': {reason}")]
    MalformedArgument { field: &'static str, reason: String },

    /// Payload could not be decoded as `{resource}:{state}`.
    #[error("Invalid device payload: {0}")]
    InvalidPayload(String),

    /// QoS level outside 0..=2.
    #[error("Invalid QoS level {0} (expected 0, 1 or 2)")]
    InvalidQos(u8),

    // ── Broker configuration ────────────────────────────────────────
    /// Broker URL could not be parsed or uses an unsupported scheme.
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),

    // ── Session lifecycle ───────────────────────────────────────────
    /// Opening the broker session failed.
    #[error("Connection to MQTT broker at {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    /// Subscribing to the topic filter failed.
    #[error("Subscription to '{filter}' failed: {reason}")]
    Subscribe { filter: String, reason: String },

    /// Sending a message failed.
    #[error("Publishing to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    /// Closing the broker session failed.
    #[error("Closing MQTT session failed: {0}")]
    Close(String),

    /// Operation requires an open session.
    #[error("MQTT session is not connected")]
    NotConnected,
}

impl Error {
    /// Returns `true` if the caller supplied bad arguments (retrying won't help).
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidArity { .. }
                | Self::MalformedArgument { .. }
                | Self::InvalidPayload(_)
                | Self::InvalidQos(_)
        )
    }
}
