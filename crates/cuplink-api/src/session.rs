// ── Broker session capability ──
//
// The narrow set of operations the connector needs from a broker client.
// `MqttSession` is the production implementation; tests supply fakes.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::envelope::{PublishEnvelope, Qos};
use crate::error::Error;

/// A message delivered by the broker on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// Everything a session reports back to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A PUBLISH on the subscribed filter.
    Message(InboundMessage),
    /// The link dropped after the session was open. The session does not
    /// reconnect on its own; subscriptions are gone with the link.
    LinkLost { reason: String },
}

/// One long-lived session with a publish/subscribe broker.
///
/// Implementations must be safe to share between the connector's
/// background loops and request workers.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// Open the session. Inbound deliveries and link loss are pushed into
    /// `events` until the session is closed.
    async fn open(&self, events: mpsc::Sender<SessionEvent>) -> Result<(), Error>;

    async fn subscribe(&self, filter: &str, qos: Qos) -> Result<(), Error>;

    async fn publish(&self, envelope: PublishEnvelope) -> Result<(), Error>;

    async fn close(&self) -> Result<(), Error>;

    fn is_connected(&self) -> bool;

    /// Human-readable broker address, for logs.
    fn endpoint(&self) -> String;
}
