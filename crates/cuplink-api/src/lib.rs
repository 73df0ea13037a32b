// cuplink-api: MQTT session, topic scheme and payload codec for connected cups

pub mod envelope;
pub mod error;
pub mod mqtt;
pub mod retry;
pub mod session;
pub mod topic;

pub use envelope::{DevicePayload, PUBLISH_ARITY, PublishEnvelope, PublishRequest, Qos};
pub use error::Error;
pub use mqtt::{BrokerConfig, MqttSession};
pub use retry::{Retried, retry_fixed};
pub use session::{BrokerSession, InboundMessage, SessionEvent};
pub use topic::TopicScheme;
