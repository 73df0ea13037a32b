// ── Runtime connector configuration ──
//
// Describes *where* the connector publishes and *how* it retries. Built by
// the binary from cuplink-config and handed in; core never reads files.

use std::time::Duration;

use cuplink_api::{Qos, TopicScheme};

/// Topic layout and retry tuning for a [`TransportConnector`](crate::TransportConnector).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// Root segment of every topic (the device-management server name).
    pub server_name: String,
    /// Device type segment, e.g. `connectedcup`.
    pub device_type: String,
    /// Fixed wait between connect or disconnect attempts.
    pub retry_interval: Duration,
    /// QoS for every publish and the subscription.
    pub qos: Qos,
}

impl ConnectorConfig {
    pub fn topic_scheme(&self) -> TopicScheme {
        TopicScheme::new(self.server_name.clone(), self.device_type.clone())
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            server_name: "iotserver".into(),
            device_type: "connectedcup".into(),
            retry_interval: Duration::from_secs(5),
            qos: Qos::AtMostOnce,
        }
    }
}
