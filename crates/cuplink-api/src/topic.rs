// Topic naming shared by the subscriber and every outbound publish.

/// MQTT topic level separator.
pub const LEVEL_SEPARATOR: &str = "/";

const SINGLE_LEVEL_WILDCARD: &str = "+";
const PUBLISHER_SUFFIX: &str = "publisher";

/// Topic layout rooted at the server name and scoped to one device type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    server_name: String,
    device_type: String,
}

impl TopicScheme {
    pub fn new(server_name: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            device_type: device_type.into(),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    /// `{server}/+/{deviceType}/+/publisher`: every device of this type,
    /// under any owner.
    pub fn subscribe_filter(&self) -> String {
        [
            self.server_name.as_str(),
            SINGLE_LEVEL_WILDCARD,
            self.device_type.as_str(),
            SINGLE_LEVEL_WILDCARD,
            PUBLISHER_SUFFIX,
        ]
        .join(LEVEL_SEPARATOR)
    }

    /// `{server}/{owner}/{deviceType}/{deviceId}`
    pub fn publish_topic(&self, owner: &str, device_id: &str) -> String {
        [
            self.server_name.as_str(),
            owner,
            self.device_type.as_str(),
            device_id,
        ]
        .join(LEVEL_SEPARATOR)
    }
}
