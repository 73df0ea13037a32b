// ── Domain model ──
//
// Sensor readings, device bindings and the push body devices send.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Which sensor a reading came from.
///
/// Displays as the sensor name used by the data store (`temperature`,
/// `level`); [`resource_token`](Self::resource_token) gives the upper-case
/// resource the device firmware listens for.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SensorKind {
    Temperature,
    Level,
}

impl SensorKind {
    /// Resource context as the device API spells it.
    pub fn context(self) -> &'static str {
        match self {
            Self::Temperature => "/TEMPERATURE/",
            Self::Level => "/LEVEL/",
        }
    }

    /// Context with the slashes stripped: `TEMPERATURE` or `LEVEL`.
    pub fn resource_token(self) -> String {
        self.context().replace('/', "")
    }
}

/// Latest reading for one (device, sensor) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorRecord {
    pub device_id: String,
    pub sensor_kind: SensorKind,
    pub value: f64,
    pub observed_at_epoch_millis: i64,
}

impl SensorRecord {
    pub fn new(
        device_id: impl Into<String>,
        sensor_kind: SensorKind,
        value: f64,
        observed_at_epoch_millis: i64,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            sensor_kind,
            value,
            observed_at_epoch_millis,
        }
    }

    /// A reading stamped with the current wall-clock time.
    pub fn now(device_id: impl Into<String>, sensor_kind: SensorKind, value: f64) -> Self {
        Self::new(device_id, sensor_kind, value, Utc::now().timestamp_millis())
    }
}

/// The network address a device is allowed to push from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceBinding {
    pub device_id: String,
    pub bound_network_address: String,
}

/// Body of a device push.
///
/// `reply` is the address the device claims to be sending from; it is
/// checked against the device's binding before anything is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePush {
    pub device_id: String,
    pub reply: String,
    pub value: f64,
    pub owner: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn resource_tokens_strip_slashes() {
        assert_eq!(SensorKind::Temperature.resource_token(), "TEMPERATURE");
        assert_eq!(SensorKind::Level.resource_token(), "LEVEL");
    }

    #[test]
    fn sensor_kind_names() {
        assert_eq!(SensorKind::Temperature.to_string(), "temperature");
        assert_eq!(SensorKind::from_str("LEVEL").unwrap(), SensorKind::Level);
    }

    #[test]
    fn push_body_uses_camel_case() {
        let push: DevicePush = serde_json::from_str(
            r#"{"deviceId":"cup-1","reply":"10.0.0.5","value":21.5,"owner":"admin"}"#,
        )
        .unwrap();
        assert_eq!(push.device_id, "cup-1");
        assert_eq!(push.reply, "10.0.0.5");
    }

    #[test]
    fn record_serializes_to_json() {
        let record = SensorRecord::new("cup-1", SensorKind::Level, 0.75, 1_700_000_000_000);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["deviceId"], "cup-1");
        assert_eq!(json["sensorKind"], "level");
        assert_eq!(json["observedAtEpochMillis"], 1_700_000_000_000_i64);
    }
}
