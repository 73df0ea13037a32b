// ── Outbound message shapes ──
//
// Everything the server sends to a cup is a short UTF-8 command of the
// form `{resource}:{state}` published to the device's own topic.

use std::fmt;

use bytes::Bytes;

use crate::error::Error;
use crate::topic::TopicScheme;

/// Number of positional arguments a device publish takes:
/// owner, device id, resource, state.
pub const PUBLISH_ARITY: usize = 4;

const PAYLOAD_SEPARATOR: char = ':';

// ── Qos ──────────────────────────────────────────────────────────────

/// MQTT delivery guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Qos {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl Qos {
    pub fn level(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for Qos {
    type Error = Error;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(Error::InvalidQos(other)),
        }
    }
}

impl From<Qos> for rumqttc::QoS {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => Self::AtMostOnce,
            Qos::AtLeastOnce => Self::AtLeastOnce,
            Qos::ExactlyOnce => Self::ExactlyOnce,
        }
    }
}

// ── DevicePayload ────────────────────────────────────────────────────

/// A `{resource}:{state}` command understood by the cup firmware.
///
/// `state` may be empty: an empty state asks the device to report the
/// resource's current reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePayload {
    pub resource: String,
    pub state: String,
}

impl DevicePayload {
    pub fn new(resource: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            state: state.into(),
        }
    }

    pub fn encode(&self) -> Bytes {
        Bytes::from(self.to_string())
    }

    /// Split on the first `:`. Everything after it, including further
    /// colons, belongs to the state.
    pub fn decode(raw: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| Error::InvalidPayload(format!("not UTF-8: {e}")))?;
        let (resource, state) = text
            .split_once(PAYLOAD_SEPARATOR)
            .ok_or_else(|| Error::InvalidPayload(format!("missing ':' in '{text}'")))?;
        Ok(Self::new(resource, state))
    }
}

impl fmt::Display for DevicePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{PAYLOAD_SEPARATOR}{}", self.resource, self.state)
    }
}

// ── PublishRequest ───────────────────────────────────────────────────

/// Validated arguments for a device publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub owner: String,
    pub device_id: String,
    pub payload: DevicePayload,
}

impl PublishRequest {
    pub fn new(
        owner: &str,
        device_id: &str,
        resource: &str,
        state: &str,
    ) -> Result<Self, Error> {
        check_segment("owner", owner)?;
        check_segment("deviceId", device_id)?;
        check_segment("resource", resource)?;

        Ok(Self {
            owner: owner.to_owned(),
            device_id: device_id.to_owned(),
            payload: DevicePayload::new(resource, state),
        })
    }

    /// Build a request from positional arguments
    /// `[owner, deviceId, resource, state]`.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self, Error> {
        let [owner, device_id, resource, state] = args else {
            return Err(Error::InvalidArity {
                expected: PUBLISH_ARITY,
                got: args.len(),
            });
        };
        Self::new(
            owner.as_ref(),
            device_id.as_ref(),
            resource.as_ref(),
            state.as_ref(),
        )
    }

    /// Address the request with `scheme` and freeze it into an envelope.
    pub fn into_envelope(self, scheme: &TopicScheme, qos: Qos) -> PublishEnvelope {
        PublishEnvelope {
            topic: scheme.publish_topic(&self.owner, &self.device_id),
            payload: self.payload.encode(),
            qos,
            retained: false,
        }
    }
}

fn check_segment(field: &'static str, value: &str) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::MalformedArgument {
            field,
            reason: "must not be empty".into(),
        });
    }
    if let Some(bad) = value.chars().find(|c| matches!(c, '/' | '+' | '#')) {
        return Err(Error::MalformedArgument {
            field,
            reason: format!("must not contain '{bad}'"),
        });
    }
    Ok(())
}

// ── PublishEnvelope ──────────────────────────────────────────────────

/// One outbound message, built per publish call and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishEnvelope {
    pub topic: String,
    pub payload: Bytes,
    pub qos: Qos,
    pub retained: bool,
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn qos_from_level() {
        assert_eq!(Qos::try_from(0).unwrap(), Qos::AtMostOnce);
        assert_eq!(Qos::try_from(2).unwrap(), Qos::ExactlyOnce);
        assert!(matches!(Qos::try_from(3), Err(Error::InvalidQos(3))));
    }

    #[test]
    fn payload_decodes_what_it_encodes() {
        for (resource, state) in [("LEVEL", ""), ("TEMPERATURE", "ON"), ("LEVEL", "a:b")] {
            let payload = DevicePayload::new(resource, state);
            let encoded = payload.encode();
            assert_eq!(encoded, Bytes::from(format!("{resource}:{state}")));
            assert_eq!(DevicePayload::decode(&encoded).unwrap(), payload);
        }
    }

    #[test]
    fn payload_without_separator_is_rejected() {
        let err = DevicePayload::decode(b"LEVEL").unwrap_err();
        assert!(matches!(err, Error::InvalidPayload(_)));
    }

    #[test]
    fn from_args_requires_four_arguments() {
        for args in [
            vec![],
            vec!["admin"],
            vec!["admin", "cup-1", "LEVEL"],
            vec!["admin", "cup-1", "LEVEL", "", "extra"],
        ] {
            let err = PublishRequest::from_args(args.as_slice()).unwrap_err();
            assert!(
                matches!(err, Error::InvalidArity { expected: 4, got } if got == args.len()),
                "unexpected error for {args:?}: {err:?}"
            );
        }
    }

    #[test]
    fn from_args_rejects_wildcards_and_empty_segments() {
        let err = PublishRequest::from_args(&["ad+min", "cup-1", "LEVEL", ""]).unwrap_err();
        assert!(matches!(err, Error::MalformedArgument { field: "owner", .. }));

        let err = PublishRequest::from_args(&["admin", "", "LEVEL", ""]).unwrap_err();
        assert!(matches!(err, Error::MalformedArgument { field: "deviceId", .. }));

        let err = PublishRequest::from_args(&["admin", "cup-1", "LE/VEL", ""]).unwrap_err();
        assert!(matches!(err, Error::MalformedArgument { field: "resource", .. }));
    }

    #[test]
    fn envelope_is_never_retained() {
        let scheme = TopicScheme::new("iotserver", "connectedcup");
        let envelope = PublishRequest::from_args(&["admin", "cup-1", "TEMPERATURE", ""])
            .unwrap()
            .into_envelope(&scheme, Qos::AtLeastOnce);

        assert_eq!(envelope.topic, "iotserver/admin/connectedcup/cup-1");
        assert_eq!(envelope.payload, Bytes::from_static(b"TEMPERATURE:"));
        assert_eq!(envelope.qos, Qos::AtLeastOnce);
        assert!(!envelope.retained);
    }
}
