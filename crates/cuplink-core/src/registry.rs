// ── Device / network-address bindings ──
//
// Guards the push path: a reading is only accepted from the address the
// device registered with. Bindings are written by registration (outside
// this crate) and read on every push.

use dashmap::DashMap;

use crate::model::DeviceBinding;

/// Result of checking a push's claimed origin against the device binding.
///
/// Not an error: callers map `Unregistered` and `Conflict` to responses
/// and must not write the reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginCheck {
    /// No binding exists for the device.
    Unregistered,
    /// The device is bound to a different address.
    Conflict { bound_address: String },
    /// Origin matches the bound address.
    Valid,
}

impl OriginCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Concurrent map of device id to bound network address.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    bindings: DashMap<String, String>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `device_id` to `address`, replacing any earlier binding.
    /// Returns the previous address, if any.
    pub fn bind(&self, device_id: impl Into<String>, address: impl Into<String>) -> Option<String> {
        let device_id = device_id.into();
        let address = address.into();
        tracing::debug!(device_id, address, "device bound");
        self.bindings.insert(device_id, address)
    }

    pub fn bound_address(&self, device_id: &str) -> Option<String> {
        self.bindings.get(device_id).map(|a| a.value().clone())
    }

    pub fn binding(&self, device_id: &str) -> Option<DeviceBinding> {
        self.bound_address(device_id)
            .map(|bound_network_address| DeviceBinding {
                device_id: device_id.to_owned(),
                bound_network_address,
            })
    }

    pub fn validate_origin(&self, device_id: &str, origin_address: &str) -> OriginCheck {
        match self.bindings.get(device_id) {
            None => OriginCheck::Unregistered,
            Some(bound) if bound.value() != origin_address => OriginCheck::Conflict {
                bound_address: bound.value().clone(),
            },
            Some(_) => OriginCheck::Valid,
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
