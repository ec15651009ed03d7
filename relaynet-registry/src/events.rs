use relaynet_types::DeviceIdentity;

use crate::device::Device;

/// An event produced by the [crate::Registry]
#[derive(Debug)]
pub enum RegistryEvent {
    /// A device was seen for the first time. Always followed by [RegistryEvent::Add].
    Discover {
        identity: DeviceIdentity,
        /// Whether the factory had no schema for the device type
        unknown: bool,
    },
    Add(DeviceIdentity),
    /// A device was removed, explicitly or after going stale
    Remove(Device),
    /// A device stayed offline longer than the stale timeout. Followed by [RegistryEvent::Remove].
    Stale(DeviceIdentity),
    /// A registered device came online
    Online(DeviceIdentity),
    /// A registered device went offline
    Offline(DeviceIdentity),
}

impl RegistryEvent {
    /// The identity of the device the event is about
    pub fn identity(&self) -> &DeviceIdentity {
        match self {
            RegistryEvent::Discover { identity, .. } => identity,
            RegistryEvent::Add(identity) => identity,
            RegistryEvent::Remove(device) => device.identity(),
            RegistryEvent::Stale(identity) => identity,
            RegistryEvent::Online(identity) => identity,
            RegistryEvent::Offline(identity) => identity,
        }
    }
}
