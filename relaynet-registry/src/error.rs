use relaynet_types::{coap::DecodeError, DeviceIdentity, Value};
use thiserror::Error;

/// A value rejected by a property coercer
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{value} is not a valid {expected}")]
pub struct ValidationError {
    pub value: Value,
    pub expected: &'static str,
}

impl ValidationError {
    pub fn new(value: Value, expected: &'static str) -> Self {
        Self { value, expected }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropertyError {
    #[error("Identifier {identifier} is already claimed in mode {mode}")]
    DuplicateIdentifier { mode: String, identifier: String },
    #[error("Property {0} is already defined")]
    DuplicateProperty(String),
    #[error("Unknown property {0}")]
    UnknownProperty(String),
    #[error("Invalid value for {name}: {source}")]
    Validation {
        name: String,
        #[source]
        source: ValidationError,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Device {0} is already registered")]
    DuplicateDevice(DeviceIdentity),
}

/// An update that was rejected as a whole
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpdateError {
    #[error("Invalid status payload: {0}")]
    Decode(#[from] DecodeError),
    #[error("Message has no device identity")]
    MissingIdentity,
    #[error("No device is known for mqtt id {0}")]
    UnknownMqttDevice(String),
    #[error("Invalid announcement: {0}")]
    InvalidAnnouncement(String),
}

/// The outcome of applying an update to a device.
///
/// Properties that failed validation are listed in `rejected`; every other property of the
/// update was still applied.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpdateReport {
    /// Names of the properties whose value changed
    pub changed: Vec<String>,
    pub rejected: Vec<(String, PropertyError)>,
}

impl UpdateReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    pub(crate) fn record(&mut self, name: &str, result: Result<bool, PropertyError>) {
        match result {
            Ok(true) => self.changed.push(name.to_string()),
            Ok(false) => (),
            Err(e) => self.rejected.push((name.to_string(), e)),
        }
    }
}
