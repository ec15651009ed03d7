use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::IDENTITY_SEPARATOR;

/// Uniquely identifies a device: its type identifier plus its device id.
///
/// Fixed for the lifetime of a device and used as the registry key.
#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub device_type: String,
    pub id: String,
}

impl DeviceIdentity {
    pub fn new<S: Into<String>, S1: Into<String>>(device_type: S, id: S1) -> Self {
        Self {
            device_type: device_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.device_type, IDENTITY_SEPARATOR, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_type_and_id() {
        let id = DeviceIdentity::new("SHSW-1", "A1B2C3");
        assert_eq!(id.to_string(), "SHSW-1#A1B2C3");
    }
}
