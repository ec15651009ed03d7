use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;
use relaynet_types::{DeviceIdentity, Value};

use crate::UpdateError;

/// Extracts the hex device id from a stock MQTT client identifier such as `shellyplug-s-7AE3F1`
static MQTT_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^shelly.*-([A-Fa-f0-9]{6,12})").expect("valid regex"));

/// Derive the device id from an MQTT client identifier.
///
/// Devices with a custom identifier fall back to their MAC address. Older devices use only
/// the last six digits of the MAC as their id, newer ones the full address, and there is no
/// way to tell them apart from an announcement. The full address is always used, so an old
/// device with a custom identifier gets a different id over MQTT than over CoAP.
pub fn device_id_from_mqtt_id(mqtt_id: &str, mac: &str) -> String {
    match MQTT_ID_REGEX.captures(mqtt_id).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().to_uppercase(),
        None => mac.to_string(),
    }
}

fn string_field(announcement: &Value, field: &str) -> Option<String> {
    announcement.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Device information taken from an MQTT announcement.
#[derive(Debug, Clone, PartialEq)]
pub struct MqttDeviceInfo {
    pub device_type: String,
    pub id: String,
    pub mqtt_id: String,
    pub host: String,
    pub mac: String,
    pub firmware_version: Option<String>,
    pub has_new_firmware: bool,
}

impl MqttDeviceInfo {
    /// Parse an announcement payload.
    ///
    /// The client identifier (`id`), `model` and `mac` fields are required.
    pub fn from_announcement(announcement: &Value) -> Result<Self, UpdateError> {
        let require = |field: &str| {
            string_field(announcement, field)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| UpdateError::InvalidAnnouncement(format!("missing {field}")))
        };
        let mqtt_id = require("id")?;
        let device_type = require("model")?;
        let mac = require("mac")?;
        let id = device_id_from_mqtt_id(&mqtt_id, &mac);

        let mut info = Self {
            device_type,
            id,
            mqtt_id,
            host: String::new(),
            mac,
            firmware_version: None,
            has_new_firmware: false,
        };
        info.update(announcement);
        Ok(info)
    }

    /// Refresh the mutable fields from a later announcement. Type and id never change.
    pub fn update(&mut self, announcement: &Value) {
        if let Some(mqtt_id) = string_field(announcement, "id") {
            self.mqtt_id = mqtt_id;
        }
        if let Some(host) = string_field(announcement, "ip") {
            self.host = host;
        }
        self.firmware_version = string_field(announcement, "fw_ver");
        self.has_new_firmware = announcement
            .get("new_fw")
            .and_then(Value::as_bool)
            .unwrap_or(false);
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(self.device_type.clone(), self.id.clone())
    }
}

/// A coalesced burst of MQTT property messages for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct MqttUpdate {
    pub mqtt_id: String,
    /// Announcement received during the burst, if any
    pub info: Option<MqttDeviceInfo>,
    /// Last value written per topic path
    pub values: BTreeMap<String, Value>,
}

impl MqttUpdate {
    pub fn new<S: Into<String>>(mqtt_id: S) -> Self {
        Self {
            mqtt_id: mqtt_id.into(),
            info: None,
            values: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn id_from_stock_identifier() {
        assert_eq!(device_id_from_mqtt_id("shellyplug-s-7ae3f1", "X"), "7AE3F1");
        assert_eq!(device_id_from_mqtt_id("shelly1-B929CC", "X"), "B929CC");
        assert_eq!(
            device_id_from_mqtt_id("ShellyPlus1PM-3C610E4A2B90", "X"),
            "3C610E4A2B90"
        );
    }

    #[test]
    fn id_from_custom_identifier_uses_mac() {
        assert_eq!(
            device_id_from_mqtt_id("kitchen-light", "A4CF12B929CC"),
            "A4CF12B929CC"
        );
        assert_eq!(device_id_from_mqtt_id("shelly1-XYZ", "A4CF12B929CC"), "A4CF12B929CC");
    }

    #[test]
    fn parse_announcement() {
        let info = MqttDeviceInfo::from_announcement(&json!({
            "id": "shellyswitch25-40F5203B3C2D",
            "model": "SHSW-25",
            "mac": "40F5203B3C2D",
            "ip": "192.168.1.20",
            "new_fw": true,
            "fw_ver": "20210115-103659/v1.9.4@e2732e05"
        }))
        .unwrap();
        assert_eq!(info.identity(), DeviceIdentity::new("SHSW-25", "40F5203B3C2D"));
        assert_eq!(info.mqtt_id, "shellyswitch25-40F5203B3C2D");
        assert_eq!(info.host, "192.168.1.20");
        assert!(info.has_new_firmware);
        assert_eq!(
            info.firmware_version.as_deref(),
            Some("20210115-103659/v1.9.4@e2732e05")
        );
    }

    #[test]
    fn refresh_keeps_identity() {
        let mut info = MqttDeviceInfo::from_announcement(&json!({
            "id": "shelly1-B929CC", "model": "SHSW-1", "mac": "A4CF12B929CC", "ip": "10.0.0.2"
        }))
        .unwrap();
        info.update(&json!({"id": "garage", "model": "other", "ip": "10.0.0.3"}));
        assert_eq!(info.identity(), DeviceIdentity::new("SHSW-1", "B929CC"));
        assert_eq!(info.mqtt_id, "garage");
        assert_eq!(info.host, "10.0.0.3");
    }

    #[test]
    fn incomplete_announcement() {
        assert!(matches!(
            MqttDeviceInfo::from_announcement(&json!({"id": "shelly1-B929CC"})),
            Err(UpdateError::InvalidAnnouncement(_))
        ));
        assert!(MqttDeviceInfo::from_announcement(&json!("announce")).is_err());
    }
}
