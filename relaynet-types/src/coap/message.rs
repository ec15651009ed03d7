use serde_json::Value;

use super::{decode_validity, Code, CoapPacket, DecodeError};
use crate::{
    constants::{
        IDENTITY_SEPARATOR, OPTION_GLOBAL_DEVID, OPTION_STATUS_SERIAL, OPTION_STATUS_VALIDITY,
        STATUS_PATH, STATUS_PROPERTIES,
    },
    DeviceIdentity,
};

/// The body of a status message.
///
/// Bodies that are not valid JSON are kept verbatim rather than rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusPayload {
    Json(Value),
    Raw(String),
}

impl StatusPayload {
    pub fn parse(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(value) => StatusPayload::Json(value),
            Err(_) => StatusPayload::Raw(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            StatusPayload::Json(value) => Some(value),
            StatusPayload::Raw(_) => None,
        }
    }
}

/// One `[channel, id, value]` entry of a status payload's property list
#[derive(Debug, Clone, PartialEq)]
pub struct StatusProperty {
    pub id: i64,
    pub value: Value,
}

/// A status message received from a device.
#[derive(Debug, Clone, PartialEq)]
pub struct CoapMessage {
    /// Address the datagram was received from
    pub host: String,
    pub code: Code,
    pub path: String,
    pub device_type: Option<String>,
    pub device_id: Option<String>,
    pub protocol_revision: Option<String>,
    /// Seconds this status is authoritative for
    pub valid_for: Option<u32>,
    /// Opaque increasing counter, not interpreted here
    pub serial: Option<u16>,
    pub payload: StatusPayload,
}

impl CoapMessage {
    pub fn decode<S: Into<String>>(datagram: &[u8], host: S) -> Result<Self, DecodeError> {
        Self::from_packet(&CoapPacket::decode(datagram)?, host)
    }

    pub fn from_packet<S: Into<String>>(packet: &CoapPacket, host: S) -> Result<Self, DecodeError> {
        let mut device_type = None;
        let mut device_id = None;
        let mut protocol_revision = None;

        if let Some(option) = packet.option(OPTION_GLOBAL_DEVID) {
            let header = std::str::from_utf8(&option.value).map_err(|_| DecodeError::InvalidIdentity)?;
            let mut parts = header.split(IDENTITY_SEPARATOR).map(str::to_string);
            device_type = parts.next();
            device_id = parts.next();
            protocol_revision = parts.next();
        }

        let valid_for = match packet.option(OPTION_STATUS_VALIDITY) {
            Some(option) => Some(decode_validity(option.as_u16()?)),
            None => None,
        };

        let serial = match packet.option(OPTION_STATUS_SERIAL) {
            Some(option) => Some(option.as_u16()?),
            None => None,
        };

        Ok(Self {
            host: host.into(),
            code: packet.code,
            path: packet.uri_path(),
            device_type,
            device_id,
            protocol_revision,
            valid_for,
            serial,
            payload: StatusPayload::parse(&packet.payload),
        })
    }

    /// The identity of the sending device.
    ///
    /// `None` when the identity option was missing or incomplete, in which case the message
    /// cannot be attributed to a device and should be dropped.
    pub fn identity(&self) -> Option<DeviceIdentity> {
        match (&self.device_type, &self.device_id) {
            (Some(t), Some(id)) if !t.is_empty() && !id.is_empty() => {
                Some(DeviceIdentity::new(t.clone(), id.clone()))
            }
            _ => None,
        }
    }

    /// Whether this is a status push (unicast `2.05` or multicast `0.30` on the status path)
    pub fn is_status(&self) -> bool {
        self.path == STATUS_PATH && (self.code == Code::CONTENT || self.code == Code::STATUS_PUSH)
    }

    /// The raw property list of the payload.
    ///
    /// A payload without a property list yields an empty list. A property list that is
    /// present but not an array is an error.
    pub fn property_list(&self) -> Result<&[Value], DecodeError> {
        let list = match self.payload.as_json().and_then(|v| v.get(STATUS_PROPERTIES)) {
            None | Some(Value::Null) => return Ok(&[]),
            Some(list) => list,
        };
        match list {
            Value::Array(items) => Ok(items.as_slice()),
            _ => Err(DecodeError::InvalidStatusPayload(list.to_string())),
        }
    }

    /// The property updates carried by the payload.
    ///
    /// Entries that are not `[channel, integer id, value]` tuples are skipped.
    pub fn property_updates(&self) -> Result<Vec<StatusProperty>, DecodeError> {
        let list = self.property_list()?;
        Ok(list
            .iter()
            .filter_map(|entry| {
                let tuple = entry.as_array()?;
                let id = tuple.get(1)?.as_i64()?;
                let value = tuple.get(2)?.clone();
                Some(StatusProperty { id, value })
            })
            .collect())
    }
}
