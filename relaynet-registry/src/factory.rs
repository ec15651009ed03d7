use std::collections::HashMap;

use log::error;
use relaynet_types::Value;

use crate::{
    device::Device,
    property::PropertyDefinition,
    schema::DeviceSchema,
    PropertyError,
};

/// Creates devices for the [crate::Registry].
///
/// The registry never inspects device types itself; everything type specific is decided here.
pub trait DeviceFactory {
    /// Create a device of `device_type`.
    ///
    /// Must always produce a device, falling back to a generic device for unrecognised types.
    fn create(&self, device_type: &str, id: &str, host: &str) -> Device;

    /// Whether `device` is a generic stand in for a type this factory does not know
    fn is_unknown(&self, device: &Device) -> bool;
}

pub type DynDeviceFactory = dyn DeviceFactory + Send + Sync;

/// Name of the property an unknown device stores its raw updates in
pub const RAW_PAYLOAD: &str = "payload";

/// Schema used for device types without a registered schema
pub fn unknown_schema() -> DeviceSchema {
    DeviceSchema::new("UNKNOWN", "Unknown Device")
        .property(PropertyDefinition::new(RAW_PAYLOAD, Value::Null))
        .raw_payload(RAW_PAYLOAD)
}

/// A [DeviceFactory] backed by a table of [DeviceSchema]s.
pub struct Catalog {
    schemas: HashMap<String, DeviceSchema>,
    unknown: DeviceSchema,
}

impl Catalog {
    /// A catalog without any schemas. Every device it creates is unknown.
    pub fn empty() -> Self {
        Self {
            schemas: HashMap::new(),
            unknown: unknown_schema(),
        }
    }

    /// Add a schema, replacing any schema registered for the same type.
    pub fn register(&mut self, schema: DeviceSchema) -> Result<(), PropertyError> {
        schema.validate()?;
        self.schemas.insert(schema.device_type.clone(), schema);
        Ok(())
    }

    pub fn with_schema(mut self, schema: DeviceSchema) -> Result<Self, PropertyError> {
        self.register(schema)?;
        Ok(self)
    }

    pub fn schema(&self, device_type: &str) -> Option<&DeviceSchema> {
        self.schemas.get(device_type)
    }

    pub fn device_types(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    fn create_unknown(&self, device_type: &str, id: &str, host: &str) -> Device {
        Device::with_type(device_type, id, host, &self.unknown).unwrap_or_else(|e| {
            error!("Unable to build unknown device {device_type}#{id}: {e}");
            Device::placeholder(device_type, id)
        })
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::empty()
    }
}

impl DeviceFactory for Catalog {
    fn create(&self, device_type: &str, id: &str, host: &str) -> Device {
        let schema = match self.schemas.get(device_type) {
            Some(schema) => schema,
            None => return self.create_unknown(device_type, id, host),
        };
        match Device::new(id, host, schema) {
            Ok(device) => device,
            Err(e) => {
                error!("Schema for {device_type} is invalid: {e}");
                self.create_unknown(device_type, id, host)
            }
        }
    }

    fn is_unknown(&self, device: &Device) -> bool {
        !self.schemas.contains_key(device.device_type())
    }
}
