use crate::{device::Device, property::PropertyDefinition, PropertySet, PropertyError};

/// Which protocol an update arrived over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Coap,
    Mqtt,
}

/// What a hook gets to know about the update being applied.
#[derive(Debug, Clone, Copy)]
pub struct UpdateContext<'a> {
    pub protocol: Protocol,
    /// CoAP protocol revision of the message, if known
    pub protocol_revision: Option<&'a str>,
    /// CoAP property identifiers present in the message
    pub coap_ids: &'a [i64],
}

impl UpdateContext<'_> {
    pub fn contains_coap_id(&self, id: i64) -> bool {
        self.coap_ids.contains(&id)
    }
}

/// A type specific behaviour run around the generic update path
pub type UpdateHook = fn(&mut Device, &UpdateContext<'_>);

/// The data describing one device type.
///
/// A schema is a table of properties plus optional hooks. Devices are built from a schema
/// by [crate::DeviceFactory] implementations such as [crate::Catalog].
#[derive(Clone)]
pub struct DeviceSchema {
    pub device_type: String,
    pub model_name: String,
    pub properties: Vec<PropertyDefinition>,
    /// Property receiving the raw property list of every update instead of mapped values
    pub raw_payload: Option<String>,
    pub before_update: Vec<UpdateHook>,
    pub after_update: Vec<UpdateHook>,
}

impl std::fmt::Debug for DeviceSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSchema")
            .field("device_type", &self.device_type)
            .field("model_name", &self.model_name)
            .field("properties", &self.properties)
            .field("raw_payload", &self.raw_payload)
            .field("before_update", &self.before_update.len())
            .field("after_update", &self.after_update.len())
            .finish()
    }
}

impl DeviceSchema {
    pub fn new<S: Into<String>, S1: Into<String>>(device_type: S, model_name: S1) -> Self {
        Self {
            device_type: device_type.into(),
            model_name: model_name.into(),
            properties: Vec::new(),
            raw_payload: None,
            before_update: Vec::new(),
            after_update: Vec::new(),
        }
    }

    pub fn property(mut self, definition: PropertyDefinition) -> Self {
        self.properties.push(definition);
        self
    }

    pub fn raw_payload<S: Into<String>>(mut self, property: S) -> Self {
        self.raw_payload = Some(property.into());
        self
    }

    pub fn before_update(mut self, hook: UpdateHook) -> Self {
        self.before_update.push(hook);
        self
    }

    pub fn after_update(mut self, hook: UpdateHook) -> Self {
        self.after_update.push(hook);
        self
    }

    /// Build the property set of a new device: the standard properties every device has,
    /// followed by the schema's own.
    pub(crate) fn property_set(&self, host: &str) -> Result<PropertySet, PropertyError> {
        let mut set = PropertySet::new();
        for definition in standard_properties(host) {
            set.define(definition)?;
        }
        for definition in &self.properties {
            set.define(definition.clone())?;
        }
        if let Some(raw) = &self.raw_payload {
            if !set.contains(raw) {
                return Err(PropertyError::UnknownProperty(raw.clone()));
            }
        }
        Ok(set)
    }

    /// Check that devices can be built from this schema
    pub fn validate(&self) -> Result<(), PropertyError> {
        self.property_set("").map(|_| ())
    }
}

pub const HOST: &str = "host";
pub const MQTT_ID: &str = "mqttId";
pub const SETTINGS: &str = "settings";
pub const MODE: &str = "mode";

fn standard_properties(host: &str) -> [PropertyDefinition; 3] {
    [
        PropertyDefinition::string(HOST, host),
        PropertyDefinition::string(MQTT_ID, ""),
        PropertyDefinition::new(SETTINGS, relaynet_types::Value::Null).coerce(crate::coerce::identity),
    ]
}
