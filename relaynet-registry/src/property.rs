use std::collections::HashMap;

use log::trace;
use relaynet_types::Value;

use crate::{coerce::Coercer, PropertyError};

/// Mode of properties that are visible in every device mode
pub const GLOBAL_MODE: &str = "*";

/// An MQTT topic suffix mapped to a property, with an optional dotted path into the payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MqttTopic {
    pub topic: String,
    pub path: String,
}

impl MqttTopic {
    /// Parse `"<topic>[.<object path>]"`, e.g. `input_event/0.event_cnt`
    pub fn parse(spec: &str) -> Self {
        match spec.split_once('.') {
            Some((topic, path)) => Self {
                topic: topic.to_string(),
                path: path.to_string(),
            },
            None => Self {
                topic: spec.to_string(),
                path: String::new(),
            },
        }
    }
}

/// Static description of one device property.
#[derive(Debug, Clone)]
pub struct PropertyDefinition {
    pub name: String,
    pub mode: String,
    pub default: Value,
    pub coercer: Option<Coercer>,
    pub coap_ids: Vec<i64>,
    pub mqtt_topics: Vec<MqttTopic>,
}

impl PropertyDefinition {
    pub fn new<S: Into<String>>(name: S, default: Value) -> Self {
        Self {
            name: name.into(),
            mode: GLOBAL_MODE.to_string(),
            default,
            coercer: None,
            coap_ids: Vec::new(),
            mqtt_topics: Vec::new(),
        }
    }

    pub fn boolean<S: Into<String>>(name: S, default: bool) -> Self {
        Self::new(name, Value::Bool(default)).coerce(crate::coerce::boolean)
    }

    pub fn number<S: Into<String>>(name: S, default: f64) -> Self {
        Self::new(name, Value::from(default)).coerce(crate::coerce::number)
    }

    pub fn string<S: Into<String>, S1: Into<String>>(name: S, default: S1) -> Self {
        Self::new(name, Value::String(default.into())).coerce(crate::coerce::string)
    }

    pub fn coerce(mut self, coercer: Coercer) -> Self {
        self.coercer = Some(coercer);
        self
    }

    pub fn mode<S: Into<String>>(mut self, mode: S) -> Self {
        self.mode = mode.into();
        self
    }

    pub fn coap<I: IntoIterator<Item = i64>>(mut self, ids: I) -> Self {
        self.coap_ids.extend(ids);
        self
    }

    pub fn mqtt<'a, I: IntoIterator<Item = &'a str>>(mut self, topics: I) -> Self {
        self.mqtt_topics.extend(topics.into_iter().map(MqttTopic::parse));
        self
    }

    pub fn is_global(&self) -> bool {
        self.mode == GLOBAL_MODE
    }
}

struct Slot {
    definition: PropertyDefinition,
    value: Value,
}

/// The properties of one device instance.
///
/// Wire identifiers are indexed per mode. Lookups try the current mode first and fall back
/// to [GLOBAL_MODE], so a mode can override an identifier that is also mapped globally.
#[derive(Default)]
pub struct PropertySet {
    slots: Vec<Slot>,
    names: HashMap<String, usize>,
    coap: HashMap<String, HashMap<i64, usize>>,
    mqtt: HashMap<String, HashMap<String, Vec<(String, usize)>>>,
}

impl PropertySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a property.
    ///
    /// Fails without modifying the set if the name is taken, any identifier is already
    /// claimed within the property's mode, or the default is rejected by the coercer.
    pub fn define(&mut self, definition: PropertyDefinition) -> Result<(), PropertyError> {
        if self.names.contains_key(&definition.name) {
            return Err(PropertyError::DuplicateProperty(definition.name));
        }

        let mode = definition.mode.clone();
        if let Some(ids) = self.coap.get(&mode) {
            if let Some(id) = definition.coap_ids.iter().find(|id| ids.contains_key(id)) {
                return Err(PropertyError::DuplicateIdentifier {
                    mode,
                    identifier: id.to_string(),
                });
            }
        }
        for (i, id) in definition.coap_ids.iter().enumerate() {
            if definition.coap_ids[..i].contains(id) {
                return Err(PropertyError::DuplicateIdentifier {
                    mode,
                    identifier: id.to_string(),
                });
            }
        }
        for (i, topic) in definition.mqtt_topics.iter().enumerate() {
            let claimed = self
                .mqtt
                .get(&mode)
                .and_then(|topics| topics.get(&topic.topic))
                .is_some_and(|paths| paths.iter().any(|(path, _)| *path == topic.path));
            if claimed || definition.mqtt_topics[..i].contains(topic) {
                return Err(PropertyError::DuplicateIdentifier {
                    mode,
                    identifier: format!("{}.{}", topic.topic, topic.path),
                });
            }
        }

        let value = match (definition.coercer, &definition.default) {
            (_, Value::Null) | (None, _) => definition.default.clone(),
            (Some(coerce), default) => {
                coerce(default.clone()).map_err(|source| PropertyError::Validation {
                    name: definition.name.clone(),
                    source,
                })?
            }
        };

        let index = self.slots.len();
        let coap = self.coap.entry(mode.clone()).or_default();
        for id in &definition.coap_ids {
            coap.insert(*id, index);
        }
        let mqtt = self.mqtt.entry(mode).or_default();
        for topic in &definition.mqtt_topics {
            mqtt.entry(topic.topic.clone())
                .or_default()
                .push((topic.path.clone(), index));
        }
        self.names.insert(definition.name.clone(), index);
        self.slots.push(Slot { definition, value });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.names.get(name).map(|i| &self.slots[*i].value)
    }

    pub fn definition(&self, name: &str) -> Option<&PropertyDefinition> {
        self.names.get(name).map(|i| &self.slots[*i].definition)
    }

    /// Coerce and store a value.
    ///
    /// Returns the previous value if the stored value changed, `None` if the coerced value
    /// equals the current one.
    pub fn set(&mut self, name: &str, value: Value) -> Result<Option<Value>, PropertyError> {
        let index = *self
            .names
            .get(name)
            .ok_or_else(|| PropertyError::UnknownProperty(name.to_string()))?;
        let slot = &mut self.slots[index];
        let value = match slot.definition.coercer {
            Some(coerce) => coerce(value).map_err(|source| PropertyError::Validation {
                name: name.to_string(),
                source,
            })?,
            None => value,
        };
        if slot.value == value {
            return Ok(None);
        }
        trace!("{name}: {} -> {value}", slot.value);
        Ok(Some(std::mem::replace(&mut slot.value, value)))
    }

    /// Name of the property a CoAP identifier maps to in `mode`
    pub fn resolve_coap(&self, id: i64, mode: Option<&str>) -> Option<&str> {
        let in_mode = mode
            .and_then(|m| self.coap.get(m))
            .and_then(|ids| ids.get(&id));
        let index = in_mode.or_else(|| self.coap.get(GLOBAL_MODE).and_then(|ids| ids.get(&id)))?;
        Some(&self.slots[*index].definition.name)
    }

    /// `(object path, property name)` pairs an MQTT topic maps to in `mode`.
    ///
    /// An object path claimed by the current mode shadows the same path in the global table.
    pub fn resolve_mqtt(&self, topic: &str, mode: Option<&str>) -> Vec<(&str, &str)> {
        let mut resolved: Vec<(&str, &str)> = Vec::new();
        let mode_paths = mode
            .filter(|m| *m != GLOBAL_MODE)
            .and_then(|m| self.mqtt.get(m))
            .and_then(|topics| topics.get(topic));
        let global_paths = self.mqtt.get(GLOBAL_MODE).and_then(|topics| topics.get(topic));

        for (path, index) in mode_paths.into_iter().flatten() {
            resolved.push((path.as_str(), self.slots[*index].definition.name.as_str()));
        }
        for (path, index) in global_paths.into_iter().flatten() {
            if resolved.iter().any(|(p, _)| *p == path.as_str()) {
                continue;
            }
            resolved.push((path.as_str(), self.slots[*index].definition.name.as_str()));
        }
        resolved
    }

    /// `(name, value)` of every global property and every property of `mode`, in definition order
    pub fn iter<'a>(&'a self, mode: Option<&'a str>) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        self.slots
            .iter()
            .filter(move |slot| {
                slot.definition.is_global() || Some(slot.definition.mode.as_str()) == mode
            })
            .map(|slot| (slot.definition.name.as_str(), &slot.value))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
