use std::{collections::HashMap, time::Duration};

use log::{debug, info, warn};
use relaynet_types::{coap::CoapMessage, utils::{lookup_path, timestamp}, DeviceIdentity, Value};
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    mqtt::MqttUpdate,
    schema::{DeviceSchema, Protocol, UpdateContext, UpdateHook, HOST, MODE, MQTT_ID, SETTINGS},
    timer::{Timer, TimerSender},
    PropertyError, PropertySet, UpdateError, UpdateReport,
};

/// A property value change
#[derive(Debug, Clone, Copy)]
pub struct PropertyChange<'a> {
    pub name: &'a str,
    pub new: &'a Value,
    pub old: &'a Value,
}

pub type ChangeCallback = Box<dyn Fn(&PropertyChange<'_>, &Device) + Send + Sync>;
pub type DeviceCallback = Box<dyn Fn(&Device) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    change: Vec<ChangeCallback>,
    property: HashMap<String, Vec<ChangeCallback>>,
    online: Vec<DeviceCallback>,
    offline: Vec<DeviceCallback>,
    stale: Vec<DeviceCallback>,
}

#[derive(Clone, Copy)]
enum Signal {
    Online,
    Offline,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum TimerKey {
    Ttl(DeviceIdentity),
    Stale(DeviceIdentity),
}

#[derive(Debug)]
pub(crate) enum Lifecycle {
    Online(DeviceIdentity),
    Offline(DeviceIdentity),
}

/// Connection to the registry a device belongs to
pub(crate) struct Hooks {
    pub timers: TimerSender<TimerKey>,
    pub lifecycle: UnboundedSender<Lifecycle>,
}

/// A device and its property values.
///
/// Devices are created offline. Every applied update marks the device online; the device
/// goes offline again when its TTL elapses without a fresh update, or when
/// [Device::set_online] is called with `false`.
///
/// Callbacks are invoked synchronously from the operation that caused them. Change callbacks
/// registered with [Device::on_change] run before those registered for the specific property.
pub struct Device {
    identity: DeviceIdentity,
    model_name: String,
    properties: PropertySet,
    raw_payload: Option<String>,
    before_update: Vec<UpdateHook>,
    after_update: Vec<UpdateHook>,
    online: bool,
    ttl: Duration,
    ttl_timer: Option<Timer>,
    name: Option<String>,
    last_seen: Option<u64>,
    last_serial: Option<u16>,
    listeners: Listeners,
    hooks: Option<Hooks>,
}

impl Device {
    /// Build a device of `schema`'s type.
    pub fn new<S: Into<String>>(id: S, host: &str, schema: &DeviceSchema) -> Result<Self, PropertyError> {
        let mut device = Self::placeholder(schema.device_type.clone(), id);
        device.model_name = schema.model_name.clone();
        device.properties = schema.property_set(host)?;
        device.raw_payload = schema.raw_payload.clone();
        device.before_update = schema.before_update.clone();
        device.after_update = schema.after_update.clone();
        Ok(device)
    }

    /// A device without any properties
    pub(crate) fn placeholder<S: Into<String>, S1: Into<String>>(device_type: S, id: S1) -> Self {
        Self {
            identity: DeviceIdentity::new(device_type, id),
            model_name: String::new(),
            properties: PropertySet::new(),
            raw_payload: None,
            before_update: Vec::new(),
            after_update: Vec::new(),
            online: false,
            ttl: Duration::ZERO,
            ttl_timer: None,
            name: None,
            last_seen: None,
            last_serial: None,
            listeners: Listeners::default(),
            hooks: None,
        }
    }

    /// Build a device from a schema, overriding the schema's type.
    ///
    /// Used for generic schemas that stand in for types without a schema of their own.
    pub fn with_type<S: Into<String>, S1: Into<String>>(
        device_type: S,
        id: S1,
        host: &str,
        schema: &DeviceSchema,
    ) -> Result<Self, PropertyError> {
        let mut device = Self::new(id, host, schema)?;
        device.identity.device_type = device_type.into();
        Ok(device)
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn device_type(&self) -> &str {
        &self.identity.device_type
    }

    pub fn id(&self) -> &str {
        &self.identity.id
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn host(&self) -> &str {
        self.properties.get(HOST).and_then(Value::as_str).unwrap_or_default()
    }

    /// The MQTT client identifier, once the device has been seen over MQTT
    pub fn mqtt_id(&self) -> Option<&str> {
        self.properties
            .get(MQTT_ID)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// The current mode, for devices that have one
    pub fn mode(&self) -> Option<&str> {
        self.properties.get(MODE).and_then(Value::as_str)
    }

    /// The explicitly set name, else the name found in the device settings
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().or_else(|| {
            self.properties
                .get(SETTINGS)
                .and_then(|s| s.get("name"))
                .and_then(Value::as_str)
        })
    }

    pub fn set_name<S: Into<String>>(&mut self, name: Option<S>) {
        self.name = name.map(Into::into);
    }

    pub fn online(&self) -> bool {
        self.online
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Milliseconds since the unix epoch of the last applied update
    pub fn last_seen(&self) -> Option<u64> {
        self.last_seen
    }

    pub fn last_serial(&self) -> Option<u16> {
        self.last_serial
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// `(name, value)` of every property visible in the current mode
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter(self.mode())
    }

    pub fn property_set(&self) -> &PropertySet {
        &self.properties
    }

    /// Coerce and store a property value.
    ///
    /// Returns whether the value changed. Change callbacks only run when it did. A rejected
    /// value leaves the property untouched.
    pub fn set(&mut self, name: &str, value: Value) -> Result<bool, PropertyError> {
        match self.properties.set(name, value)? {
            Some(old) => {
                self.emit_change(name, &old);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn emit_change(&mut self, name: &str, old: &Value) {
        let listeners = std::mem::take(&mut self.listeners);
        if let Some(new) = self.properties.get(name) {
            let change = PropertyChange { name, new, old };
            for cb in &listeners.change {
                cb(&change, self);
            }
            if let Some(cbs) = listeners.property.get(name) {
                for cb in cbs {
                    cb(&change, self);
                }
            }
        }
        self.listeners = listeners;
    }

    fn emit(&mut self, signal: Signal) {
        let listeners = std::mem::take(&mut self.listeners);
        let callbacks = match signal {
            Signal::Online => &listeners.online,
            Signal::Offline => &listeners.offline,
            Signal::Stale => &listeners.stale,
        };
        for cb in callbacks {
            cb(self);
        }
        self.listeners = listeners;
    }

    /// Register a callback for changes of any property
    pub fn on_change<F>(&mut self, cb: F)
    where
        F: Fn(&PropertyChange<'_>, &Device) + Send + Sync + 'static,
    {
        self.listeners.change.push(Box::new(cb));
    }

    /// Register a callback for changes of the property `name`
    pub fn on_property_change<S, F>(&mut self, name: S, cb: F)
    where
        S: Into<String>,
        F: Fn(&PropertyChange<'_>, &Device) + Send + Sync + 'static,
    {
        self.listeners
            .property
            .entry(name.into())
            .or_default()
            .push(Box::new(cb));
    }

    pub fn on_online<F>(&mut self, cb: F)
    where
        F: Fn(&Device) + Send + Sync + 'static,
    {
        self.listeners.online.push(Box::new(cb));
    }

    pub fn on_offline<F>(&mut self, cb: F)
    where
        F: Fn(&Device) + Send + Sync + 'static,
    {
        self.listeners.offline.push(Box::new(cb));
    }

    /// Register a callback for the device being evicted after staying offline too long
    pub fn on_stale<F>(&mut self, cb: F)
    where
        F: Fn(&Device) + Send + Sync + 'static,
    {
        self.listeners.stale.push(Box::new(cb));
    }

    pub fn set_online(&mut self, online: bool) {
        if self.online == online {
            return;
        }
        self.online = online;
        if online {
            info!("Device = ({}) online", self.identity);
            self.emit(Signal::Online);
        } else {
            info!("Device = ({}) offline", self.identity);
            self.emit(Signal::Offline);
        }
        if let Some(hooks) = &self.hooks {
            let notice = match online {
                true => Lifecycle::Online(self.identity.clone()),
                false => Lifecycle::Offline(self.identity.clone()),
            };
            _ = hooks.lifecycle.send(notice);
        }
    }

    /// Set how long the device stays online without a fresh update.
    ///
    /// Restarts the TTL timer, even when `ttl` equals the current value. A zero TTL keeps
    /// the device online until it is marked offline explicitly.
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
        self.ttl_timer = None;
        self.start_ttl_timer();
    }

    fn start_ttl_timer(&mut self) {
        if self.ttl.is_zero() {
            return;
        }
        if let Some(hooks) = &self.hooks {
            debug!("Device = ({}) ttl timer started, {}ms", self.identity, self.ttl.as_millis());
            self.ttl_timer = Some(
                hooks
                    .timers
                    .start(TimerKey::Ttl(self.identity.clone()), self.ttl),
            );
        }
    }

    /// Whether a TTL timer is currently keeping the device online
    pub fn ttl_running(&self) -> bool {
        self.ttl_timer.is_some()
    }

    pub(crate) fn ttl_expired(&mut self, timer_id: u64) -> bool {
        if self.ttl_timer.as_ref().map(Timer::id) != Some(timer_id) {
            return false;
        }
        debug!("Device = ({}) ttl elapsed", self.identity);
        self.ttl_timer = None;
        self.set_online(false);
        true
    }

    pub(crate) fn attach(&mut self, hooks: Hooks) {
        self.hooks = Some(hooks);
        if self.online {
            self.start_ttl_timer();
        }
    }

    pub(crate) fn detach(&mut self) {
        self.hooks = None;
        self.ttl_timer = None;
    }

    pub(crate) fn mark_stale(&mut self) {
        self.emit(Signal::Stale);
    }

    fn run_hooks(&mut self, hooks: &[UpdateHook], context: &UpdateContext<'_>) {
        for hook in hooks {
            hook(self, context);
        }
    }

    fn seen(&mut self) {
        self.set_online(true);
        self.last_seen = Some(timestamp());
    }

    /// Mark the device as alive without touching its properties
    pub fn refresh(&mut self, valid_for: Option<u32>) {
        if let Some(secs) = valid_for.filter(|s| *s > 0) {
            self.set_ttl(Duration::from_secs(secs as u64));
        }
        self.seen();
    }

    /// Apply a CoAP status message.
    ///
    /// A message whose property list is malformed is rejected before anything is changed.
    /// Values rejected by a coercer are listed in the returned report; the rest of the
    /// message is still applied.
    pub fn apply_coap_update(&mut self, message: &CoapMessage) -> Result<UpdateReport, UpdateError> {
        let updates = message.property_updates()?;
        let raw = match &self.raw_payload {
            Some(_) => Some(Value::Array(message.property_list()?.to_vec())),
            None => None,
        };
        let ids: Vec<i64> = updates.iter().map(|u| u.id).collect();
        let context = UpdateContext {
            protocol: Protocol::Coap,
            protocol_revision: message.protocol_revision.as_deref(),
            coap_ids: &ids,
        };

        let mut report = UpdateReport::default();
        if let Some(secs) = message.valid_for.filter(|s| *s > 0) {
            self.set_ttl(Duration::from_secs(secs as u64));
        }
        if !message.host.is_empty() {
            report.record(HOST, self.set(HOST, Value::String(message.host.clone())));
        }

        let before = self.before_update.clone();
        self.run_hooks(&before, &context);

        match (self.raw_payload.clone(), raw) {
            (Some(property), Some(raw)) => {
                let result = self.set(&property, Value::String(raw.to_string()));
                report.record(&property, result);
            }
            _ => {
                let mode = self.mode().map(str::to_string);
                for update in updates {
                    let name = match self.properties.resolve_coap(update.id, mode.as_deref()) {
                        Some(name) => name.to_string(),
                        None => continue,
                    };
                    let result = self.set(&name, update.value);
                    report.record(&name, result);
                }
            }
        }

        let after = self.after_update.clone();
        self.run_hooks(&after, &context);

        self.last_serial = message.serial;
        self.seen();
        self.log_rejections(&report);
        Ok(report)
    }

    /// Apply a coalesced MQTT update
    pub fn apply_mqtt_update(&mut self, update: &MqttUpdate) -> UpdateReport {
        let context = UpdateContext {
            protocol: Protocol::Mqtt,
            protocol_revision: None,
            coap_ids: &[],
        };

        let mut report = UpdateReport::default();
        match &update.info {
            Some(info) => {
                if !info.host.is_empty() {
                    report.record(HOST, self.set(HOST, Value::String(info.host.clone())));
                }
                report.record(MQTT_ID, self.set(MQTT_ID, Value::String(info.mqtt_id.clone())));
            }
            None => {
                report.record(MQTT_ID, self.set(MQTT_ID, Value::String(update.mqtt_id.clone())));
            }
        }

        let before = self.before_update.clone();
        self.run_hooks(&before, &context);

        match self.raw_payload.clone() {
            Some(property) => {
                let raw = Value::Object(update.values.clone().into_iter().collect());
                let result = self.set(&property, Value::String(raw.to_string()));
                report.record(&property, result);
            }
            None => {
                let mode = self.mode().map(str::to_string);
                for (topic, value) in &update.values {
                    let targets: Vec<(String, String)> = self
                        .properties
                        .resolve_mqtt(topic, mode.as_deref())
                        .into_iter()
                        .map(|(path, name)| (path.to_string(), name.to_string()))
                        .collect();
                    for (path, name) in targets {
                        let Some(found) = lookup_path(value, &path).cloned() else {
                            continue;
                        };
                        let result = self.set(&name, found);
                        report.record(&name, result);
                    }
                }
            }
        }

        let after = self.after_update.clone();
        self.run_hooks(&after, &context);

        self.seen();
        self.log_rejections(&report);
        report
    }

    fn log_rejections(&self, report: &UpdateReport) {
        for (name, e) in &report.rejected {
            warn!("Device = ({}) rejected value for {name}: {e}", self.identity);
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("identity", &self.identity)
            .field("host", &self.host())
            .field("online", &self.online)
            .field("ttl", &self.ttl)
            .field("last_seen", &self.last_seen)
            .finish()
    }
}
