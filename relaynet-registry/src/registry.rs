use std::collections::{HashMap, VecDeque};

use log::{debug, info, trace, warn};
use relaynet_types::{coap::CoapMessage, DeviceIdentity};
use tokio::{
    select,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
};

use crate::{
    device::{Device, Hooks, Lifecycle, TimerKey},
    factory::{DeviceFactory, DynDeviceFactory},
    mqtt::{MqttDeviceInfo, MqttUpdate},
    timer::{timer_channel, Fired, Timer, TimerSender},
    RegistryConfig, RegistryError, RegistryEvent, UpdateError, UpdateReport,
};

/// The set of known devices.
///
/// Incoming messages are mapped to devices by identity, creating devices through the
/// [DeviceFactory] on first sighting. Everything the registry does is queued as
/// [RegistryEvent]s, drained with [Registry::next_event] or awaited with [Registry::poll].
///
/// Devices are kept alive by TTL timers and evicted by stale timers. Timers only make
/// progress while [Registry::poll] is being awaited.
pub struct Registry {
    factory: Box<DynDeviceFactory>,
    config: RegistryConfig,
    devices: HashMap<DeviceIdentity, Device>,
    mqtt_ids: HashMap<String, DeviceIdentity>,
    stale_timers: HashMap<DeviceIdentity, Timer>,
    events: VecDeque<RegistryEvent>,
    timers: TimerSender<TimerKey>,
    timer_rx: UnboundedReceiver<Fired<TimerKey>>,
    lifecycle_tx: UnboundedSender<Lifecycle>,
    lifecycle_rx: UnboundedReceiver<Lifecycle>,
}

impl Registry {
    pub fn new<F: DeviceFactory + Send + Sync + 'static>(factory: F, config: RegistryConfig) -> Self {
        Self::with_boxed_factory(Box::new(factory), config)
    }

    pub fn with_boxed_factory(factory: Box<DynDeviceFactory>, config: RegistryConfig) -> Self {
        let (timers, timer_rx) = timer_channel();
        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        Self {
            factory,
            config,
            devices: HashMap::new(),
            mqtt_ids: HashMap::new(),
            stale_timers: HashMap::new(),
            events: VecDeque::new(),
            timers,
            timer_rx,
            lifecycle_tx,
            lifecycle_rx,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn factory(&self) -> &DynDeviceFactory {
        self.factory.as_ref()
    }

    fn hooks(&self) -> Hooks {
        Hooks {
            timers: self.timers.clone(),
            lifecycle: self.lifecycle_tx.clone(),
        }
    }

    /// Register a device.
    ///
    /// Fails without changing anything if a device with the same identity is registered.
    pub fn add(&mut self, mut device: Device) -> Result<(), RegistryError> {
        let identity = device.identity().clone();
        if self.devices.contains_key(&identity) {
            return Err(RegistryError::DuplicateDevice(identity));
        }
        device.attach(self.hooks());
        if let Some(mqtt_id) = device.mqtt_id() {
            let mqtt_id = mqtt_id.to_string();
            self.bind_mqtt_id(&mqtt_id, &identity);
        }
        let offline = !device.online();
        self.devices.insert(identity.clone(), device);
        if offline {
            self.arm_stale(&identity);
        }
        debug!("Device = ({identity}) added");
        self.events.push_back(RegistryEvent::Add(identity));
        Ok(())
    }

    /// Remove a device, returning whether it was registered.
    ///
    /// The removed device is handed out with [RegistryEvent::Remove].
    pub fn remove(&mut self, identity: &DeviceIdentity) -> bool {
        let Some(mut device) = self.devices.remove(identity) else {
            return false;
        };
        device.detach();
        if self.stale_timers.remove(identity).is_some() {
            debug!("Device = ({identity}) stale timer cancelled");
        }
        self.mqtt_ids.retain(|_, bound| bound != identity);
        info!("Device = ({identity}) removed");
        self.events.push_back(RegistryEvent::Remove(device));
        true
    }

    pub fn get(&self, identity: &DeviceIdentity) -> Option<&Device> {
        self.devices.get(identity)
    }

    pub fn get_mut(&mut self, identity: &DeviceIdentity) -> Option<&mut Device> {
        self.devices.get_mut(identity)
    }

    pub fn get_by_mqtt_id(&self, mqtt_id: &str) -> Option<&Device> {
        self.mqtt_ids
            .get(mqtt_id)
            .and_then(|identity| self.devices.get(identity))
    }

    /// The identity bound to an MQTT client identifier
    pub fn identity_for_mqtt_id(&self, mqtt_id: &str) -> Option<&DeviceIdentity> {
        self.mqtt_ids.get(mqtt_id)
    }

    pub fn contains(&self, identity: &DeviceIdentity) -> bool {
        self.devices.contains_key(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Bind `mqtt_id` to `identity`, dropping any previous binding of either
    fn bind_mqtt_id(&mut self, mqtt_id: &str, identity: &DeviceIdentity) {
        if self.mqtt_ids.get(mqtt_id) == Some(identity) {
            return;
        }
        self.mqtt_ids.retain(|_, bound| bound != identity);
        if let Some(previous) = self.mqtt_ids.insert(mqtt_id.to_string(), identity.clone()) {
            warn!("mqtt id = {mqtt_id} moved from device ({previous}) to ({identity})");
        } else {
            debug!("mqtt id = {mqtt_id} bound to device ({identity})");
        }
    }

    fn discovered(&mut self, device: Device) {
        let identity = device.identity().clone();
        let unknown = self.factory.is_unknown(&device);
        info!("Discovered device = ({identity}), unknown = {unknown}");
        self.events.push_back(RegistryEvent::Discover {
            identity: identity.clone(),
            unknown,
        });
        if let Err(e) = self.add(device) {
            warn!("Unable to add discovered device: {e}");
        }
    }

    /// Apply a CoAP status message, creating the device if it is new.
    ///
    /// Messages without a complete identity are rejected with [UpdateError::MissingIdentity].
    pub fn handle_coap_message(&mut self, message: &CoapMessage) -> Result<UpdateReport, UpdateError> {
        let identity = message.identity().ok_or(UpdateError::MissingIdentity)?;
        trace!("Device = ({identity}) status from {}", message.host);

        let result = match self.devices.get_mut(&identity) {
            Some(device) => {
                let repeated = message.serial.is_some() && message.serial == device.last_serial();
                if self.config.dedupe_serial && repeated {
                    trace!("Device = ({identity}) repeated serial, refreshing only");
                    device.refresh(message.valid_for);
                    Ok(UpdateReport::default())
                } else {
                    device.apply_coap_update(message)
                }
            }
            None => {
                let mut device = self
                    .factory
                    .create(&identity.device_type, &identity.id, &message.host);
                let report = device.apply_coap_update(message)?;
                self.discovered(device);
                Ok(report)
            }
        };
        self.drain_lifecycle();
        result
    }

    /// Apply an announcement immediately, without debouncing
    pub fn handle_mqtt_announcement(&mut self, info: MqttDeviceInfo) -> Result<UpdateReport, UpdateError> {
        let update = MqttUpdate {
            mqtt_id: info.mqtt_id.clone(),
            info: Some(info),
            values: Default::default(),
        };
        self.handle_mqtt_update(&update)
    }

    /// Apply a coalesced MQTT update.
    ///
    /// The device is found through the announced info when present, else through the MQTT id
    /// binding. An update that matches neither fails with [UpdateError::UnknownMqttDevice];
    /// the caller should ask that device to announce itself.
    pub fn handle_mqtt_update(&mut self, update: &MqttUpdate) -> Result<UpdateReport, UpdateError> {
        let identity = match (&update.info, self.mqtt_ids.get(&update.mqtt_id)) {
            (Some(info), _) => info.identity(),
            (None, Some(identity)) => identity.clone(),
            (None, None) => return Err(UpdateError::UnknownMqttDevice(update.mqtt_id.clone())),
        };

        let report = match self.devices.get_mut(&identity) {
            Some(device) => {
                let report = device.apply_mqtt_update(update);
                if let Some(mqtt_id) = device.mqtt_id() {
                    let mqtt_id = mqtt_id.to_string();
                    self.bind_mqtt_id(&mqtt_id, &identity);
                }
                report
            }
            None => {
                let Some(info) = &update.info else {
                    return Err(UpdateError::UnknownMqttDevice(update.mqtt_id.clone()));
                };
                let mut device = self.factory.create(&info.device_type, &info.id, &info.host);
                let report = device.apply_mqtt_update(update);
                self.discovered(device);
                report
            }
        };
        self.drain_lifecycle();
        Ok(report)
    }

    /// Mark offline every device bound to an MQTT id whose presence is not kept by a TTL.
    ///
    /// Called when the MQTT transport disconnects. Devices also reporting over CoAP keep
    /// their TTL and stay online until it elapses. Returns how many devices went offline.
    pub fn mqtt_disconnected(&mut self) -> usize {
        let mut count = 0;
        for identity in self.mqtt_ids.values() {
            let Some(device) = self.devices.get_mut(identity) else {
                continue;
            };
            if device.online() && !device.ttl_running() {
                device.set_online(false);
                count += 1;
            }
        }
        if count > 0 {
            debug!("{count} mqtt devices offline after disconnect");
        }
        self.drain_lifecycle();
        count
    }

    fn arm_stale(&mut self, identity: &DeviceIdentity) {
        let Some(timeout) = self.config.stale_timeout.filter(|t| !t.is_zero()) else {
            return;
        };
        debug!("Device = ({identity}) stale in {}ms", timeout.as_millis());
        let timer = self.timers.start(TimerKey::Stale(identity.clone()), timeout);
        self.stale_timers.insert(identity.clone(), timer);
    }

    fn handle_lifecycle(&mut self, notice: Lifecycle) {
        match notice {
            Lifecycle::Online(identity) => {
                let Some(device) = self.devices.get(&identity) else {
                    return;
                };
                if device.online() && self.stale_timers.remove(&identity).is_some() {
                    debug!("Device = ({identity}) stale timer cancelled");
                }
                self.events.push_back(RegistryEvent::Online(identity));
            }
            Lifecycle::Offline(identity) => {
                let Some(device) = self.devices.get(&identity) else {
                    return;
                };
                if !device.online() {
                    self.arm_stale(&identity);
                }
                self.events.push_back(RegistryEvent::Offline(identity));
            }
        }
    }

    fn drain_lifecycle(&mut self) {
        while let Ok(notice) = self.lifecycle_rx.try_recv() {
            self.handle_lifecycle(notice);
        }
    }

    fn handle_timer(&mut self, fired: Fired<TimerKey>) {
        match fired.key {
            TimerKey::Ttl(identity) => {
                if let Some(device) = self.devices.get_mut(&identity) {
                    device.ttl_expired(fired.id);
                }
            }
            TimerKey::Stale(identity) => {
                let current = self.stale_timers.get(&identity).map(Timer::id) == Some(fired.id);
                if !current {
                    return;
                }
                self.stale_timers.remove(&identity);
                let Some(device) = self.devices.get_mut(&identity) else {
                    return;
                };
                info!("Device = ({identity}) stale");
                device.mark_stale();
                self.events.push_back(RegistryEvent::Stale(identity.clone()));
                self.remove(&identity);
            }
        }
        self.drain_lifecycle();
    }

    /// Take the next queued event without waiting
    pub fn next_event(&mut self) -> Option<RegistryEvent> {
        self.drain_lifecycle();
        self.events.pop_front()
    }

    /// Wait for the next event, driving TTL and stale timers meanwhile.
    ///
    /// Cancel safe.
    pub async fn poll(&mut self) -> RegistryEvent {
        loop {
            if let Some(event) = self.next_event() {
                return event;
            }
            select! {
                Some(fired) = self.timer_rx.recv() => self.handle_timer(fired),
                Some(notice) = self.lifecycle_rx.recv() => self.handle_lifecycle(notice),
            }
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("devices", &self.devices.len())
            .field("queued_events", &self.events.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{catalog::shelly_1, factory::Catalog};

    fn registry() -> Registry {
        Registry::new(Catalog::builtin(), RegistryConfig::default())
    }

    fn shelly1(id: &str) -> Device {
        Device::new(id, "10.0.0.2", &shelly_1()).unwrap()
    }

    #[tokio::test]
    async fn duplicate_add_is_rejected() {
        let mut registry = registry();
        registry.add(shelly1("A")).unwrap();
        assert!(matches!(registry.next_event(), Some(RegistryEvent::Add(_))));

        let mut other = shelly1("A");
        other.set_name(Some("second"));
        assert_eq!(
            registry.add(other),
            Err(RegistryError::DuplicateDevice(DeviceIdentity::new("SHSW-1", "A")))
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&DeviceIdentity::new("SHSW-1", "A")).unwrap().name(), None);
        assert!(registry.next_event().is_none());
    }

    #[tokio::test]
    async fn removing_absent_device_is_noop() {
        let mut registry = registry();
        assert!(!registry.remove(&DeviceIdentity::new("SHSW-1", "A")));
        assert!(registry.next_event().is_none());

        registry.add(shelly1("A")).unwrap();
        assert!(registry.remove(&DeviceIdentity::new("SHSW-1", "A")));
        registry.next_event();
        match registry.next_event() {
            Some(RegistryEvent::Remove(device)) => assert_eq!(device.id(), "A"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn mqtt_id_rebinding() {
        let mut registry = registry();
        let announce = |id: &str| {
            MqttDeviceInfo::from_announcement(&json!({
                "id": id, "model": "SHSW-1", "mac": "A4CF12B929CC", "ip": "10.0.0.2"
            }))
            .unwrap()
        };
        registry.handle_mqtt_announcement(announce("shelly1-B929CC")).unwrap();
        let identity = DeviceIdentity::new("SHSW-1", "B929CC");
        assert_eq!(registry.identity_for_mqtt_id("shelly1-B929CC"), Some(&identity));

        let mut info = announce("shelly1-B929CC");
        info.mqtt_id = "garage".into();
        registry.handle_mqtt_announcement(info).unwrap();
        assert_eq!(registry.identity_for_mqtt_id("shelly1-B929CC"), None);
        assert_eq!(registry.get_by_mqtt_id("garage").unwrap().identity(), &identity);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn update_for_unbound_mqtt_id() {
        let mut registry = registry();
        let mut update = MqttUpdate::new("shelly1-B929CC");
        update.values.insert("relay/0".into(), json!("on"));
        assert_eq!(
            registry.handle_mqtt_update(&update),
            Err(UpdateError::UnknownMqttDevice("shelly1-B929CC".into()))
        );
        assert!(registry.is_empty());
    }
}
