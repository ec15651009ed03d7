use std::{
    collections::{hash_map::Entry, HashMap},
    time::Duration,
};

use log::{debug, trace};
use relaynet_types::Value;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::{
    mqtt::{MqttDeviceInfo, MqttUpdate},
    timer::{timer_channel, Fired, Timer, TimerSender},
};

struct Pending {
    update: MqttUpdate,
    timer: Timer,
}

/// Coalesces bursts of MQTT messages per device.
///
/// Every message for an MQTT id restarts that id's window. Once a window elapses without
/// further messages, [Debouncer::next_flush] yields everything accumulated for the id as one
/// [MqttUpdate], keeping the last value written per topic path.
///
/// [Debouncer::push] and [Debouncer::announce] start timers and must be called from within
/// a tokio runtime.
pub struct Debouncer {
    window: Duration,
    pending: HashMap<String, Pending>,
    timers: TimerSender<String>,
    rx: UnboundedReceiver<Fired<String>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        let (timers, rx) = timer_channel();
        Self {
            window,
            pending: HashMap::new(),
            timers,
            rx,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn touch(&mut self, mqtt_id: &str) -> &mut MqttUpdate {
        let timer = self.timers.start(mqtt_id.to_string(), self.window);
        match self.pending.entry(mqtt_id.to_string()) {
            Entry::Occupied(entry) => {
                let pending = entry.into_mut();
                pending.timer = timer;
                &mut pending.update
            }
            Entry::Vacant(entry) => {
                trace!("mqtt id = {mqtt_id} started accumulating");
                &mut entry
                    .insert(Pending {
                        update: MqttUpdate::new(mqtt_id),
                        timer,
                    })
                    .update
            }
        }
    }

    /// Record a property value
    pub fn push<S: Into<String>>(&mut self, mqtt_id: &str, path: S, value: Value) {
        self.touch(mqtt_id).values.insert(path.into(), value);
    }

    /// Attach announced device info to the pending update of its MQTT id
    pub fn announce(&mut self, info: MqttDeviceInfo) {
        let mqtt_id = info.mqtt_id.clone();
        self.touch(&mqtt_id).info = Some(info);
    }

    /// Discard the pending update of one MQTT id
    pub fn cancel(&mut self, mqtt_id: &str) -> bool {
        self.pending.remove(mqtt_id).is_some()
    }

    /// Discard every pending update without flushing
    pub fn cancel_all(&mut self) {
        if !self.pending.is_empty() {
            debug!("Discarding {} pending updates", self.pending.len());
        }
        self.pending.clear();
    }

    pub fn is_pending(&self, mqtt_id: &str) -> bool {
        self.pending.contains_key(mqtt_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Wait for the next window to elapse and take its update.
    ///
    /// Cancel safe.
    pub async fn next_flush(&mut self) -> MqttUpdate {
        loop {
            let Some(fired) = self.rx.recv().await else {
                // unreachable while self holds a sender
                return std::future::pending().await;
            };
            let current = matches!(self.pending.get(&fired.key), Some(p) if p.timer.id() == fired.id);
            if !current {
                continue;
            }
            if let Some(pending) = self.pending.remove(&fired.key) {
                trace!("mqtt id = {} flushing {} values", fired.key, pending.update.values.len());
                return pending.update;
            }
        }
    }
}
