use std::time::Duration;

use relaynet_types::constants::DEFAULT_POOLING_WINDOW_MS;

/// Configuration of a [crate::Registry] and the [crate::Application] driving it
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// How long a device may stay offline before it is evicted. `None` never evicts.
    pub stale_timeout: Option<Duration>,
    /// Quiet period after which a burst of MQTT messages for one device is applied
    pub pooling_window: Duration,
    /// Consume CoAP status messages
    pub coap: bool,
    /// Consume MQTT messages
    pub mqtt: bool,
    /// Treat a CoAP status repeating the last applied serial as a liveness refresh only
    pub dedupe_serial: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            stale_timeout: None,
            pooling_window: Duration::from_millis(DEFAULT_POOLING_WINDOW_MS),
            coap: true,
            mqtt: true,
            dedupe_serial: false,
        }
    }
}

impl RegistryConfig {
    pub fn with_stale_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stale_timeout = timeout;
        self
    }

    pub fn with_pooling_window(mut self, window: Duration) -> Self {
        self.pooling_window = window;
        self
    }

    pub fn with_coap(mut self, enabled: bool) -> Self {
        self.coap = enabled;
        self
    }

    pub fn with_mqtt(mut self, enabled: bool) -> Self {
        self.mqtt = enabled;
        self
    }

    pub fn with_dedupe_serial(mut self, enabled: bool) -> Self {
        self.dedupe_serial = enabled;
        self
    }
}
