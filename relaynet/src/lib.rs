//! Discovery and presence tracking for networked relay and sensor devices.
//!
//! Devices are found through CoAP status pushes and MQTT announcements, normalised into a
//! single property model and tracked online, offline and stale by a [registry::Registry].
pub use relaynet_registry as registry;
pub use relaynet_types as types;
pub mod client {
    pub use relaynet_client::*;

    pub mod mqtt_client {
        pub use relaynet_client_rumqtt as rumqtt;
    }

    pub use relaynet_client_coap as coap;
}
