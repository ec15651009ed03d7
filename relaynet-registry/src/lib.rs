//! Part of [relaynet](https://crates.io/crates/relaynet), a library for discovering and tracking networked relay and sensor devices.
//!
//! This library implements the device model and its lifecycle: mode scoped property sets,
//! data driven device schemas, TTL based presence, MQTT update debouncing and the device
//! [Registry]. An [Application] ties a registry to a transport.

mod app;
mod config;
mod debounce;
mod device;
mod error;
mod events;
mod factory;
mod mqtt;
mod property;
mod registry;
mod schema;
mod timer;

pub mod catalog;
pub mod coerce;

pub use app::*;
pub use config::RegistryConfig;
pub use debounce::Debouncer;
pub use device::{ChangeCallback, Device, DeviceCallback, PropertyChange};
pub use error::*;
pub use events::RegistryEvent;
pub use factory::{unknown_schema, Catalog, DeviceFactory, DynDeviceFactory, RAW_PAYLOAD};
pub use mqtt::{device_id_from_mqtt_id, MqttDeviceInfo, MqttUpdate};
pub use property::{MqttTopic, PropertyDefinition, PropertySet, GLOBAL_MODE};
pub use registry::Registry;
pub use schema::{DeviceSchema, Protocol, UpdateContext, UpdateHook, HOST, MODE, MQTT_ID, SETTINGS};
