//! Part of [relaynet](https://crates.io/crates/relaynet), a library for discovering and tracking networked relay and sensor devices.
//!
//! An MQTT transport built on [rumqttc].

mod client;
mod options;

pub use client::{Client, EventLoop};
pub use options::{MqttOptions, Transport};
