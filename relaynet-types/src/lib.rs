//! Part of [relaynet](https://crates.io/crates/relaynet), a library for discovering and tracking networked relay and sensor devices.
//!
//! This library defines the wire formats shared by the rest of the workspace: the CoAP status
//! message codec, MQTT topic construction and the device identity type.

pub mod coap;
pub mod constants;
pub mod topic;
pub mod utils;

mod identity;

pub use identity::*;

/// Property values are plain JSON values
pub use serde_json::Value;
