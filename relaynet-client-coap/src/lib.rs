//! Part of [relaynet](https://crates.io/crates/relaynet), a library for discovering and tracking networked relay and sensor devices.
//!
//! A CoAP transport built on tokio UDP sockets. Devices multicast status pushes to a well
//! known group; the [EventLoop] joins the group and yields every status message received.

mod listener;
mod options;

pub use listener::{describe, discover, CoapError, EventLoop};
pub use options::CoapOptions;
