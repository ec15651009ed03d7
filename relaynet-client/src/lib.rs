//! Part of [relaynet](https://crates.io/crates/relaynet), a library for discovering and tracking networked relay and sensor devices.
//!
//! This library defines traits and types used to implement transports: the events a transport
//! delivers, MQTT topic classification and the outbound command interface.
//!
//! # Feature Flags
//!
//! - `channel-client`: Enables the channel based [EventLoop] and [Client] implementation. Disabled by default.
//!

mod traits;
mod types;
mod utils;

pub use traits::{Client, DynClient, DynEventLoop, EventLoop, JoinedEventLoop};
pub use types::*;
pub use utils::{parse_message, topic_and_payload_to_event};

/// A basic [EventLoop] and [Client] implementation based on channels
///
/// Useful for writing tests where it is not appropriate to be running a real MQTT client and broker setup
#[cfg(any(feature = "channel-client", doc))]
pub mod channel;
