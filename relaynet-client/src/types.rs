use std::string::FromUtf8Error;

use relaynet_types::{coap::{CoapMessage, DecodeError}, Value};
use thiserror::Error;

/// Error types for MQTT message processing operations.
///
/// This enum represents the various error conditions that can occur
/// when splitting a topic into its device and property parts.
#[derive(Error, Debug, PartialEq)]
pub enum MessageError {
    #[error("The topic is not below the device namespace")]
    NotInNamespace,
    #[error("The topic has no device segment")]
    MissingDevice,
    #[error("Topic parts utf8 decode error: {0}")]
    TopicUtf8Error(FromUtf8Error),
}

impl From<FromUtf8Error> for MessageError {
    fn from(e: FromUtf8Error) -> Self {
        MessageError::TopicUtf8Error(e)
    }
}

/// A message payload, decoded as JSON when possible.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Raw(String),
}

impl Payload {
    pub fn parse(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Raw(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    /// Convert into a JSON value, raw payloads becoming strings
    pub fn into_value(self) -> Value {
        match self {
            Payload::Json(value) => value,
            Payload::Raw(raw) => Value::String(raw),
        }
    }
}

/// The segments of a topic with the namespace root removed
#[derive(Debug, Clone, PartialEq)]
pub struct TopicPath {
    pub segments: Vec<String>,
}

/// An enum representing the different type of message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    /// A device announcing its presence
    Announce,
    /// A command echo, either global or addressed to one device
    Command,
    /// A property value, `path` being the topic below the device segment
    Property { path: String },
}

/// A classified MQTT message.
#[derive(Debug, Clone, PartialEq)]
pub struct MqttMessage {
    /// The device segment of the topic. `None` for namespace wide topics
    pub mqtt_id: Option<String>,
    pub topic: TopicPath,
    pub kind: MessageKind,
    pub payload: Payload,
}

/// The transport an [Event::Online] or [Event::Offline] comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Mqtt,
    Coap,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Mqtt => write!(f, "mqtt"),
            Transport::Coap => write!(f, "coap"),
        }
    }
}

/// An enum that represents the different types of events an [EventLoop](crate::EventLoop) implementation can produce.
#[derive(Debug, PartialEq)]
pub enum Event {
    /// The transport is connected
    Online(Transport),
    /// The transport lost its connection
    Offline(Transport),
    Mqtt(MqttMessage),
    Coap(CoapMessage),
    InvalidPublish {
        reason: MessageError,
        topic: Vec<u8>,
        payload: Vec<u8>,
    },
    InvalidDatagram {
        reason: DecodeError,
        host: String,
    },
}
