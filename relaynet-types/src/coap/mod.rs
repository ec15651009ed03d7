//! CoAP status message decoding.
//!
//! Devices push their status as CoAP datagrams: a standard RFC 7252 header and option list,
//! with the device identity, the validity window and a serial number carried in vendor
//! specific options. [CoapPacket] handles the framing, [CoapMessage] interprets the options
//! and the JSON status payload.

mod message;
mod packet;

pub use message::*;
pub use packet::*;

use thiserror::Error;

/// Errors produced while decoding a status datagram.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Datagram truncated")]
    Truncated,
    #[error("Unsupported CoAP version {0}")]
    UnsupportedVersion(u8),
    #[error("Invalid token length {0}")]
    InvalidTokenLength(usize),
    #[error("Option delta or length uses reserved nibble 15")]
    ReservedOptionNibble,
    #[error("Option number overflow")]
    OptionNumberOverflow,
    #[error("Payload marker not followed by a payload")]
    EmptyPayload,
    #[error("Option {number} is not a valid 16 bit unsigned integer ({len} bytes)")]
    InvalidUintOption { number: u16, len: usize },
    #[error("Device identity option is not valid utf8")]
    InvalidIdentity,
    #[error("Invalid status payload: {0}")]
    InvalidStatusPayload(String),
}

/// Decode the raw value of the validity option into a number of seconds.
///
/// An even raw value counts tenths of a second (rounded down), an odd raw value counts
/// units of four seconds.
pub fn decode_validity(raw: u16) -> u32 {
    if raw & 0x1 == 0 {
        raw as u32 / 10
    } else {
        raw as u32 * 4
    }
}

#[cfg(test)]
mod tests {
    use super::decode_validity;

    #[test]
    fn validity_even_is_tenths() {
        assert_eq!(decode_validity(370), 37);
        assert_eq!(decode_validity(378), 37);
        assert_eq!(decode_validity(0), 0);
        assert_eq!(decode_validity(65534), 6553);
    }

    #[test]
    fn validity_odd_is_quadrupled() {
        assert_eq!(decode_validity(5), 20);
        assert_eq!(decode_validity(1), 4);
        assert_eq!(decode_validity(65535), 262140);
    }
}
