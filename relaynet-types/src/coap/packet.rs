use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::DecodeError;
use crate::constants::OPTION_URI_PATH;

pub const COAP_VERSION: u8 = 1;
const PAYLOAD_MARKER: u8 = 0xFF;
const MAX_TOKEN_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Confirmable,
    NonConfirmable,
    Acknowledgement,
    Reset,
}

impl MessageType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => MessageType::Confirmable,
            1 => MessageType::NonConfirmable,
            2 => MessageType::Acknowledgement,
            _ => MessageType::Reset,
        }
    }

    fn bits(&self) -> u8 {
        match self {
            MessageType::Confirmable => 0,
            MessageType::NonConfirmable => 1,
            MessageType::Acknowledgement => 2,
            MessageType::Reset => 3,
        }
    }
}

/// A request method or response code in `class.detail` form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Code {
    pub class: u8,
    pub detail: u8,
}

impl Code {
    pub const GET: Code = Code::new(0, 1);
    pub const CONTENT: Code = Code::new(2, 5);
    /// Non standard code used by devices for multicast status pushes
    pub const STATUS_PUSH: Code = Code::new(0, 30);

    pub const fn new(class: u8, detail: u8) -> Self {
        Self { class, detail }
    }
}

impl From<u8> for Code {
    fn from(value: u8) -> Self {
        Code::new(value >> 5, value & 0x1F)
    }
}

impl From<Code> for u8 {
    fn from(value: Code) -> Self {
        (value.class << 5) | (value.detail & 0x1F)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class, self.detail)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoapOption {
    pub number: u16,
    pub value: Bytes,
}

impl CoapOption {
    pub fn new<B: Into<Bytes>>(number: u16, value: B) -> Self {
        Self {
            number,
            value: value.into(),
        }
    }

    /// Interpret the option value as a big endian unsigned integer of at most 16 bits.
    ///
    /// CoAP allows leading zero bytes to be stripped so 0 to 2 bytes are accepted.
    pub fn as_u16(&self) -> Result<u16, DecodeError> {
        match self.value.len() {
            0 => Ok(0),
            1 => Ok(self.value[0] as u16),
            2 => Ok(u16::from_be_bytes([self.value[0], self.value[1]])),
            len => Err(DecodeError::InvalidUintOption {
                number: self.number,
                len,
            }),
        }
    }
}

/// A decoded CoAP datagram.
#[derive(Debug, Clone, PartialEq)]
pub struct CoapPacket {
    pub message_type: MessageType,
    pub code: Code,
    pub message_id: u16,
    pub token: Bytes,
    /// Options in wire order
    pub options: Vec<CoapOption>,
    pub payload: Bytes,
}

enum Extended {
    None,
    One(u8),
    Two(u16),
}

fn read_extended<B: Buf>(nibble: u8, buf: &mut B) -> Result<u32, DecodeError> {
    match nibble {
        0..=12 => Ok(nibble as u32),
        13 => {
            if buf.remaining() < 1 {
                return Err(DecodeError::Truncated);
            }
            Ok(buf.get_u8() as u32 + 13)
        }
        14 => {
            if buf.remaining() < 2 {
                return Err(DecodeError::Truncated);
            }
            Ok(buf.get_u16() as u32 + 269)
        }
        _ => Err(DecodeError::ReservedOptionNibble),
    }
}

fn split_extended(value: usize) -> (u8, Extended) {
    if value < 13 {
        (value as u8, Extended::None)
    } else if value < 269 {
        (13, Extended::One((value - 13) as u8))
    } else {
        (14, Extended::Two((value - 269) as u16))
    }
}

fn put_extended(buf: &mut BytesMut, ext: Extended) {
    match ext {
        Extended::None => (),
        Extended::One(v) => buf.put_u8(v),
        Extended::Two(v) => buf.put_u16(v),
    }
}

impl CoapPacket {
    /// Build a non-confirmable GET request for `path` with an empty token.
    ///
    /// Devices mishandle non empty tokens, so none is sent.
    pub fn get(path: &str, message_id: u16) -> Self {
        let options = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| CoapOption::new(OPTION_URI_PATH, segment.as_bytes().to_vec()))
            .collect();
        Self {
            message_type: MessageType::NonConfirmable,
            code: Code::GET,
            message_id,
            token: Bytes::new(),
            options,
            payload: Bytes::new(),
        }
    }

    pub fn decode(datagram: &[u8]) -> Result<Self, DecodeError> {
        let mut buf = datagram;
        if buf.remaining() < 4 {
            return Err(DecodeError::Truncated);
        }

        let first = buf.get_u8();
        let version = first >> 6;
        if version != COAP_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let message_type = MessageType::from_bits(first >> 4);
        let token_len = (first & 0x0F) as usize;
        if token_len > MAX_TOKEN_LEN {
            return Err(DecodeError::InvalidTokenLength(token_len));
        }
        let code = Code::from(buf.get_u8());
        let message_id = buf.get_u16();

        if buf.remaining() < token_len {
            return Err(DecodeError::Truncated);
        }
        let token = buf.copy_to_bytes(token_len);

        let mut options = Vec::new();
        let mut payload = Bytes::new();
        let mut number: u32 = 0;

        while buf.has_remaining() {
            let byte = buf.get_u8();
            if byte == PAYLOAD_MARKER {
                if !buf.has_remaining() {
                    return Err(DecodeError::EmptyPayload);
                }
                payload = buf.copy_to_bytes(buf.remaining());
                break;
            }

            let delta = read_extended(byte >> 4, &mut buf)?;
            let length = read_extended(byte & 0x0F, &mut buf)? as usize;
            number += delta;
            if number > u16::MAX as u32 {
                return Err(DecodeError::OptionNumberOverflow);
            }
            if buf.remaining() < length {
                return Err(DecodeError::Truncated);
            }
            options.push(CoapOption {
                number: number as u16,
                value: buf.copy_to_bytes(length),
            });
        }

        Ok(Self {
            message_type,
            code,
            message_id,
            token,
            options,
            payload,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.token.len() + self.payload.len() + 16);
        let token_len = self.token.len().min(MAX_TOKEN_LEN);
        buf.put_u8((COAP_VERSION << 6) | (self.message_type.bits() << 4) | token_len as u8);
        buf.put_u8(self.code.into());
        buf.put_u16(self.message_id);
        buf.put_slice(&self.token[..token_len]);

        let mut options: Vec<&CoapOption> = self.options.iter().collect();
        options.sort_by_key(|o| o.number);

        let mut previous = 0u16;
        for option in options {
            let (delta_nibble, delta_ext) = split_extended((option.number - previous) as usize);
            let (len_nibble, len_ext) = split_extended(option.value.len());
            buf.put_u8((delta_nibble << 4) | len_nibble);
            put_extended(&mut buf, delta_ext);
            put_extended(&mut buf, len_ext);
            buf.put_slice(&option.value);
            previous = option.number;
        }

        if !self.payload.is_empty() {
            buf.put_u8(PAYLOAD_MARKER);
            buf.put_slice(&self.payload);
        }
        buf.freeze()
    }

    /// First option with the given number
    pub fn option(&self, number: u16) -> Option<&CoapOption> {
        self.options.iter().find(|o| o.number == number)
    }

    /// The request path assembled from the Uri-Path options, `/` if there are none
    pub fn uri_path(&self) -> String {
        let segments: Vec<String> = self
            .options
            .iter()
            .filter(|o| o.number == OPTION_URI_PATH)
            .map(|o| String::from_utf8_lossy(&o.value).into_owned())
            .collect();
        format!("/{}", segments.join("/"))
    }
}
