// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The connection wire protocol (spec.md §4.H/§6): length-prefixed framing,
//! message type codes, and the `LOG` severity byte.
//!
//! Grounded on `original_source/src/include/frontend/sock.h` for the frame
//! shape and spec.md §4.H/§6 for the concrete type codes (assigned in
//! SPEC_FULL.md §4.H since the original leaves them as named constants
//! only). Encode/decode idiom matches [`crate::coding`]/[`crate::values`].

use crate::coding::{read_exact_vec, Decode, Encode};
use crate::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Default cap on a frame's body size (spec.md §4.H: "default 16 MiB").
pub const DEFAULT_MAX_BODY: u32 = 16 * 1024 * 1024;

/// Client→server and server→client message types (SPEC_FULL.md §4.H).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageType {
    Hello,
    Ping,
    Query,
    Fetch,
    List,
    Lookup,
    Ok,
    Error,
    Log,
    Data,
}

impl MessageType {
    fn code(self) -> u32 {
        match self {
            Self::Hello => 1,
            Self::Ping => 2,
            Self::Query => 3,
            Self::Fetch => 4,
            Self::List => 5,
            Self::Lookup => 6,
            Self::Ok => 0x80,
            Self::Error => 0x81,
            Self::Log => 0x82,
            Self::Data => 0x83,
        }
    }

    fn from_code(code: u32) -> crate::Result<Self> {
        Ok(match code {
            1 => Self::Hello,
            2 => Self::Ping,
            3 => Self::Query,
            4 => Self::Fetch,
            5 => Self::List,
            6 => Self::Lookup,
            0x80 => Self::Ok,
            0x81 => Self::Error,
            0x82 => Self::Log,
            0x83 => Self::Data,
            other => return Err(Error::Protocol(format!("unknown message type code {other}"))),
        })
    }
}

/// Log severities carried in a `LOG` frame's leading byte (spec.md §6).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl Severity {
    fn from_byte(b: u8) -> crate::Result<Self> {
        Ok(match b {
            3 => Self::Error,
            4 => Self::Warning,
            5 => Self::Notice,
            6 => Self::Info,
            7 => Self::Debug,
            other => return Err(Error::Protocol(format!("unknown log severity {other}"))),
        })
    }
}

/// A single protocol frame: type + body.
///
/// `HELLO` and `LOG` bodies are hand-rolled (a leading version/severity byte
/// plus text) rather than going through a general-purpose value codec;
/// callers build/parse them with [`Frame::hello`]/[`Frame::as_hello`] and
/// [`Frame::log`]/[`Frame::as_log`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub message_type: MessageType,
    pub body: Vec<u8>,
}

/// Current protocol version negotiated by `HELLO` (spec.md §6).
pub const PROTOCOL_VERSION: u8 = 1;

impl Frame {
    #[must_use]
    pub fn new(message_type: MessageType, body: Vec<u8>) -> Self {
        Self { message_type, body }
    }

    #[must_use]
    pub fn ok() -> Self {
        Self::new(MessageType::Ok, Vec::new())
    }

    #[must_use]
    pub fn error(message: &str) -> Self {
        Self::new(MessageType::Error, message.as_bytes().to_vec())
    }

    #[must_use]
    pub fn log(severity: Severity, message: &str) -> Self {
        let mut body = vec![severity as u8];
        body.extend_from_slice(message.as_bytes());
        Self::new(MessageType::Log, body)
    }

    #[must_use]
    pub fn hello(display_name: &str) -> Self {
        let mut body = vec![PROTOCOL_VERSION];
        body.extend_from_slice(display_name.as_bytes());
        Self::new(MessageType::Hello, body)
    }

    /// Splits a `LOG` frame's body into its severity and message.
    ///
    /// # Errors
    ///
    /// Returns an error if `self` is not a `LOG` frame, the body is empty,
    /// the severity byte is unrecognized, or the remainder is not valid
    /// UTF-8.
    pub fn as_log(&self) -> crate::Result<(Severity, String)> {
        if self.message_type != MessageType::Log {
            return Err(Error::Protocol("frame is not a LOG frame".to_string()));
        }
        let (&sev, rest) = self
            .body
            .split_first()
            .ok_or_else(|| Error::Protocol("empty LOG body".to_string()))?;
        let text = String::from_utf8(rest.to_vec())
            .map_err(|e| Error::Protocol(format!("invalid UTF-8 in LOG body: {e}")))?;
        Ok((Severity::from_byte(sev)?, text))
    }

    /// Splits a `HELLO` frame's body into the negotiated protocol version
    /// and the client-supplied display name.
    ///
    /// # Errors
    ///
    /// Returns an error if `self` is not a `HELLO` frame, the body is
    /// empty, or the remainder is not valid UTF-8.
    pub fn as_hello(&self) -> crate::Result<(u8, String)> {
        if self.message_type != MessageType::Hello {
            return Err(Error::Protocol("frame is not a HELLO frame".to_string()));
        }
        let (&version, rest) = self
            .body
            .split_first()
            .ok_or_else(|| Error::Protocol("empty HELLO body".to_string()))?;
        let name = String::from_utf8(rest.to_vec())
            .map_err(|e| Error::Protocol(format!("invalid UTF-8 in HELLO display name: {e}")))?;
        Ok((version, name))
    }
}

impl Encode for Frame {
    fn encode_into<W: Write>(&self, w: &mut W) -> crate::Result<()> {
        w.write_u32::<BigEndian>(self.message_type.code())?;
        w.write_u32::<BigEndian>(self.body.len() as u32)?;
        w.write_all(&self.body)?;
        Ok(())
    }
}

/// Reads one frame from `reader`, rejecting bodies larger than `max_body`
/// (spec.md §4.H: "oversized bodies ... are rejected with `ERROR` and the
/// connection is closed" — the caller decides how to react; this function
/// only enforces the cap).
///
/// # Errors
///
/// Returns [`Error::Protocol`] for an unknown type code or an oversized
/// body, or [`Error::Io`] on a short read / I/O failure.
pub fn decode_frame<R: Read>(reader: &mut R, max_body: u32) -> crate::Result<Frame> {
    let code = reader.read_u32::<BigEndian>()?;
    let message_type = MessageType::from_code(code)?;
    let len = reader.read_u32::<BigEndian>()?;
    if len > max_body {
        return Err(Error::Protocol(format!(
            "frame body of {len} bytes exceeds cap of {max_body} bytes"
        )));
    }
    let body = read_exact_vec(reader, len as usize)?;
    Ok(Frame { message_type, body })
}

impl Decode for Frame {
    fn decode_from<R: Read>(reader: &mut R) -> crate::Result<Self> {
        decode_frame(reader, DEFAULT_MAX_BODY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_roundtrip() {
        let f = Frame::new(MessageType::Query, b"LIST hosts;".to_vec());
        let bytes = f.encode_into_vec().unwrap();
        let back = decode_frame(&mut &bytes[..], DEFAULT_MAX_BODY).unwrap();
        assert_eq!(f, back);
    }

    #[test]
    fn message_type_codes_match_spec() {
        assert_eq!(MessageType::Hello.code(), 1);
        assert_eq!(MessageType::Lookup.code(), 6);
        assert_eq!(MessageType::Ok.code(), 0x80);
        assert_eq!(MessageType::Data.code(), 0x83);
    }

    #[test]
    fn oversized_body_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MessageType::Query.code().to_be_bytes());
        bytes.extend_from_slice(&100u32.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 100]);
        let err = decode_frame(&mut &bytes[..], 10).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn unknown_type_code_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&999u32.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        let err = decode_frame(&mut &bytes[..], DEFAULT_MAX_BODY).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn hello_body_roundtrip() {
        let f = Frame::hello("sysdb-cli");
        let (version, name) = f.as_hello().unwrap();
        assert_eq!(version, PROTOCOL_VERSION);
        assert_eq!(name, "sysdb-cli");
    }

    #[test]
    fn log_body_roundtrip() {
        let f = Frame::log(Severity::Warning, "stale update ignored");
        let (sev, text) = f.as_log().unwrap();
        assert_eq!(sev, Severity::Warning);
        assert_eq!(text, "stale update ignored");
    }
}
