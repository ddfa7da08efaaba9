// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The crate-wide error type. Pattern grounded on the teacher's `error.rs`:
//! a plain enum, manual `Display`, `From` conversions, no `thiserror`.

use crate::query::ParseError;

/// Errors that can occur anywhere in the core (store, matcher, parser, protocol).
#[derive(Debug)]
pub enum Error {
    /// I/O error (socket read/write, config file access).
    Io(std::io::Error),

    /// The query text failed to parse.
    Parse(ParseError),

    /// A writer's parent object (host/service/metric) does not exist.
    MissingParent(String),

    /// `get_field` was asked for a field that doesn't apply to the object's type.
    InvalidField {
        /// The object type the field was requested on.
        object_type: &'static str,
        /// The field name that doesn't apply.
        field: &'static str,
    },

    /// A value could not be marshalled/unmarshalled over the wire (Regex and
    /// Decimal are explicitly unsupported, per spec.md §8).
    Unencodable(&'static str),

    /// A protocol frame violated the wire format (bad length, unknown type, ...).
    Protocol(String),

    /// The peer's certificate or credentials could not be established.
    Auth(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Parse(e) => write!(f, "parse error: {e}"),
            Self::MissingParent(name) => write!(f, "missing parent object: {name}"),
            Self::InvalidField { object_type, field } => {
                write!(f, "field {field} does not apply to {object_type}")
            }
            Self::Unencodable(tag) => write!(f, "value of type {tag} cannot be wire-encoded"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Auth(msg) => write!(f, "authentication error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ParseError> for Error {
    fn from(value: ParseError) -> Self {
        Self::Parse(value)
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// The outcome of a store write (spec.md §4.D / §9: "0/positive/negative").
///
/// Idiomatic stand-in for the original's integer discriminator: `Created`/
/// `Refreshed` (== 0), `Stale` (== positive, benign no-op) or `Err` (== negative).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The object did not exist and was created.
    Created,
    /// The object existed and was refreshed (timestamp advanced).
    Refreshed,
    /// The update's timestamp was not newer than the stored one; no-op.
    Stale,
}
