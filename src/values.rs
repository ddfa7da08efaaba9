// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The tagged data-value sum (spec.md §3 "Data value", §4.A).
//!
//! Grounded on `original_source/src/include/core/store.h` (field types) and
//! the teacher's `value_type.rs` tagged-enum + `TryFrom<u8>`/`From<T> for u8`
//! idiom (module removed in the final trim, pattern kept here).

use crate::coding::{read_exact_vec, Decode, Encode};
use crate::time::SdbTime;
use crate::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// How a string/binary value should be rendered by [`DataValue::format`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Quoting {
    /// No surrounding quotes.
    Bare,
    /// Surrounded by `'...'`.
    Single,
    /// Surrounded by `"..."`, with `"` and `\` escaped.
    Double,
}

/// A compiled regular expression value. Equality and ordering only ever
/// consider the source text (spec.md §4.A: "equality on regex uses the
/// source text only").
#[derive(Clone, Debug)]
pub struct RegexValue {
    source: String,
    compiled: regex::Regex,
}

impl RegexValue {
    /// Compiles `source` as an extended POSIX-style regular expression.
    ///
    /// # Errors
    ///
    /// Returns an error if `source` is not a valid pattern.
    pub fn new(source: &str) -> crate::Result<Self> {
        let compiled = regex::Regex::new(source)
            .map_err(|e| Error::Protocol(format!("invalid regex '{source}': {e}")))?;
        Ok(Self {
            source: source.to_string(),
            compiled,
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn is_match(&self, haystack: &str) -> bool {
        self.compiled.is_match(haystack)
    }
}

impl PartialEq for RegexValue {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}
impl Eq for RegexValue {}

/// A homogeneous array of one of the scalar tags (spec.md §3: "Array of T").
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayValue {
    Integer(Vec<i64>),
    Decimal(Vec<f64>),
    String(Vec<String>),
    DateTime(Vec<SdbTime>),
    Binary(Vec<Vec<u8>>),
}

impl ArrayValue {
    fn scalar_ordinal(&self) -> u8 {
        match self {
            Self::Integer(_) => 1,
            Self::Decimal(_) => 2,
            Self::String(_) => 3,
            Self::DateTime(_) => 4,
            Self::Binary(_) => 5,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Integer(v) => v.len(),
            Self::Decimal(v) => v.len(),
            Self::String(v) => v.len(),
            Self::DateTime(v) => v.len(),
            Self::Binary(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartialOrd for ArrayValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ArrayValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;

        if self.scalar_ordinal() != other.scalar_ordinal() {
            return self.scalar_ordinal().cmp(&other.scalar_ordinal());
        }

        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Decimal(a), Self::Decimal(b)) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| x.partial_cmp(y).unwrap_or(Ordering::Equal))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Self::String(a), Self::String(b)) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| x.to_lowercase().cmp(&y.to_lowercase()))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Self::DateTime(a), Self::DateTime(b)) => a.cmp(b),
            (Self::Binary(a), Self::Binary(b)) => a.cmp(b),
            _ => unreachable!("scalar_ordinal guards variant match"),
        }
    }
}

/// The tagged data-value sum (spec.md §3).
#[derive(Clone, Debug)]
pub enum DataValue {
    Null,
    Integer(i64),
    Decimal(f64),
    String(String),
    DateTime(SdbTime),
    Binary(Vec<u8>),
    Regex(RegexValue),
    Array(ArrayValue),
}

/// Ordinal used for cross-tag comparison (spec.md §4.A: "comparing different
/// tags compares the tag ordinal"). `Array` has no ordinal in the spec's
/// table; it is placed after `Regex` here (documented in DESIGN.md).
fn tag_ordinal(v: &DataValue) -> u8 {
    match v {
        DataValue::Null => 0,
        DataValue::Integer(_) => 1,
        DataValue::Decimal(_) => 2,
        DataValue::String(_) => 3,
        DataValue::DateTime(_) => 4,
        DataValue::Binary(_) => 5,
        DataValue::Regex(_) => 6,
        DataValue::Array(_) => 7,
    }
}

impl PartialEq for DataValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}
impl Eq for DataValue {}

impl PartialOrd for DataValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DataValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;

        if tag_ordinal(self) != tag_ordinal(other) {
            return tag_ordinal(self).cmp(&tag_ordinal(other));
        }

        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Decimal(a), Self::Decimal(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Self::String(a), Self::String(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
            (Self::DateTime(a), Self::DateTime(b)) => a.cmp(b),
            (Self::Binary(a), Self::Binary(b)) => a.cmp(b),
            (Self::Regex(a), Self::Regex(b)) => a.source.cmp(&b.source),
            (Self::Array(a), Self::Array(b)) => a.cmp(b),
            _ => unreachable!("tag_ordinal guards variant match"),
        }
    }
}

impl DataValue {
    /// A short, stable name for the value's tag, used in error messages.
    #[must_use]
    pub fn tag_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Decimal(_) => "decimal",
            Self::String(_) => "string",
            Self::DateTime(_) => "datetime",
            Self::Binary(_) => "binary",
            Self::Regex(_) => "regex",
            Self::Array(_) => "array",
        }
    }

    /// Formats the value for display (spec.md §4.A).
    #[must_use]
    pub fn format(&self, quoting: Quoting) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Decimal(d) => format!("{d}"),
            Self::DateTime(ts) => crate::time::format_datetime(*ts),
            Self::String(s) => quote_text(s, quoting),
            Self::Binary(b) => quote_text(&String::from_utf8_lossy(b), quoting),
            Self::Regex(r) => quote_text(r.source(), quoting),
            Self::Array(arr) => format_array(arr, quoting),
        }
    }

    /// Wire-marshals the value per spec.md §6.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unencodable`] for `Regex` and `Decimal` (neither is
    /// wire-encoded, per spec.md §8).
    pub fn marshal(&self) -> crate::Result<Vec<u8>> {
        self.encode_into_vec()
    }

    /// Reverses [`DataValue::marshal`].
    ///
    /// # Errors
    ///
    /// Returns an error on truncated or malformed input.
    pub fn unmarshal(bytes: &[u8]) -> crate::Result<Self> {
        let mut cursor = bytes;
        Self::decode_from(&mut cursor)
    }
}

fn quote_text(s: &str, quoting: Quoting) -> String {
    match quoting {
        Quoting::Bare => s.to_string(),
        Quoting::Single => format!("'{}'", s.replace('\'', "''")),
        Quoting::Double => {
            let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{escaped}\"")
        }
    }
}

fn format_array(arr: &ArrayValue, quoting: Quoting) -> String {
    let items: Vec<String> = match arr {
        ArrayValue::Integer(v) => v.iter().map(ToString::to_string).collect(),
        ArrayValue::Decimal(v) => v.iter().map(|d| format!("{d}")).collect(),
        ArrayValue::String(v) => v.iter().map(|s| quote_text(s, quoting)).collect(),
        ArrayValue::DateTime(v) => v.iter().map(|t| crate::time::format_datetime(*t)).collect(),
        ArrayValue::Binary(v) => v
            .iter()
            .map(|b| quote_text(&String::from_utf8_lossy(b), quoting))
            .collect(),
    };
    format!("[{}]", items.join(", "))
}

/// Type codes for the wire format (spec.md §6): `Array of T = 0x100 | T`.
mod type_code {
    pub const NULL: u32 = 0;
    pub const INTEGER: u32 = 1;
    pub const DECIMAL: u32 = 2;
    pub const STRING: u32 = 3;
    pub const DATETIME: u32 = 4;
    pub const BINARY: u32 = 5;
    pub const ARRAY_FLAG: u32 = 0x100;
}

impl Encode for DataValue {
    fn encode_into<W: Write>(&self, w: &mut W) -> crate::Result<()> {
        match self {
            Self::Null => w.write_u32::<BigEndian>(type_code::NULL).map_err(Error::from),
            Self::Integer(i) => {
                w.write_u32::<BigEndian>(type_code::INTEGER)?;
                w.write_i64::<BigEndian>(*i)?;
                Ok(())
            }
            Self::Decimal(_) => Err(Error::Unencodable("decimal")),
            Self::DateTime(ts) => {
                w.write_u32::<BigEndian>(type_code::DATETIME)?;
                w.write_u64::<BigEndian>(*ts)?;
                Ok(())
            }
            Self::String(s) => {
                w.write_u32::<BigEndian>(type_code::STRING)?;
                encode_string_body(w, s)
            }
            Self::Binary(b) => {
                w.write_u32::<BigEndian>(type_code::BINARY)?;
                encode_binary_body(w, b)
            }
            Self::Regex(_) => Err(Error::Unencodable("regex")),
            Self::Array(arr) => encode_array(w, arr),
        }
    }
}

fn encode_string_body<W: Write>(w: &mut W, s: &str) -> crate::Result<()> {
    // strings include the trailing NUL in their length, per spec.md §6.
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    w.write_u32::<BigEndian>(bytes.len() as u32)?;
    w.write_all(&bytes)?;
    Ok(())
}

fn encode_binary_body<W: Write>(w: &mut W, b: &[u8]) -> crate::Result<()> {
    w.write_u32::<BigEndian>(b.len() as u32)?;
    w.write_all(b)?;
    Ok(())
}

fn encode_array<W: Write>(w: &mut W, arr: &ArrayValue) -> crate::Result<()> {
    match arr {
        ArrayValue::Integer(v) => {
            w.write_u32::<BigEndian>(type_code::ARRAY_FLAG | type_code::INTEGER)?;
            w.write_u32::<BigEndian>(v.len() as u32)?;
            for i in v {
                w.write_i64::<BigEndian>(*i)?;
            }
        }
        ArrayValue::Decimal(_) => return Err(Error::Unencodable("array of decimal")),
        ArrayValue::String(v) => {
            w.write_u32::<BigEndian>(type_code::ARRAY_FLAG | type_code::STRING)?;
            w.write_u32::<BigEndian>(v.len() as u32)?;
            for s in v {
                encode_string_body(w, s)?;
            }
        }
        ArrayValue::DateTime(v) => {
            w.write_u32::<BigEndian>(type_code::ARRAY_FLAG | type_code::DATETIME)?;
            w.write_u32::<BigEndian>(v.len() as u32)?;
            for t in v {
                w.write_u64::<BigEndian>(*t)?;
            }
        }
        ArrayValue::Binary(v) => {
            w.write_u32::<BigEndian>(type_code::ARRAY_FLAG | type_code::BINARY)?;
            w.write_u32::<BigEndian>(v.len() as u32)?;
            for b in v {
                encode_binary_body(w, b)?;
            }
        }
    }
    Ok(())
}

impl Decode for DataValue {
    fn decode_from<R: Read>(r: &mut R) -> crate::Result<Self> {
        let code = r.read_u32::<BigEndian>()?;
        if code & type_code::ARRAY_FLAG != 0 {
            return decode_array(r, code & !type_code::ARRAY_FLAG);
        }
        match code {
            c if c == type_code::NULL => Ok(Self::Null),
            c if c == type_code::INTEGER => Ok(Self::Integer(r.read_i64::<BigEndian>()?)),
            c if c == type_code::DATETIME => Ok(Self::DateTime(r.read_u64::<BigEndian>()?)),
            c if c == type_code::STRING => Ok(Self::String(decode_string_body(r)?)),
            c if c == type_code::BINARY => Ok(Self::Binary(decode_binary_body(r)?)),
            other => Err(Error::Protocol(format!("unknown wire type code {other}"))),
        }
    }
}

fn decode_string_body<R: Read>(r: &mut R) -> crate::Result<String> {
    let len = r.read_u32::<BigEndian>()? as usize;
    let bytes = read_exact_vec(r, len)?;
    let bytes = bytes.strip_suffix(&[0]).unwrap_or(&bytes).to_vec();
    String::from_utf8(bytes)
        .map_err(|e| Error::Protocol(format!("invalid UTF-8 in string value: {e}")))
}

fn decode_binary_body<R: Read>(r: &mut R) -> crate::Result<Vec<u8>> {
    let len = r.read_u32::<BigEndian>()? as usize;
    Ok(read_exact_vec(r, len)?)
}

fn decode_array<R: Read>(r: &mut R, elem_code: u32) -> crate::Result<DataValue> {
    let len = r.read_u32::<BigEndian>()? as usize;
    match elem_code {
        c if c == type_code::INTEGER => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(r.read_i64::<BigEndian>()?);
            }
            Ok(DataValue::Array(ArrayValue::Integer(v)))
        }
        c if c == type_code::DATETIME => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(r.read_u64::<BigEndian>()?);
            }
            Ok(DataValue::Array(ArrayValue::DateTime(v)))
        }
        c if c == type_code::STRING => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(decode_string_body(r)?);
            }
            Ok(DataValue::Array(ArrayValue::String(v)))
        }
        c if c == type_code::BINARY => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(decode_binary_body(r)?);
            }
            Ok(DataValue::Array(ArrayValue::Binary(v)))
        }
        other => Err(Error::Protocol(format!(
            "unknown array element type code {other}"
        ))),
    }
}

/// Parses a literal token (as produced by the scanner in [`crate::query`])
/// into a [`DataValue`]. `text` must already have quoting removed for
/// strings; numeric/datetime forms are parsed directly.
pub fn parse_integer(text: &str) -> crate::Result<DataValue> {
    text.parse::<i64>()
        .map(DataValue::Integer)
        .map_err(|e| Error::Protocol(format!("invalid integer literal '{text}': {e}")))
}

pub fn parse_decimal(text: &str) -> crate::Result<DataValue> {
    text.parse::<f64>()
        .map(DataValue::Decimal)
        .map_err(|e| Error::Protocol(format!("invalid decimal literal '{text}': {e}")))
}

/// Parses an ISO-8601 datetime literal (spec.md §4.F scanner) into nanoseconds
/// since the Unix epoch.
pub fn parse_datetime(text: &str) -> crate::Result<DataValue> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return Ok(DataValue::DateTime(
            dt.timestamp_nanos_opt().unwrap_or_default() as SdbTime,
        ));
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        let dt = date
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc();
        return Ok(DataValue::DateTime(
            dt.timestamp_nanos_opt().unwrap_or_default() as SdbTime,
        ));
    }
    Err(Error::Protocol(format!("invalid datetime literal '{text}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_ordering() {
        assert!(DataValue::Null < DataValue::Integer(0));
        assert!(DataValue::Integer(100) < DataValue::Decimal(0.0));
        assert!(DataValue::Decimal(0.0) < DataValue::String(String::new()));
        assert!(DataValue::String(String::new()) < DataValue::DateTime(0));
        assert!(DataValue::DateTime(0) < DataValue::Binary(vec![]));
    }

    #[test]
    fn string_compare_is_case_insensitive() {
        assert_eq!(
            DataValue::String("Foo".into()),
            DataValue::String("foo".into())
        );
    }

    #[test]
    fn regex_equality_uses_source_only() {
        let a = RegexValue::new("^a.*$").unwrap();
        let b = RegexValue::new("^a.*$").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn marshal_integer() {
        let v = DataValue::Integer(4711);
        let bytes = v.marshal().unwrap();
        assert_eq!(
            bytes,
            vec![0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x12, 0x67]
        );
    }

    #[test]
    fn marshal_integer_array() {
        let v = DataValue::Array(ArrayValue::Integer(vec![47, 11, 23]));
        let bytes = v.marshal().unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[0..4], &[0x00, 0x00, 0x01, 0x01]);
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0x00, 0x03]);
    }

    #[test]
    fn marshal_decimal_is_unencodable() {
        assert!(DataValue::Decimal(1.0).marshal().is_err());
    }

    #[test]
    fn marshal_unmarshal_roundtrip() {
        for v in [
            DataValue::Null,
            DataValue::Integer(-9),
            DataValue::DateTime(123),
            DataValue::String("hello".into()),
            DataValue::Binary(vec![1, 2, 3]),
            DataValue::Array(ArrayValue::String(vec!["a".into(), "b".into()])),
        ] {
            let bytes = v.marshal().unwrap();
            let back = DataValue::unmarshal(&bytes).unwrap();
            assert_eq!(v, back);
        }
    }

    #[test]
    fn quoting_escapes_double_quotes_and_backslashes() {
        assert_eq!(quote_text("a\"b\\c", Quoting::Double), "\"a\\\"b\\\\c\"");
    }
}
