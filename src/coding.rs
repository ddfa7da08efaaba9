// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Binary encode/decode traits shared by [`crate::values`] (the typed `DATA`
//! payload, spec.md §6) and [`crate::protocol`] (frame headers, spec.md §4.H).
//!
//! Pattern grounded on the teacher's `coding.rs`: a pair of small traits over
//! `Read`/`Write`, rather than pulling in a full serde-binary stack for a
//! handful of fixed-layout structures.

use std::io::{self, Read, Write};

/// Serializes into a writer.
pub trait Encode {
    /// Serializes `self` into `writer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented on the wire (e.g.
    /// [`crate::values::DataValue::Regex`] or
    /// [`crate::values::DataValue::Decimal`], per spec.md §8) or if writing
    /// fails.
    fn encode_into<W: Write>(&self, writer: &mut W) -> crate::Result<()>;

    /// Serializes `self` into a freshly allocated `Vec<u8>`.
    ///
    /// # Errors
    ///
    /// See [`Encode::encode_into`].
    fn encode_into_vec(&self) -> crate::Result<Vec<u8>> {
        let mut v = Vec::new();
        self.encode_into(&mut v)?;
        Ok(v)
    }
}

/// Deserializes from a reader.
pub trait Decode: Sized {
    /// Deserializes `Self` from `reader`.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input, an unrecognized tag, or I/O failure.
    fn decode_from<R: Read>(reader: &mut R) -> crate::Result<Self>;
}

/// Reads exactly `n` bytes, mapping EOF to a protocol error rather than
/// silently returning a short read.
pub(crate) fn read_exact_vec<R: Read>(reader: &mut R, n: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}
