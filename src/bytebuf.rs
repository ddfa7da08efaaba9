// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A growable byte/string buffer (spec.md §4.B), used by [`crate::json`] to
//! incrementally build output.
//!
//! Grounded on `original_source/src/include/utils/strbuf.h`: an
//! auto-growing buffer supporting formatted append, raw append, chomp and
//! skip. `Vec<u8>` already grows automatically, so this is a thin wrapper
//! that keeps the original's operation names and semantics rather than a
//! reimplementation of manual buffer growth.
use std::fmt::Write as _;

/// An automatically growing byte buffer.
#[derive(Debug, Default, Clone)]
pub struct ByteBuf {
    data: Vec<u8>,
}

impl ByteBuf {
    #[must_use]
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    #[must_use]
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            data: Vec::with_capacity(cap),
        }
    }

    /// Appends formatted text to the buffer.
    pub fn append(&mut self, args: std::fmt::Arguments<'_>) {
        // SAFETY-free: write! on a String never fails for in-memory targets.
        let mut s = String::new();
        let _ = s.write_fmt(args);
        self.data.extend_from_slice(s.as_bytes());
    }

    /// Appends a plain string slice.
    pub fn append_str(&mut self, s: &str) {
        self.data.extend_from_slice(s.as_bytes());
    }

    /// Appends raw bytes, without interpreting their content.
    pub fn memappend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Removes all consecutive newline characters from the end of the buffer.
    ///
    /// Returns the number of bytes removed.
    pub fn chomp(&mut self) -> usize {
        let before = self.data.len();
        while matches!(self.data.last(), Some(b'\n')) {
            self.data.pop();
        }
        before - self.data.len()
    }

    /// Removes `n` bytes starting at `offset`.
    pub fn skip(&mut self, offset: usize, n: usize) {
        let end = (offset + n).min(self.data.len());
        if offset >= end {
            return;
        }
        self.data.drain(offset..end);
    }

    /// Clears the buffer but keeps its allocation.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the buffer's content as a string, replacing any invalid UTF-8.
    #[must_use]
    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl std::fmt::Write for ByteBuf {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.append_str(s);
        Ok(())
    }
}

/// Appends formatted text, mirroring `sdb_strbuf_append`'s printf-style call.
#[macro_export]
macro_rules! buf_append {
    ($buf:expr, $($arg:tt)*) => {
        $buf.append(format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_read_back() {
        let mut buf = ByteBuf::new();
        buf_append!(buf, "host {}", "example.com");
        assert_eq!(buf.as_str_lossy(), "host example.com");
    }

    #[test]
    fn chomp_removes_trailing_newlines() {
        let mut buf = ByteBuf::new();
        buf.append_str("abc\n\n\n");
        let removed = buf.chomp();
        assert_eq!(removed, 3);
        assert_eq!(buf.as_str_lossy(), "abc");
    }

    #[test]
    fn skip_removes_middle_bytes() {
        let mut buf = ByteBuf::new();
        buf.append_str("abcdef");
        buf.skip(1, 2);
        assert_eq!(buf.as_str_lossy(), "adef");
    }

    #[test]
    fn clear_empties_but_keeps_instance_usable() {
        let mut buf = ByteBuf::new();
        buf.append_str("abc");
        buf.clear();
        assert!(buf.is_empty());
        buf.append_str("xyz");
        assert_eq!(buf.as_str_lossy(), "xyz");
    }
}
