// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The daemon's TOML configuration file (SPEC_FULL.md §4.I "J. Daemon
//! shell"). Grounded on `original_source/src/tools/sysdbd/configfile.c`
//! for *what* gets configured — listen addresses, TLS material, worker
//! count — not *how*: the original's `liboconfig` grammar is explicitly
//! out of scope (spec.md §1), so TOML via `serde` stands in for it.

use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_worker_threads() -> usize {
    4
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_max_frame_body() -> u32 {
    crate::protocol::DEFAULT_MAX_BODY
}

fn default_read_timeout_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// TLS material for a `tcp:` listener (spec.md §6: "TCP listeners require a
/// CA bundle, server certificate, server key, and optionally a CRL").
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    pub ca_file: PathBuf,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    pub crl_file: Option<PathBuf>,
}

/// One `[[listen]]` table: an address plus, for `tcp:`, its TLS material.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    pub address: String,
    pub tls: Option<TlsConfig>,
}

/// The daemon's full configuration (SPEC_FULL.md §4.I).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "listen", default)]
    pub listeners: Vec<ListenConfig>,

    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_max_frame_body")]
    pub max_frame_body: u32,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Default log level (`error`/`warn`/`info`/`debug`/`trace`), overridden
    /// by the `SYSDB_LOG` environment variable if set (SPEC_FULL.md §4.I
    /// "J. Daemon shell": "configurable via -v/-q-equivalent config keys and
    /// the `SYSDB_LOG` environment variable").
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Loads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the file cannot be read, or
    /// [`crate::Error::Protocol`] if it is not valid TOML or does not match
    /// the expected schema.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| crate::Error::Protocol(format!("invalid config file {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let cfg: Config = toml::from_str(
            r#"
            [[listen]]
            address = "unix:/tmp/sysdbd.sock"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.listeners.len(), 1);
        assert_eq!(cfg.listeners[0].address, "unix:/tmp/sysdbd.sock");
        assert!(cfg.listeners[0].tls.is_none());
        assert_eq!(cfg.worker_threads, 4);
        assert_eq!(cfg.channel_capacity, 1024);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn parses_explicit_log_level() {
        let cfg: Config = toml::from_str(
            r#"
            log_level = "debug"

            [[listen]]
            address = "unix:/tmp/sysdbd.sock"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.log_level, "debug");
    }

    #[test]
    fn parses_tcp_listener_with_tls() {
        let cfg: Config = toml::from_str(
            r#"
            worker_threads = 8

            [[listen]]
            address = "tcp:0.0.0.0:12345"

            [listen.tls]
            ca_file = "/etc/sysdb/ca.pem"
            cert_file = "/etc/sysdb/cert.pem"
            key_file = "/etc/sysdb/key.pem"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.worker_threads, 8);
        let tls = cfg.listeners[0].tls.as_ref().unwrap();
        assert_eq!(tls.ca_file, PathBuf::from("/etc/sysdb/ca.pem"));
        assert!(tls.crl_file.is_none());
    }
}
