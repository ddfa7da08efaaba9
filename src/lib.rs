// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! SysDB: a system-information broker daemon.
//!
//! ##### About
//!
//! This crate is the core of a daemon that collects, stores, and serves
//! structured information about hosts, the services running on them, the
//! metrics those services expose, and arbitrary attributes attached to any
//! of the above. Backends feed data in by calling the writer API on
//! [`store::Store`]; clients query it back out over a small line protocol
//! (`protocol`) using a purpose-built query language (`query`).
//!
//! The object model is a simple tree: a host owns services, metrics, and
//! attributes; services and metrics each own their own attributes.
//! Attributes are leaves. The whole tree lives behind a single
//! reader/writer lock (spec.md §5 treats finer-grained locking as a
//! non-goal) and is indexed by case-insensitive name using an in-house AVL
//! tree (`avltree`).
//!
//! # Example usage
//!
//! ```
//! use sysdb::store::Store;
//!
//! let store = Store::new();
//! store.store_host("example.com", 1, 0, Some("backend"))?;
//! store.store_service("example.com", "sshd", 1, 0, Some("backend"))?;
//!
//! let host = store.get_host("example.com").expect("just stored");
//! assert_eq!(host.name(), "example.com");
//! #
//! # Ok::<(), sysdb::Error>(())
//! ```

#![deny(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::module_name_repetitions)]

pub mod avltree;
pub mod bytebuf;
pub(crate) mod coding;
pub mod config;
mod error;
pub mod json;
pub mod matcher;
pub mod protocol;
pub mod query;
pub mod server;
pub mod store;
pub mod stop_signal;
pub mod time;
pub mod values;

pub use error::{Error, Result, WriteOutcome};
