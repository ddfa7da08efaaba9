// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! sysdbd: the SysDB daemon binary (spec.md §6).
//!
//! CLI and logging setup grounded on `tool.rs`'s `init_tracing`: the `log`
//! crate is bridged into a `tracing` subscriber so both this binary and any
//! `log::*` call in the library land on the same stderr writer. The panic
//! hook daisy-chain `tool.rs` adds via `tracing_panic` is left out — that
//! crate isn't part of this workspace's dependency stack.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;

/// Exit code for a command-line argument error.
const EXIT_USAGE: u8 = 1;
/// Exit code for a configuration error (spec.md §6).
const EXIT_CONFIG: u8 = 6;
/// Exit code for a runtime error (spec.md §6).
const EXIT_RUNTIME: u8 = 7;

#[derive(Parser, Debug)]
#[command(name = "sysdbd", version, about = "SysDB system-information broker daemon")]
struct Args {
    /// Path to the daemon's TOML configuration file.
    #[arg(short = 'C', long = "config", value_name = "FILE")]
    config: PathBuf,

    /// Run in the foreground instead of daemonizing.
    #[arg(short = 'D', long = "no-daemon")]
    no_daemon: bool,
}

fn init_tracing(default_level: &str) {
    tracing_log::LogTracer::init().expect("failed to install log tracer");

    let default_filter: LevelFilter = default_level.parse().unwrap_or(LevelFilter::INFO);
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_filter.into())
        .with_env_var("SYSDB_LOG")
        .from_env_lossy();

    let subscriber = Registry::default().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .compact(),
    );

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("sysdbd: INTERNAL ERROR: setting default tracing subscriber failed");
        std::process::exit(i32::from(EXIT_RUNTIME));
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(if e.use_stderr() { EXIT_USAGE } else { 0 });
        }
    };

    let config = match sysdb::config::Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("sysdbd: failed to load {}: {e}", args.config.display());
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    init_tracing(&config.log_level);

    let store = std::sync::Arc::new(sysdb::store::Store::new());
    let stop_signal = sysdb::stop_signal::StopSignal::default();
    sysdb::stop_signal::install_handler(stop_signal.clone());

    if args.no_daemon {
        tracing::info!("starting in foreground");
    }

    let options = sysdb::server::Options { store, config, stop_signal };
    match sysdb::server::serve(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("daemon exited: {e}");
            ExitCode::from(EXIT_RUNTIME)
        }
    }
}
