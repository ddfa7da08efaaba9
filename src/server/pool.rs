// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The accept loop and worker pool (spec.md §4.I).
//!
//! Grounded on `original_source/src/frontend/sock.c`'s
//! `sdb_fe_sock_listen_and_serve` (the `select`-based main loop, 1 s
//! timeout, trigger self-pipe, graceful shutdown sequence) and
//! `connection_handler` (the per-worker channel-receive loop, 0.5 s
//! timeout). The `select()` readiness wait is realized with `libc::poll`
//! (SPEC_FULL.md §4.I): same "wait on many fds with a timeout" shape,
//! without the `FD_SETSIZE` limit `select` carries.
//!
//! This module talks to `poll(2)`, `pipe(2)` and friends directly, as
//! `original_source/src/frontend/sock.c` does; none of it has a safe
//! wrapper in this crate's dependency stack.
#![allow(unsafe_code)]

use crate::config::Config;
use crate::server::connection::{Connection, HandleOutcome};
use crate::server::listener::{parse_listen_address, Listener};
use crate::stop_signal::StopSignal;
use crate::store::Store;
use crate::Error;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ACCEPT_TIMEOUT_MS: i32 = 1_000;
const WORKER_TIMEOUT: Duration = Duration::from_millis(500);

/// Runtime options for [`serve`]. Grouped the way the teacher's
/// `compaction::worker::Options` bundles a task's dependencies.
pub struct Options {
    pub store: Arc<Store>,
    pub config: Config,
    pub stop_signal: StopSignal,
}

/// Opens every configured listener and runs the accept loop until
/// `options.stop_signal` is set, then shuts down gracefully.
///
/// # Errors
///
/// Returns an error if any listener fails to open (spec.md §7: "Listener
/// open failure ... fatal, daemon exits").
pub fn serve(options: Options) -> crate::Result<()> {
    let Options { store, config, stop_signal } = options;

    let mut listeners = Vec::with_capacity(config.listeners.len());
    for entry in &config.listeners {
        let address = parse_listen_address(&entry.address)?;
        let listener = Listener::open(&address, entry.tls.as_ref())?;
        listeners.push(listener);
    }
    if listeners.is_empty() {
        return Err(Error::Protocol("no [[listen]] entries configured".to_string()));
    }

    let idle: Arc<Mutex<Vec<Connection>>> = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx): (Sender<Connection>, Receiver<Connection>) = bounded(config.channel_capacity);

    let mut trigger_fds = [0 as RawFd; 2];
    if unsafe { libc::pipe(trigger_fds.as_mut_ptr()) } != 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }
    let [trigger_r, trigger_w] = trigger_fds;
    set_nonblocking(trigger_r);
    set_nonblocking(trigger_w);

    let workers: Vec<std::thread::JoinHandle<()>> = (0..config.worker_threads)
        .map(|i| {
            let rx = rx.clone();
            let store = Arc::clone(&store);
            let idle = Arc::clone(&idle);
            let max_body = config.max_frame_body;
            std::thread::Builder::new()
                .name(format!("sysdbd-worker-{i}"))
                .spawn(move || worker_loop(&rx, &store, &idle, trigger_w, max_body))
                .expect("failed to spawn worker thread")
        })
        .collect();

    accept_loop(&listeners, &idle, &tx, trigger_r, &stop_signal);

    log::info!("shutting down: closing listeners");
    drop(listeners);
    drop(tx);
    for worker in workers {
        let _ = worker.join();
    }
    idle.lock().expect("idle list lock poisoned").clear();
    unsafe {
        libc::close(trigger_r);
        libc::close(trigger_w);
    }
    log::info!("shutdown complete");
    Ok(())
}

fn set_nonblocking(fd: RawFd) {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
    }
}

fn worker_loop(
    rx: &Receiver<Connection>,
    store: &Store,
    idle: &Mutex<Vec<Connection>>,
    trigger_w: RawFd,
    max_body: u32,
) {
    loop {
        match rx.recv_timeout(WORKER_TIMEOUT) {
            Ok(mut conn) => {
                match conn.handle(store, max_body) {
                    Ok(HandleOutcome::KeepOpen) => {
                        idle.lock().expect("idle list lock poisoned").push(conn);
                        wake_accept_loop(trigger_w);
                    }
                    Ok(HandleOutcome::Eof | HandleOutcome::Error) | Err(_) => {
                        log::debug!("closing connection {}", conn.identity());
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn wake_accept_loop(trigger_w: RawFd) {
    let byte = [0u8; 1];
    unsafe {
        // A spurious failure here is tolerated: the accept loop's 1 s poll
        // timeout guarantees it eventually rechecks the idle list anyway
        // (spec.md §5: "the trigger pipe is writable non-blocking; spurious
        // failures to wake are tolerated").
        let _ = libc::write(trigger_w, byte.as_ptr().cast(), 1);
    }
}

fn accept_loop(
    listeners: &[Listener],
    idle: &Mutex<Vec<Connection>>,
    tx: &Sender<Connection>,
    trigger_r: RawFd,
    stop_signal: &StopSignal,
) {
    while !stop_signal.is_stopped() {
        let idle_fds: Vec<RawFd> = idle
            .lock()
            .expect("idle list lock poisoned")
            .iter()
            .map(AsRawFd::as_raw_fd)
            .collect();

        let mut pollfds: Vec<libc::pollfd> = Vec::with_capacity(listeners.len() + idle_fds.len() + 1);
        for listener in listeners {
            pollfds.push(pollfd_for(listener_fd(listener)));
        }
        for fd in &idle_fds {
            pollfds.push(pollfd_for(*fd));
        }
        pollfds.push(pollfd_for(trigger_r));

        let rc = unsafe {
            libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, ACCEPT_TIMEOUT_MS)
        };
        if rc < 0 {
            log::warn!("poll() failed: {}", std::io::Error::last_os_error());
            continue;
        }
        if rc == 0 {
            continue; // timeout: recheck stop_signal
        }

        for (i, listener) in listeners.iter().enumerate() {
            if pollfds[i].revents & libc::POLLIN != 0 {
                accept_one(listener, idle);
            }
        }

        let idle_base = listeners.len();
        let mut ready_idle_indices = Vec::new();
        for (i, _) in idle_fds.iter().enumerate() {
            if pollfds[idle_base + i].revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
                ready_idle_indices.push(i);
            }
        }
        if !ready_idle_indices.is_empty() {
            dispatch_ready(idle, &ready_idle_indices, tx);
        }

        let trigger_slot = pollfds.len() - 1;
        if pollfds[trigger_slot].revents & libc::POLLIN != 0 {
            drain_trigger(trigger_r);
        }
    }
}

fn listener_fd(listener: &Listener) -> RawFd {
    match listener {
        Listener::Unix(l) => l.as_raw_fd(),
        Listener::Tcp { socket, .. } => socket.as_raw_fd(),
    }
}

fn pollfd_for(fd: RawFd) -> libc::pollfd {
    libc::pollfd { fd, events: libc::POLLIN, revents: 0 }
}

fn accept_one(listener: &Listener, idle: &Mutex<Vec<Connection>>) {
    let conn = match listener {
        Listener::Unix(l) => l.accept().ok().and_then(|(stream, _)| Connection::from_unix(stream).ok()),
        Listener::Tcp { socket, tls } => socket
            .accept()
            .ok()
            .and_then(|(stream, _)| Connection::from_tls(stream, Arc::clone(tls)).ok()),
    };
    if let Some(conn) = conn {
        log::debug!("accepted connection from {}", conn.identity());
        idle.lock().expect("idle list lock poisoned").push(conn);
    }
}

/// Removes the connections at `ready_indices` (within the idle-fd ordering
/// captured earlier this iteration) from the idle list and sends them into
/// the work channel. A connection that no longer matches by identity (the
/// idle list may have mutated since the fd snapshot was taken) is simply
/// skipped this round; it will be picked up on the next poll iteration.
fn dispatch_ready(idle: &Mutex<Vec<Connection>>, ready_indices: &[usize], tx: &Sender<Connection>) {
    let mut guard = idle.lock().expect("idle list lock poisoned");
    let mut taken = Vec::with_capacity(ready_indices.len());
    for &i in ready_indices.iter().rev() {
        if i < guard.len() {
            taken.push(guard.swap_remove(i));
        }
    }
    drop(guard);

    for conn in taken {
        if let Err(e) = tx.try_send(conn) {
            match e {
                crossbeam_channel::TrySendError::Full(conn) => {
                    idle.lock().expect("idle list lock poisoned").push(conn);
                }
                crossbeam_channel::TrySendError::Disconnected(_) => {}
            }
        }
    }
}

fn drain_trigger(trigger_r: RawFd) {
    let mut buf = [0u8; 64];
    loop {
        let n = unsafe { libc::read(trigger_r, buf.as_mut_ptr().cast(), buf.len()) };
        if n <= 0 {
            break;
        }
    }
}
