// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A cheap, cloneable shutdown flag shared between the accept loop and workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared, cloneable flag used to request an orderly shutdown.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Requests shutdown; observers see it on their next [`Self::is_stopped`] poll.
    pub fn send(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns whether shutdown has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Set by [`handle_signal`], an async-signal-safe handler; polled by the
/// watcher thread [`install_handler`] spawns, since [`StopSignal::send`]
/// itself is not guaranteed async-signal-safe.
static SIGNALED: AtomicBool = AtomicBool::new(false);

#[allow(unsafe_code)]
extern "C" fn handle_signal(_sig: libc::c_int) {
    SIGNALED.store(true, Ordering::Release);
}

/// Installs `SIGTERM`/`SIGINT` handlers and spawns a watcher thread that
/// forwards them to `stop` (spec.md §5: "the main loop's `do_loop` flag is
/// cleared externally (signal handler)").
///
/// The OS-level handler only flips an async-signal-safe static; the
/// watcher thread performs the actual `StopSignal::send`, which is free to
/// do non-async-signal-safe work.
#[allow(unsafe_code)]
pub fn install_handler(stop: StopSignal) {
    unsafe {
        libc::signal(libc::SIGTERM, handle_signal as libc::sighandler_t);
        libc::signal(libc::SIGINT, handle_signal as libc::sighandler_t);
    }
    std::thread::Builder::new()
        .name("sysdbd-signal-watcher".to_string())
        .spawn(move || loop {
            if SIGNALED.load(Ordering::Acquire) {
                stop.send();
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(200));
        })
        .expect("failed to spawn signal watcher thread");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unstopped() {
        let signal = StopSignal::default();
        assert!(!signal.is_stopped());
    }

    #[test]
    fn send_is_visible_to_clones() {
        let signal = StopSignal::default();
        let clone = signal.clone();
        clone.send();
        assert!(signal.is_stopped());
    }
}
