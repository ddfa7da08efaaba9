// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Nanosecond timestamps, as used for `last_update`/`interval`/`age` (spec.md §3/§4.D).

/// Nanoseconds since the Unix epoch.
pub type SdbTime = u64;

/// Converts a duration to [`SdbTime`], saturating rather than panicking.
#[must_use]
pub fn from_duration(d: std::time::Duration) -> SdbTime {
    d.as_nanos().min(u128::from(u64::MAX)) as SdbTime
}

/// The current wall-clock time, expressed as nanoseconds since the Unix epoch.
///
/// Tests may override this via [`set_now_for_test`] so that monotonicity
/// assertions don't race the real clock.
#[must_use]
pub fn now() -> SdbTime {
    #[cfg(test)]
    {
        if let Some(cell) = NOW_OVERRIDE.get() {
            if let Some(override_val) = *cell.lock().expect("lock is poisoned") {
                return override_val;
            }
        }
    }

    let d = std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    from_duration(d)
}

#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(test)]
static NOW_OVERRIDE: OnceLock<Mutex<Option<SdbTime>>> = OnceLock::new();

#[cfg(test)]
pub(crate) fn set_now_for_test(value: Option<SdbTime>) {
    let cell = NOW_OVERRIDE.get_or_init(|| Mutex::new(None));
    *cell.lock().expect("lock is poisoned") = value;
}

/// Formats a timestamp as `%F %T %z`, per spec.md §4.G.
#[must_use]
pub fn format_datetime(ts: SdbTime) -> String {
    let secs = (ts / 1_000_000_000) as i64;
    let nanos = (ts % 1_000_000_000) as u32;
    match chrono::DateTime::from_timestamp(secs, nanos) {
        Some(dt) => dt.format("%F %T %z").to_string(),
        None => "<error>".to_string(),
    }
}

/// Formats an interval (a duration estimate, in nanoseconds) as a human-readable
/// string. spec.md leaves the exact rendering unspecified (open question (b) only
/// pins down the smoothing coefficients); SysDB renders fractional seconds.
#[must_use]
pub fn format_interval(interval: SdbTime) -> String {
    let secs = interval as f64 / 1_000_000_000.0;
    format!("{secs:.3}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_format() {
        assert_eq!(format_interval(0), "0.000s");
        assert_eq!(format_interval(10_500_000_000), "10.500s");
        assert_eq!(format_interval(1_000_000_000), "1.000s");
    }

    #[test]
    fn datetime_format_roundtrip_shape() {
        let s = format_datetime(1_700_000_000_000_000_000);
        assert!(s.contains('-'));
        assert!(s.contains(':'));
    }
}
