//! Pluggable clock, generalizing the donor's `TimeProvider` trait to the
//! synchronous, OS-thread concurrency model (no `async fn`).

use std::fmt::Debug;
use std::time::Duration;

/// Abstracts "now" and "sleep" so the scheduler (C10/C11) and the irrigation
/// loop (C2) can be driven deterministically in tests.
pub trait TimeProvider: Send + Sync + Debug {
    /// Current time as a Unix UTC timestamp, in seconds.
    fn now(&self) -> i64;

    /// Blocks the calling thread for `duration`. Real providers sleep on the
    /// OS; simulated providers may return immediately after advancing a
    /// virtual clock.
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Converts a Unix timestamp into the ISO-8601 UTC string form persisted in
/// snapshots and log records (§3, §6).
pub fn to_iso8601(ts: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_default()
}

pub fn iso8601_now(time: &dyn TimeProvider) -> String {
    to_iso8601(time.now())
}
