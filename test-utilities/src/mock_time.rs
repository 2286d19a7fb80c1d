use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use nic::time::TimeProvider;

/// A controllable virtual clock: `sleep` advances the clock instead of
/// blocking the calling thread, so duration-dependent tests (e.g. a full
/// 3600s irrigation) run instantly.
#[derive(Debug)]
pub struct MockTime {
    now: AtomicI64,
}

impl MockTime {
    pub fn new(start: i64) -> Self {
        Self { now: AtomicI64::new(start) }
    }

    pub fn set(&self, ts: i64) {
        self.now.store(ts, Ordering::SeqCst);
    }

    pub fn advance(&self, duration: Duration) {
        self.now.fetch_add(duration.as_secs() as i64, Ordering::SeqCst);
    }
}

impl TimeProvider for MockTime {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
