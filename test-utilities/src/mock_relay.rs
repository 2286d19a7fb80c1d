use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use nic::error::AppError;
use nic::relay::{Relay, RelayState};

/// A relay double that records every state change and can be told to fail
/// opens and/or closes, for exercising the FAILED-outcome path (scenario
/// S5) without real hardware.
pub struct MockRelay {
    state: AtomicBool, // true == open
    fail_opens: AtomicBool,
    fail_closes: AtomicBool,
    open_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

impl MockRelay {
    pub fn new() -> Self {
        Self {
            state: AtomicBool::new(false),
            fail_opens: AtomicBool::new(false),
            fail_closes: AtomicBool::new(false),
            open_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_closes(&self, fail: bool) {
        self.fail_closes.store(fail, Ordering::SeqCst);
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay for MockRelay {
    fn set_state(&self, target: RelayState) -> Result<(), AppError> {
        match target {
            RelayState::Open => {
                self.open_calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_opens.load(Ordering::SeqCst) {
                    return Err(AppError::ValveHardware { circuit_id: 0, reason: "mock open failure".into() });
                }
            }
            RelayState::Closed => {
                self.close_calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_closes.load(Ordering::SeqCst) {
                    return Err(AppError::ValveHardware { circuit_id: 0, reason: "mock close failure".into() });
                }
            }
        }
        self.state.store(target == RelayState::Open, Ordering::SeqCst);
        Ok(())
    }

    fn state(&self) -> RelayState {
        if self.state.load(Ordering::SeqCst) { RelayState::Open } else { RelayState::Closed }
    }
}

impl Drop for MockRelay {
    fn drop(&mut self) {
        self.force_close();
    }
}
