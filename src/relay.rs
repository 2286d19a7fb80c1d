//! C1 — relay driver. Represents one valve (OPEN/CLOSED), hardware or
//! simulated. Grounded in the donor's `SensorController` trait
//! (`src/sensors/interface.rs`), narrowed to a single-valve seam and given
//! the bounded-retry / close-on-drop contract spec §4.1 requires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Open,
    Closed,
}

/// Bounded retries on transient errors, per §4.1 ("at least 3").
const SET_STATE_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

pub trait Relay: Send + Sync {
    /// Applies `target` to hardware with bounded retries on transient
    /// errors. Idempotent: calling with the already-applied state is a
    /// cheap no-op for real implementations, but still goes through the
    /// same retry path so callers don't need to special-case it.
    fn set_state(&self, target: RelayState) -> Result<(), AppError>;

    fn state(&self) -> RelayState;

    /// Best-effort close, called from `finalize` and from drop paths.
    /// Never panics and never surfaces an error past this call, mirroring
    /// §4.1's "never raise during that best-effort close".
    fn force_close(&self) {
        for _ in 0..SET_STATE_RETRIES {
            if self.set_state(RelayState::Closed).is_ok() {
                return;
            }
        }
        error!("relay failed to close after best-effort retries");
    }
}

/// Lets callers keep a shared handle (e.g. for call-count assertions) to a
/// relay that has also been boxed and handed off to a `Circuit`.
impl<T: Relay + ?Sized> Relay for Arc<T> {
    fn set_state(&self, target: RelayState) -> Result<(), AppError> {
        (**self).set_state(target)
    }

    fn state(&self) -> RelayState {
        (**self).state()
    }

    fn force_close(&self) {
        (**self).force_close()
    }
}

/// A single transient-failure-injectable pin, used by both `SimulatedRelay`
/// and as the seam a real `GpioRelay` would drive. The actual hardware
/// driver is out of scope (§1); this trait is the boundary.
pub trait GpioPin: Send + Sync {
    fn write(&self, high: bool) -> Result<(), String>;
}

pub struct GpioRelay<P: GpioPin> {
    pin: P,
    state: AtomicBool, // true == open
}

impl<P: GpioPin> GpioRelay<P> {
    pub fn new(pin: P) -> Self {
        Self { pin, state: AtomicBool::new(false) }
    }
}

impl<P: GpioPin> Relay for GpioRelay<P> {
    fn set_state(&self, target: RelayState) -> Result<(), AppError> {
        let high = target == RelayState::Open;
        let mut last_err = String::new();
        for attempt in 0..SET_STATE_RETRIES {
            match self.pin.write(high) {
                Ok(()) => {
                    self.state.store(high, Ordering::SeqCst);
                    return Ok(());
                }
                Err(e) => {
                    last_err = e;
                    warn!("relay set_state attempt {} failed: {last_err}", attempt + 1);
                    std::thread::sleep(RETRY_BACKOFF);
                }
            }
        }
        Err(AppError::ValveHardware { circuit_id: 0, reason: last_err })
    }

    fn state(&self) -> RelayState {
        if self.state.load(Ordering::SeqCst) { RelayState::Open } else { RelayState::Closed }
    }
}

impl<P: GpioPin> Drop for GpioRelay<P> {
    fn drop(&mut self) {
        self.force_close();
    }
}

/// In-memory relay for tests and for running without hardware attached.
/// Fault-injectable so tests can exercise the FAILED-on-close outcome (S5).
pub struct SimulatedRelay {
    state: AtomicBool, // true == open
    fail_closes: AtomicBool,
}

impl SimulatedRelay {
    pub fn new() -> Self {
        Self { state: AtomicBool::new(false), fail_closes: AtomicBool::new(false) }
    }

    /// Test hook: make every subsequent `set_state(Closed)` fail.
    pub fn set_fail_closes(&self, fail: bool) {
        self.fail_closes.store(fail, Ordering::SeqCst);
    }
}

impl Default for SimulatedRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay for SimulatedRelay {
    fn set_state(&self, target: RelayState) -> Result<(), AppError> {
        if target == RelayState::Closed && self.fail_closes.load(Ordering::SeqCst) {
            return Err(AppError::ValveHardware { circuit_id: 0, reason: "simulated close failure".into() });
        }
        self.state.store(target == RelayState::Open, Ordering::SeqCst);
        Ok(())
    }

    fn state(&self) -> RelayState {
        if self.state.load(Ordering::SeqCst) { RelayState::Open } else { RelayState::Closed }
    }
}

impl Drop for SimulatedRelay {
    fn drop(&mut self) {
        self.force_close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_closed() {
        let r = SimulatedRelay::new();
        assert_eq!(r.state(), RelayState::Closed);
    }

    #[test]
    fn open_then_close() {
        let r = SimulatedRelay::new();
        r.set_state(RelayState::Open).unwrap();
        assert_eq!(r.state(), RelayState::Open);
        r.set_state(RelayState::Closed).unwrap();
        assert_eq!(r.state(), RelayState::Closed);
    }

    #[test]
    fn force_close_never_panics_on_persistent_failure() {
        let r = SimulatedRelay::new();
        r.set_state(RelayState::Open).unwrap();
        r.set_fail_closes(true);
        r.force_close(); // must not panic even though every retry fails
    }
}
