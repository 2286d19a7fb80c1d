//! C2 — circuit. Owns one relay, its configuration, and the in-memory
//! runtime status updated while an irrigation run is in progress. Grounded
//! in the donor's `watering_system.rs` per-zone driver loop, rebuilt around
//! the init/execute/finalize phase split and cancel-token cooperation
//! spec §4.2/§5 require instead of the donor's async select loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::{CircuitConfig, GlobalConfig};
use crate::relay::{Relay, RelayState};
use crate::state::Outcome;
use crate::threads::CancelToken;
use crate::time::TimeProvider;
use crate::weather::model;
use crate::weather::provider::WeatherProvider;

const PROGRESS_STEP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Auto,
    Manual,
}

/// In-memory status, rebuilt each process run (§3). Held behind the
/// circuit's `status: Mutex<RuntimeStatus>`, locked on every progress
/// update and read by `Circuit::status()`.
#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub active: bool,
    pub mode: Option<Mode>,
    pub target_volume: f64,
    pub current_volume: f64,
    pub target_duration: i64,
    pub elapsed_seconds: i64,
    pub progress_percent: f64,
    pub has_fault: bool,
    pub fault_reason: Option<String>,
}

impl Default for RuntimeStatus {
    fn default() -> Self {
        Self {
            active: false,
            mode: None,
            target_volume: 0.0,
            current_volume: 0.0,
            target_duration: 0,
            elapsed_seconds: 0,
            progress_percent: 0.0,
            has_fault: false,
            fault_reason: None,
        }
    }
}

/// The outcome of one `irrigate()` call, enough for the caller to build an
/// `IrrigationResultRecord` (circuit id and log bookkeeping live one layer
/// up, in C9/C5).
#[derive(Debug, Clone)]
pub struct IrrigationRun {
    pub outcome: Outcome,
    pub start_time: i64,
    pub completed_duration: i64,
    pub target_duration: i64,
    pub actual_volume: f64,
    pub target_volume: f64,
    pub error_message: Option<String>,
}

/// Effective flow rate in L/h, shared by the volume-to-duration conversion
/// for both emitter modes (§4.2).
fn effective_flow_lph(config: &CircuitConfig) -> f64 {
    config.effective_flow_lph()
}

/// Duration in whole seconds for `liters` at `flow_lph`, rounded to the
/// nearest second with ties rounding up (§4.2). `f64::round` already rounds
/// half away from zero, which is round-half-up for the non-negative inputs
/// this is always called with.
fn duration_seconds(liters: f64, flow_lph: f64) -> i64 {
    if flow_lph <= 0.0 {
        return 0;
    }
    (3600.0 * liters / flow_lph).round() as i64
}

/// Safety ceiling for MANUAL requests: the same `max_percent` cap the
/// weather model applies to AUTO runs, computed against the circuit's
/// basal volume rather than a weather-adjusted one (§4.2).
fn manual_safety_max(config: &CircuitConfig, global: &GlobalConfig) -> f64 {
    model::base_volume_liters(config) * (global.limits.max_percent / 100.0)
}

pub struct Circuit {
    pub id: u32,
    config: CircuitConfig,
    relay: Box<dyn Relay>,
    status: Mutex<RuntimeStatus>,
    faulted: AtomicBool,
}

impl Circuit {
    pub fn new(config: CircuitConfig, relay: Box<dyn Relay>) -> Self {
        Self { id: config.id, config, relay, status: Mutex::new(RuntimeStatus::default()), faulted: AtomicBool::new(false) }
    }

    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    pub fn status(&self) -> RuntimeStatus {
        self.status.lock().unwrap().clone()
    }

    pub fn has_fault(&self) -> bool {
        self.faulted.load(Ordering::SeqCst)
    }

    /// Best-effort close used outside a run (e.g. at shutdown).
    pub fn force_close(&self) {
        self.relay.force_close();
    }

    /// Runs one irrigation to completion (or until cancelled / faulted).
    /// `on_started` fires once `init` has computed the target volume and
    /// duration and the runtime status is visible to readers, before the
    /// valve is opened — this is what C9 uses to emit `on_start`.
    pub fn irrigate(
        &self,
        mode: Mode,
        requested_liters: Option<f64>,
        weather: &WeatherProvider,
        global: &GlobalConfig,
        time: &dyn TimeProvider,
        cancel: CancelToken,
        on_started: impl FnOnce(u32),
    ) -> IrrigationRun {
        let start_time = time.now();

        // init
        let flow = effective_flow_lph(&self.config);
        let (target_volume, skip) = match mode {
            Mode::Auto => {
                let snapshot = weather.get_recent(self.config.interval_days.max(1));
                let result = model::compute(&self.config, &snapshot.conditions, global);
                (result.target_volume, result.skip)
            }
            Mode::Manual => {
                let liters = requested_liters.unwrap_or(0.0);
                let max = manual_safety_max(&self.config, global);
                if liters <= 0.0 || liters > max {
                    return IrrigationRun {
                        outcome: Outcome::Failed,
                        start_time,
                        completed_duration: 0,
                        target_duration: 0,
                        actual_volume: 0.0,
                        target_volume: 0.0,
                        error_message: Some(format!(
                            "manual request {liters}L out of bounds (0, {max}]"
                        )),
                    };
                }
                (liters, false)
            }
        };

        if skip {
            info!("circuit {} skipped by weather model", self.id);
            *self.status.lock().unwrap() = RuntimeStatus::default();
            return IrrigationRun {
                outcome: Outcome::Skipped,
                start_time,
                completed_duration: 0,
                target_duration: 0,
                actual_volume: 0.0,
                target_volume: 0.0,
                error_message: None,
            };
        }

        let target_duration = duration_seconds(target_volume, flow);
        {
            let mut status = self.status.lock().unwrap();
            *status = RuntimeStatus {
                active: true,
                mode: Some(mode),
                target_volume,
                current_volume: 0.0,
                target_duration,
                elapsed_seconds: 0,
                progress_percent: 0.0,
                has_fault: false,
                fault_reason: None,
            };
        }
        on_started(self.id);

        // execute
        let mut outcome = Outcome::Success;
        let mut error_message = None;
        if let Err(e) = self.relay.set_state(RelayState::Open) {
            error!("circuit {} failed to open valve: {e}", self.id);
            outcome = Outcome::Failed;
            error_message = Some(e.to_string());
            self.faulted.store(true, Ordering::SeqCst);
        } else {
            let mut elapsed = 0i64;
            loop {
                if elapsed >= target_duration {
                    break;
                }
                if cancel.is_cancelled() {
                    outcome = Outcome::Stopped;
                    break;
                }
                let remaining = target_duration - elapsed;
                let step = PROGRESS_STEP.min(Duration::from_secs(remaining.max(0) as u64));
                time.sleep(step);
                elapsed += step.as_secs() as i64;

                let current_volume = (flow * elapsed as f64 / 3600.0).min(target_volume);
                let progress_percent = if target_duration > 0 { 100.0 * elapsed as f64 / target_duration as f64 } else { 100.0 };
                let mut status = self.status.lock().unwrap();
                status.current_volume = current_volume;
                status.elapsed_seconds = elapsed;
                status.progress_percent = progress_percent.min(100.0);
            }
        }

        // finalize — always runs, not cancellable, has its own bounded retries
        if let Err(e) = self.relay.set_state(RelayState::Closed) {
            error!("circuit {} failed to close valve: {e}", self.id);
            self.faulted.store(true, Ordering::SeqCst);
            outcome = Outcome::Failed;
            error_message = Some(e.to_string());
        }

        let final_status = self.status.lock().unwrap().clone();
        let completed_duration = final_status.elapsed_seconds;
        let actual_volume = final_status.current_volume;

        {
            let mut status = self.status.lock().unwrap();
            status.active = false;
            status.has_fault = self.faulted.load(Ordering::SeqCst);
            status.fault_reason = error_message.clone();
        }

        if !matches!(outcome, Outcome::Success) && completed_duration == 0 {
            warn!("circuit {} finished with zero elapsed time, outcome={outcome:?}", self.id);
        }

        IrrigationRun { outcome, start_time, completed_duration, target_duration, actual_volume, target_volume, error_message }
    }
}
