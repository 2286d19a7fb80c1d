//! C9 — irrigation executor. Runs planned batches sequentially; within a
//! batch, spawns one IRRIGATION worker per circuit via C6 and serializes
//! lifecycle callbacks so C5 sees a strict per-circuit transition order.
//! Grounded in the donor's cycle-runner in `watering_system.rs`, rebuilt
//! around `ThreadManager` instead of a `tokio::JoinSet`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{error, info};

use crate::circuit::{Circuit, Mode};
use crate::config::GlobalConfig;
use crate::error::AppError;
use crate::planner::PlannedCircuit;
use crate::state::{CircuitStateManager, IrrigationResultRecord, StateEvent};
use crate::threads::{TaskType, ThreadManager};
use crate::time::{to_iso8601, TimeProvider};
use crate::weather::provider::WeatherProvider;

/// No explicit deadline is named in §5 for a worker's *normal* completion
/// (only for the cancelled path); this bounds it generously so a stuck
/// worker cannot wedge `wait_all` forever.
const NORMAL_JOIN_DEADLINE: Duration = Duration::from_secs(6 * 3600);
/// §5: whole `stop_all` completes within 30 seconds.
const STOP_ALL_DEADLINE: Duration = Duration::from_secs(30);

pub trait ExecutorCallbacks: Send + Sync {
    fn on_start(&self, circuit_id: u32);
    fn on_finish(&self, circuit_id: u32, outcome: crate::state::Outcome);
    fn on_fatal(&self, reason: &str);
}

pub struct IrrigationExecutor {
    threads: Arc<ThreadManager>,
    circuits: HashMap<u32, Arc<Circuit>>,
    state: Arc<CircuitStateManager>,
    weather: Arc<WeatherProvider>,
    global: GlobalConfig,
    time: Arc<dyn TimeProvider>,
    stop_event: Arc<AtomicBool>,
    callbacks: Arc<dyn ExecutorCallbacks>,
    /// Serializes `on_start`/`on_finish` dispatch (§5 ordering guarantee).
    dispatch_lock: Arc<Mutex<()>>,
}

impl IrrigationExecutor {
    pub fn new(
        threads: Arc<ThreadManager>,
        circuits: HashMap<u32, Arc<Circuit>>,
        state: Arc<CircuitStateManager>,
        weather: Arc<WeatherProvider>,
        global: GlobalConfig,
        time: Arc<dyn TimeProvider>,
        callbacks: Arc<dyn ExecutorCallbacks>,
    ) -> Self {
        Self {
            threads,
            circuits,
            state,
            weather,
            global,
            time,
            stop_event: Arc::new(AtomicBool::new(false)),
            callbacks,
            dispatch_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stop_event.load(Ordering::SeqCst)
    }

    /// Dispatches a planned auto cycle: circuits transition IDLE→WAITING
    /// before their worker starts, then WAITING→IRRIGATING when it does.
    pub fn run_auto_batches(&self, batches: Vec<Vec<PlannedCircuit>>) -> Result<(), AppError> {
        self.stop_event.store(false, Ordering::SeqCst);
        for batch in batches {
            if self.stop_event.load(Ordering::SeqCst) {
                break;
            }
            self.run_batch(batch, Mode::Auto, true)?;
        }
        Ok(())
    }

    /// Dispatches a single manual run as a one-circuit batch, skipping the
    /// WAITING state (§4.5 table: IDLE -start-> IRRIGATING directly).
    pub fn run_manual(&self, circuit_id: u32, liters: f64) -> Result<(), AppError> {
        self.stop_event.store(false, Ordering::SeqCst);
        let batch = vec![PlannedCircuit { circuit_id, target_volume: liters }];
        self.run_batch(batch, Mode::Manual, false)
    }

    fn run_batch(&self, mut batch: Vec<PlannedCircuit>, mode: Mode, via_waiting: bool) -> Result<(), AppError> {
        batch.sort_by_key(|p| p.circuit_id);

        let mut started = Vec::new();
        for planned in &batch {
            let Some(circuit) = self.circuits.get(&planned.circuit_id).cloned() else {
                continue;
            };

            if via_waiting {
                self.state.transition(planned.circuit_id, StateEvent::Scheduled)?;
            }

            let requested_liters = matches!(mode, Mode::Manual).then_some(planned.target_volume);
            let circuit_id = planned.circuit_id;
            let state = self.state.clone();
            let weather = self.weather.clone();
            let global = self.global.clone();
            let time = self.time.clone();
            let callbacks = self.callbacks.clone();
            let dispatch_lock = self.dispatch_lock.clone();

            let cancel = self.threads.start(TaskType::Irrigation, circuit_id.to_string(), move |cancel| {
                if state.transition(circuit_id, StateEvent::Start).is_err() {
                    error!("circuit {circuit_id} could not transition to IRRIGATING; skipping run");
                    return;
                }
                let started_lock = dispatch_lock.clone();
                let started_callbacks = callbacks.clone();
                let run = circuit.irrigate(mode, requested_liters, &weather, &global, time.as_ref(), cancel, move |id| {
                    let _guard = started_lock.lock().unwrap();
                    started_callbacks.on_start(id);
                });

                let record = IrrigationResultRecord {
                    circuit_id,
                    success: matches!(run.outcome, crate::state::Outcome::Success),
                    outcome: run.outcome,
                    start_time: to_iso8601(run.start_time),
                    completed_duration: run.completed_duration,
                    target_duration: run.target_duration,
                    actual_volume: run.actual_volume,
                    target_volume: run.target_volume,
                    error_message: run.error_message,
                };
                if let Err(e) = state.record_result(circuit_id, record) {
                    error!("circuit {circuit_id}: failed to persist irrigation result: {e}");
                }
                let _guard = dispatch_lock.lock().unwrap();
                callbacks.on_finish(circuit_id, run.outcome);
            })?;
            started.push((circuit_id, cancel));
            info!("started IRRIGATION worker for circuit {circuit_id}");
        }

        for (circuit_id, _cancel) in &started {
            if let Err(e) = self.threads.wait(TaskType::Irrigation, &circuit_id.to_string(), NORMAL_JOIN_DEADLINE) {
                error!("circuit {circuit_id} worker did not join within the deadline: {e}");
                self.callbacks.on_fatal(&format!("circuit {circuit_id} worker join timeout"));
            }
        }
        Ok(())
    }

    /// Signals every active worker to cancel and waits up to 30s total for
    /// them to join (§5). A timeout here is fatal (`on_fatal`).
    pub fn stop_all(&self) -> Result<(), AppError> {
        self.stop_event.store(true, Ordering::SeqCst);
        match self.threads.stop_all(TaskType::Irrigation, STOP_ALL_DEADLINE) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.callbacks.on_fatal("stop_all exceeded its join deadline");
                Err(e)
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.threads.active_count(TaskType::Irrigation)
    }
}
