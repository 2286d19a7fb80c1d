//! C13 — controller core. The top-level orchestrator: owns the circuits,
//! the planner, the executor, the scheduler, and the state manager, and
//! derives the externally visible controller state from C6/C9's signals
//! rather than persisting it (§3, §9). Grounded in the donor's
//! `watering_system.rs` top-level struct, rebuilt around the synchronous
//! component set this crate generalizes it into.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::circuit::Circuit;
use crate::config::{CircuitConfig, Config, GlobalConfig};
use crate::error::AppError;
use crate::executor::{ExecutorCallbacks, IrrigationExecutor};
use crate::planner::{SingleBatchStrategy, TaskPlanner};
use crate::scheduler::TaskScheduler;
use crate::state::CircuitStateManager;
use crate::status::{CircuitStatus, ControllerStatus};
use crate::threads::{TaskType, ThreadManager};
use crate::time::TimeProvider;
use crate::weather::provider::WeatherProvider;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);
const WEATHER_REFRESH_INTERVAL: Duration = Duration::from_secs(900);

/// Derived controller state (§3), never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Irrigating,
    Stopping,
    Error,
}

impl ControllerState {
    /// Pure function of the three signals named in §3: active IRRIGATION
    /// worker count, whether a stop is in flight, and the sticky error
    /// flag. `error` wins over everything; `stopping` only applies while
    /// workers are still registered.
    fn derive(active_irrigation_workers: usize, stopping: bool, error: bool) -> Self {
        if error {
            ControllerState::Error
        } else if stopping && active_irrigation_workers > 0 {
            ControllerState::Stopping
        } else if active_irrigation_workers > 0 {
            ControllerState::Irrigating
        } else {
            ControllerState::Idle
        }
    }
}

struct ControllerCallbacks {
    error_flag: Arc<AtomicBool>,
}

impl ExecutorCallbacks for ControllerCallbacks {
    fn on_start(&self, circuit_id: u32) {
        info!("circuit {circuit_id} started irrigating");
    }

    fn on_finish(&self, circuit_id: u32, outcome: crate::state::Outcome) {
        info!("circuit {circuit_id} finished with outcome {outcome:?}");
    }

    fn on_fatal(&self, reason: &str) {
        error!("executor reported a fatal condition: {reason}");
        self.error_flag.store(true, Ordering::SeqCst);
    }
}

pub struct Controller {
    configs: Vec<CircuitConfig>,
    global: GlobalConfig,
    circuits: HashMap<u32, Arc<Circuit>>,
    threads: Arc<ThreadManager>,
    state: Arc<CircuitStateManager>,
    weather: Arc<WeatherProvider>,
    time: Arc<dyn TimeProvider>,
    planner: TaskPlanner,
    executor: Arc<IrrigationExecutor>,
    scheduler: TaskScheduler,
    error_flag: Arc<AtomicBool>,
    last_planned: Mutex<HashMap<u32, f64>>,
}

impl Controller {
    pub fn new(
        config: &Config,
        circuits: HashMap<u32, Arc<Circuit>>,
        threads: Arc<ThreadManager>,
        state: Arc<CircuitStateManager>,
        weather: Arc<WeatherProvider>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        let error_flag = Arc::new(AtomicBool::new(false));
        let callbacks = Arc::new(ControllerCallbacks { error_flag: error_flag.clone() });
        let executor = Arc::new(IrrigationExecutor::new(
            threads.clone(),
            circuits.clone(),
            state.clone(),
            weather.clone(),
            config.global.clone(),
            time.clone(),
            callbacks,
        ));
        let scheduler = TaskScheduler::new(threads.clone(), time.clone());

        Self {
            configs: config.circuits.clone(),
            global: config.global.clone(),
            circuits,
            threads,
            state,
            weather,
            time,
            planner: TaskPlanner::new(Box::new(SingleBatchStrategy)),
            executor,
            scheduler,
            error_flag,
            last_planned: Mutex::new(HashMap::new()),
        }
    }

    /// Starts C10/C11: `refresh_state` every 5s (handled inside the
    /// scheduler loop itself), weather-cache refresh, and the per-minute
    /// auto-irrigation check (§4.9).
    pub fn start_background_tasks(self: &Arc<Self>) -> Result<(), AppError> {
        let refresh_self = self.clone();
        let weather_self = self.clone();
        let auto_self = self.clone();
        self.scheduler.start(
            self.global.automation.clone(),
            WEATHER_REFRESH_INTERVAL,
            move || {
                refresh_self.refresh_state();
            },
            move || {
                weather_self.weather.get_recent(1);
            },
            move || {
                if let Err(e) = auto_self.start_auto_cycle() {
                    warn!("auto cycle dispatch failed: {e}");
                }
            },
        )
    }

    pub fn controller_state(&self) -> ControllerState {
        ControllerState::derive(self.executor.active_count(), self.executor.is_stopping(), self.error_flag.load(Ordering::SeqCst))
    }

    /// Recomputes and (for now) only returns the derived state; callers
    /// that need side effects on state change can diff against their own
    /// last-seen value (§4.11's `_refresh_state`).
    pub fn refresh_state(&self) -> ControllerState {
        self.controller_state()
    }

    pub fn pause_auto(&self) {
        self.scheduler.pause_auto();
    }

    pub fn resume_auto(&self) {
        self.scheduler.resume_auto();
    }

    /// No-op if the controller is in ERROR (§4.11).
    pub fn start_auto_cycle(&self) -> Result<(), AppError> {
        if self.controller_state() == ControllerState::Error {
            return Ok(());
        }
        let batches = self.planner.plan(&self.configs, &self.state, &self.weather, &self.global, self.time.as_ref())?;
        {
            let mut last_planned = self.last_planned.lock().unwrap();
            for batch in &batches {
                for planned in batch {
                    last_planned.insert(planned.circuit_id, planned.target_volume);
                }
            }
        }
        let executor = self.executor.clone();
        self.threads.start(TaskType::Executor, "main", move |_cancel| {
            if let Err(e) = executor.run_auto_batches(batches) {
                error!("auto cycle dispatch failed: {e}");
            }
        })?;
        Ok(())
    }

    /// No-op if the controller is in ERROR (§4.11).
    pub fn manual_irrigate(&self, circuit_id: u32, liters: f64) -> Result<(), AppError> {
        if self.controller_state() == ControllerState::Error {
            return Ok(());
        }
        self.last_planned.lock().unwrap().insert(circuit_id, liters);
        let executor = self.executor.clone();
        self.threads.start(TaskType::Executor, "main", move |_cancel| {
            if let Err(e) = executor.run_manual(circuit_id, liters) {
                error!("manual run for circuit {circuit_id} failed to dispatch: {e}");
            }
        })?;
        Ok(())
    }

    pub fn stop_all_irrigation(&self) -> Result<(), AppError> {
        self.executor.stop_all()?;
        self.refresh_state();
        Ok(())
    }

    pub fn get_status(&self) -> ControllerStatus {
        let last_planned = self.last_planned.lock().unwrap();
        let mut zones: Vec<CircuitStatus> = self
            .configs
            .iter()
            .filter_map(|cfg| {
                let runtime = self.circuits.get(&cfg.id).map(|c| c.status());
                let durable = match self.state.get(cfg.id) {
                    Some(snapshot) => snapshot,
                    None => {
                        warn!("no durable snapshot for circuit {}; omitting from status", cfg.id);
                        return None;
                    }
                };
                Some(CircuitStatus::compose(cfg.id, runtime, durable, last_planned.get(&cfg.id).copied()))
            })
            .collect();
        zones.sort_by_key(|z| z.id);

        ControllerStatus {
            controller_state: self.controller_state(),
            auto_enabled: self.global.automation.auto_enabled,
            auto_paused: self.scheduler.is_auto_paused(),
            zones,
        }
    }

    pub fn get_status_message(&self) -> String {
        self.get_status().to_legacy_text()
    }

    /// Stops C10 and C9, joins with a deadline, force-closes every relay,
    /// and writes a clean-shutdown snapshot via C5 (§4.11).
    pub fn shutdown(&self) -> Result<(), AppError> {
        if let Err(e) = self.scheduler.stop(SHUTDOWN_DEADLINE) {
            warn!("scheduler did not stop cleanly: {e}");
        }
        if let Err(e) = self.executor.stop_all() {
            warn!("executor did not stop cleanly: {e}");
        }
        // stop_all only cancels IRRIGATION workers; the EXECUTOR worker
        // supervising the current cycle (started by `start_auto_cycle`/
        // `manual_irrigate`) still needs to be joined itself.
        if let Err(e) = self.threads.wait(TaskType::Executor, "main", SHUTDOWN_DEADLINE) {
            warn!("executor supervising worker did not stop cleanly: {e}");
        }
        for circuit in self.circuits.values() {
            circuit.force_close();
        }
        self.state.shutdown()
    }
}
