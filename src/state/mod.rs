//! C5 — circuit state manager. Persists `zones_state.json` and appends
//! `irrigation_log.json`, all mutations serialized behind one mutex.
//! Grounded in the donor's actor-thread persistence style
//! (`src/db/mod.rs`), rebuilt around the JSON-file durable model and
//! per-circuit state machine spec §4.5 requires instead of SQLite tables.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{CircuitConfig, PathsConfig};
use crate::error::AppError;
use crate::time::{to_iso8601, TimeProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Idle,
    Waiting,
    Irrigating,
    Disabled,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failed,
    Stopped,
    Interrupted,
    Skipped,
}

/// Events accepted by the per-circuit state machine (§4.5 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    ConfigEnabled,
    ConfigDisabled,
    Scheduled,
    SkipDecision,
    Start,
    CancelOrTimeout,
    Complete,
    Stop,
    Interrupt,
    Fault,
    Shutdown,
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub id: u32,
    pub circuit_state: CircuitState,
    pub last_decision: Option<String>,
    pub last_outcome: Option<Outcome>,
    pub last_irrigation: Option<String>,
    pub last_duration: Option<i64>,
    pub last_volume: Option<f64>,
}

impl CircuitSnapshot {
    fn fresh(id: u32, enabled: bool) -> Self {
        Self {
            id,
            circuit_state: if enabled { CircuitState::Idle } else { CircuitState::Disabled },
            last_decision: None,
            last_outcome: None,
            last_irrigation: None,
            last_duration: None,
            last_volume: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ZonesStateFile {
    last_updated: String,
    circuits: Vec<CircuitSnapshot>,
}

/// Append-only irrigation log entry (§3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrigationResultRecord {
    pub circuit_id: u32,
    pub success: bool,
    pub outcome: Outcome,
    pub start_time: String,
    pub completed_duration: i64,
    pub target_duration: i64,
    pub actual_volume: f64,
    pub target_volume: f64,
    pub error_message: Option<String>,
}

fn transition_table(from: CircuitState, event: StateEvent) -> Option<(CircuitState, Option<Outcome>)> {
    use CircuitState::*;
    use StateEvent::*;
    match (from, event) {
        (Disabled, ConfigEnabled) => Some((Idle, None)),
        (Idle, ConfigDisabled) => Some((Disabled, None)),
        (Idle, Scheduled) => Some((Waiting, None)),
        (Idle, SkipDecision) => Some((Idle, Some(Outcome::Skipped))),
        (Idle, Start) => Some((Irrigating, None)),
        (Waiting, Start) => Some((Irrigating, None)),
        (Waiting, CancelOrTimeout) => Some((Idle, Some(Outcome::Failed))),
        (Irrigating, Complete) => Some((Idle, Some(Outcome::Success))),
        (Irrigating, Stop) => Some((Idle, Some(Outcome::Stopped))),
        (Irrigating, Interrupt) => Some((Idle, Some(Outcome::Interrupted))),
        (Irrigating, Fault) => Some((Idle, Some(Outcome::Failed))),
        (_, Shutdown) => Some((Shutdown, None)),
        _ => None,
    }
}

struct Inner {
    snapshots: HashMap<u32, CircuitSnapshot>,
    last_updated: String,
}

pub struct CircuitStateManager {
    zones_state_path: PathBuf,
    irrigation_log_path: PathBuf,
    time: std::sync::Arc<dyn TimeProvider>,
    inner: Mutex<Inner>,
}

impl CircuitStateManager {
    pub fn init_from_disk(
        paths: &PathsConfig,
        configs: &[CircuitConfig],
        time: std::sync::Arc<dyn TimeProvider>,
    ) -> Result<Self, AppError> {
        let zones_state_path = PathBuf::from(&paths.zones_state_file);
        let irrigation_log_path = PathBuf::from(&paths.irrigation_log_file);

        let loaded = load_zones_state(&zones_state_path);
        let mut snapshots: HashMap<u32, CircuitSnapshot> = HashMap::new();

        match loaded {
            Some(file) => {
                for snap in file.circuits {
                    snapshots.insert(snap.id, snap);
                }
            }
            None => {
                warn!("zones_state file missing, empty, or corrupt — rebuilding from configuration");
            }
        }

        for cfg in configs {
            snapshots.entry(cfg.id).or_insert_with(|| CircuitSnapshot::fresh(cfg.id, cfg.enabled));
        }

        let now = time.now();
        let mut manager =
            Self { zones_state_path, irrigation_log_path, time, inner: Mutex::new(Inner { snapshots, last_updated: to_iso8601(now) }) };

        manager.recover_unclean_shutdown(configs)?;
        manager.persist_locked()?;
        Ok(manager)
    }

    /// §4.5 / §8 invariant 8: any snapshot left IRRIGATING from an unclean
    /// shutdown is rewritten to IDLE/DISABLED with an INTERRUPTED outcome
    /// and exactly one INTERRUPTED log record.
    fn recover_unclean_shutdown(&mut self, configs: &[CircuitConfig]) -> Result<(), AppError> {
        let now = self.time.now();
        let now_iso = to_iso8601(now);
        let enabled_by_id: HashMap<u32, bool> = configs.iter().map(|c| (c.id, c.enabled)).collect();

        let mut to_log = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap();
            for snap in inner.snapshots.values_mut() {
                if snap.circuit_state == CircuitState::Irrigating {
                    let enabled = enabled_by_id.get(&snap.id).copied().unwrap_or(true);
                    snap.circuit_state = if enabled { CircuitState::Idle } else { CircuitState::Disabled };
                    snap.last_outcome = Some(Outcome::Interrupted);
                    snap.last_irrigation = Some(now_iso.clone());
                    snap.last_duration = Some(0);
                    snap.last_volume = Some(0.0);
                    snap.last_decision = Some(now_iso.clone());
                    info!("circuit {} recovered from an unclean shutdown (was IRRIGATING)", snap.id);
                    to_log.push(IrrigationResultRecord {
                        circuit_id: snap.id,
                        success: false,
                        outcome: Outcome::Interrupted,
                        start_time: now_iso.clone(),
                        completed_duration: 0,
                        target_duration: 0,
                        actual_volume: 0.0,
                        target_volume: 0.0,
                        error_message: Some("process restarted while circuit was irrigating".to_owned()),
                    });
                }
            }
        }
        for record in to_log {
            self.append_log(&record)?;
        }
        Ok(())
    }

    pub fn get(&self, circuit_id: u32) -> Option<CircuitSnapshot> {
        self.inner.lock().unwrap().snapshots.get(&circuit_id).cloned()
    }

    pub fn transition(&self, circuit_id: u32, event: StateEvent) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        let snapshot = inner
            .snapshots
            .get_mut(&circuit_id)
            .ok_or_else(|| AppError::Other(format!("unknown circuit {circuit_id}")))?;

        let Some((to, outcome)) = transition_table(snapshot.circuit_state, event) else {
            return Err(AppError::IllegalStateTransition { circuit_id, from: snapshot.circuit_state, event: event.to_string() });
        };
        snapshot.circuit_state = to;
        if let Some(outcome) = outcome {
            snapshot.last_outcome = Some(outcome);
        }
        let now_iso = to_iso8601(self.time.now());
        inner.last_updated = now_iso;
        drop(inner);
        self.persist_locked()
    }

    pub fn record_decision(&self, circuit_id: u32, now: i64) -> Result<(), AppError> {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(snap) = inner.snapshots.get_mut(&circuit_id) {
                snap.last_decision = Some(to_iso8601(now));
            }
        }
        self.persist_locked()
    }

    /// Updates last_outcome/last_irrigation/last_duration/last_volume per
    /// the circuit's event, appends the result to the log, and persists
    /// both files. SKIPPED outcomes leave the prior real-irrigation values
    /// untouched (§3 invariant, §8 invariant 5).
    pub fn record_result(&self, circuit_id: u32, result: IrrigationResultRecord) -> Result<(), AppError> {
        let event = match result.outcome {
            Outcome::Success => StateEvent::Complete,
            Outcome::Stopped => StateEvent::Stop,
            Outcome::Failed => StateEvent::Fault,
            Outcome::Interrupted => StateEvent::Interrupt,
            Outcome::Skipped => StateEvent::SkipDecision,
        };
        self.transition(circuit_id, event)?;

        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(snap) = inner.snapshots.get_mut(&circuit_id) {
                if result.outcome != Outcome::Skipped {
                    snap.last_irrigation = Some(result.start_time.clone());
                    snap.last_duration = Some(result.completed_duration);
                    snap.last_volume = Some(result.actual_volume);
                }
            }
        }

        self.append_log(&result)?;
        self.persist_locked()
    }

    /// Transitions every IRRIGATING/WAITING circuit to SHUTDOWN and
    /// persists, for a clean process exit (§4.5, §4.11).
    pub fn shutdown(&self) -> Result<(), AppError> {
        let ids: Vec<u32> = {
            let inner = self.inner.lock().unwrap();
            inner
                .snapshots
                .values()
                .filter(|s| matches!(s.circuit_state, CircuitState::Irrigating | CircuitState::Waiting))
                .map(|s| s.id)
                .collect()
        };
        for id in ids {
            self.transition(id, StateEvent::Shutdown)?;
        }
        self.persist_locked()
    }

    fn persist_locked(&self) -> Result<(), AppError> {
        let inner = self.inner.lock().unwrap();
        let mut circuits: Vec<CircuitSnapshot> = inner.snapshots.values().cloned().collect();
        circuits.sort_by_key(|s| s.id);
        let file = ZonesStateFile { last_updated: inner.last_updated.clone(), circuits };
        drop(inner);
        atomic_write_json(&self.zones_state_path, &file)
    }

    fn append_log(&self, record: &IrrigationResultRecord) -> Result<(), AppError> {
        let mut entries = read_log(&self.irrigation_log_path).unwrap_or_default();
        entries.push(record.clone());
        atomic_write_json(&self.irrigation_log_path, &entries)
    }

    #[cfg(test)]
    pub fn log_entries(&self) -> Vec<IrrigationResultRecord> {
        read_log(&self.irrigation_log_path).unwrap_or_default()
    }
}

fn load_zones_state(path: &Path) -> Option<ZonesStateFile> {
    let content = fs::read_to_string(path).ok()?;
    if content.trim().is_empty() {
        return None;
    }
    serde_json::from_str(&content).ok()
}

fn read_log(path: &Path) -> Option<Vec<IrrigationResultRecord>> {
    let content = fs::read_to_string(path).ok()?;
    if content.trim().is_empty() {
        return Some(Vec::new());
    }
    serde_json::from_str(&content).ok()
}

/// Write-temp-then-rename so a crash mid-write never leaves a half-written
/// file behind (§4.5).
fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("tmp");
    {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(json.as_bytes())?;
        f.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}
