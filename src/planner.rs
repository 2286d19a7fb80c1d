//! C7 (batch strategy) and C8 (task planner). Pure selection logic: given
//! the configured circuits and their durable snapshots, decide which need
//! irrigation today, pre-compute (and record) weather skips, and group the
//! survivors into ordered batches. Grounded in the donor's
//! `watering_alg.rs`/`schedule.rs` zone-selection pass, generalized from a
//! single fixed grouping into an injectable `BatchStrategy`.

use std::collections::HashMap;

use tracing::info;

use crate::config::{CircuitConfig, GlobalConfig};
use crate::error::AppError;
use crate::state::CircuitStateManager;
use crate::time::TimeProvider;
use crate::weather::model;
use crate::weather::provider::WeatherProvider;

/// One circuit queued for execution with its pre-computed target.
#[derive(Debug, Clone)]
pub struct PlannedCircuit {
    pub circuit_id: u32,
    pub target_volume: f64,
}

/// Groups a set of planned circuits into ordered batches (§4.7). The
/// default strategy is single-batch/all-parallel; the trait leaves room
/// for sequential or flow-capped strategies without touching the planner.
pub trait BatchStrategy: Send + Sync {
    fn plan(&self, circuits: Vec<PlannedCircuit>) -> Vec<Vec<PlannedCircuit>>;
}

/// All selected circuits run in one parallel batch, ordered by id (§4.7).
pub struct SingleBatchStrategy;

impl BatchStrategy for SingleBatchStrategy {
    fn plan(&self, mut circuits: Vec<PlannedCircuit>) -> Vec<Vec<PlannedCircuit>> {
        circuits.sort_by_key(|c| c.circuit_id);
        if circuits.is_empty() {
            Vec::new()
        } else {
            vec![circuits]
        }
    }
}

pub struct TaskPlanner {
    strategy: Box<dyn BatchStrategy>,
}

impl TaskPlanner {
    pub fn new(strategy: Box<dyn BatchStrategy>) -> Self {
        Self { strategy }
    }

    /// Selects circuits due today, pre-computes their weather-adjusted
    /// volume, records SKIPPED decisions via `state` for any that the
    /// weather model rejects, and hands the rest to the batch strategy.
    pub fn plan(
        &self,
        configs: &[CircuitConfig],
        state: &CircuitStateManager,
        weather: &WeatherProvider,
        global: &GlobalConfig,
        time: &dyn TimeProvider,
    ) -> Result<Vec<Vec<PlannedCircuit>>, AppError> {
        let now = time.now();
        let last_irrigation_by_id: HashMap<u32, Option<String>> = configs
            .iter()
            .map(|c| (c.id, state.get(c.id).and_then(|s| s.last_irrigation)))
            .collect();

        let mut selected = Vec::new();
        for config in configs {
            if !config.enabled {
                continue;
            }
            let due = match &last_irrigation_by_id[&config.id] {
                None => true,
                Some(last) => days_since(last, now) >= config.interval_days as i64,
            };
            if !due {
                continue;
            }

            let snapshot = weather.get_recent(config.interval_days.max(1));
            let result = model::compute(config, &snapshot.conditions, global);
            if result.skip {
                info!("circuit {} weather-skipped: {}", config.id, result.details);
                state.record_decision(config.id, now)?;
                state.record_result(
                    config.id,
                    crate::state::IrrigationResultRecord {
                        circuit_id: config.id,
                        success: true,
                        outcome: crate::state::Outcome::Skipped,
                        start_time: crate::time::to_iso8601(now),
                        completed_duration: 0,
                        target_duration: 0,
                        actual_volume: 0.0,
                        target_volume: 0.0,
                        error_message: None,
                    },
                )?;
                continue;
            }

            state.record_decision(config.id, now)?;
            selected.push(PlannedCircuit { circuit_id: config.id, target_volume: result.target_volume });
        }

        Ok(self.strategy.plan(selected))
    }
}

/// Whole days elapsed between an ISO-8601 timestamp and `now` (unix secs).
fn days_since(last_iso: &str, now: i64) -> i64 {
    match chrono::DateTime::parse_from_rfc3339(last_iso) {
        Ok(dt) => (now - dt.timestamp()) / 86_400,
        Err(_) => i64::MAX, // unparsable timestamp: treat as long overdue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CorrectionFactors, EmitterModel, GlobalConfig, PathsConfig};
    use crate::time::RealTimeProvider;
    use crate::weather::source::SimulatedWeatherSource;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn circuit(id: u32, interval_days: u32) -> CircuitConfig {
        let mut drippers = BTreeMap::new();
        drippers.insert(10, 1);
        CircuitConfig {
            id,
            name: format!("c{id}"),
            relay_pin: id,
            enabled: true,
            emitter: EmitterModel::EvenArea { target_mm: 5.0, area_m2: 2.0 },
            interval_days,
            drippers,
            correction: CorrectionFactors::default(),
        }
    }

    fn tmp_paths(tag: &str) -> PathsConfig {
        let dir = std::env::temp_dir().join(format!("nic-planner-{tag}-{}", std::process::id()));
        let _ = std::fs::create_dir_all(&dir);
        PathsConfig {
            zones_state_file: dir.join("zones_state.json").to_string_lossy().into_owned(),
            irrigation_log_file: dir.join("irrigation_log.json").to_string_lossy().into_owned(),
        }
    }

    #[test]
    fn selects_circuits_with_no_prior_irrigation() {
        let configs = vec![circuit(1, 1)];
        let paths = tmp_paths("select");
        let state = CircuitStateManager::init_from_disk(&paths, &configs, Arc::new(RealTimeProvider)).unwrap();
        let global = GlobalConfig::default();
        let weather = WeatherProvider::new(Arc::new(SimulatedWeatherSource), Arc::new(RealTimeProvider), &global);
        let planner = TaskPlanner::new(Box::new(SingleBatchStrategy));

        let batches = planner.plan(&configs, &state, &weather, &global, &RealTimeProvider).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].circuit_id, 1);
    }

    #[test]
    fn disabled_circuits_are_never_selected() {
        let mut configs = vec![circuit(1, 1)];
        configs[0].enabled = false;
        let paths = tmp_paths("disabled");
        let state = CircuitStateManager::init_from_disk(&paths, &configs, Arc::new(RealTimeProvider)).unwrap();
        let global = GlobalConfig::default();
        let weather = WeatherProvider::new(Arc::new(SimulatedWeatherSource), Arc::new(RealTimeProvider), &global);
        let planner = TaskPlanner::new(Box::new(SingleBatchStrategy));

        let batches = planner.plan(&configs, &state, &weather, &global, &RealTimeProvider).unwrap();
        assert!(batches.is_empty());
    }
}
