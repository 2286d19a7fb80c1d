//! Shared scaffolding for the end-to-end scenario tests (spec §8 S1-S6).
//! Mirrors the donor's `tests/common/` convention (see
//! `examples/CarlosLagarto-nic/nic/tests/common/mock_sensors.rs`): plain
//! helper functions, not a test themselves, building a full
//! config -> state -> controller stack against the real public API.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nic::circuit::Circuit;
use nic::config::{
    AutomationConfig, CircuitConfig, Config, CorrectionFactors, EmitterModel, GlobalConfig, IrrigationLimits,
    LoggingConfig, PathsConfig, StandardConditions, WeatherEndpoints,
};
use nic::controller::{Controller, ControllerState};
use nic::relay::{Relay, SimulatedRelay};
use nic::state::{CircuitStateManager, IrrigationResultRecord};
use nic::threads::ThreadManager;
use nic::time::TimeProvider;
use nic::weather::provider::WeatherProvider;
use nic::weather::source::WeatherSource;

#[allow(dead_code)]
pub fn tmp_paths(tag: &str) -> PathsConfig {
    let dir = std::env::temp_dir().join(format!("nic-it-{tag}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    PathsConfig {
        zones_state_file: dir.join("zones_state.json").to_string_lossy().into_owned(),
        irrigation_log_file: dir.join("irrigation_log.json").to_string_lossy().into_owned(),
    }
}

#[allow(dead_code)]
pub fn even_area_circuit(id: u32, interval_days: u32, target_mm: f64, area_m2: f64, dripper_flow_lph: u32) -> CircuitConfig {
    let mut drippers = BTreeMap::new();
    drippers.insert(dripper_flow_lph, 1);
    CircuitConfig {
        id,
        name: format!("circuit-{id}"),
        relay_pin: id,
        enabled: true,
        emitter: EmitterModel::EvenArea { target_mm, area_m2 },
        interval_days,
        drippers,
        correction: CorrectionFactors::default(),
    }
}

/// Standard conditions equal to the observed weather by default (§8 S1),
/// with the same rain-correction factor as the scenario table (§8 S2).
#[allow(dead_code)]
pub fn global_config(min_percent: f64, max_percent: f64) -> GlobalConfig {
    GlobalConfig {
        standard: StandardConditions { solar_total: 5.0, temperature: 20.0, rainfall: 0.0 },
        correction: CorrectionFactors { solar: 0.0, rain: -0.15, temperature: 0.0 },
        limits: IrrigationLimits { min_percent, max_percent, main_valve_max_flow: 3000.0 },
        automation: AutomationConfig { auto_enabled: false, ..Default::default() },
        logging: LoggingConfig::default(),
        weather: WeatherEndpoints::default(),
    }
}

pub struct Harness {
    pub controller: Arc<Controller>,
    pub state: Arc<CircuitStateManager>,
    pub paths: PathsConfig,
}

/// Wires a full `Config` -> `CircuitStateManager` -> `WeatherProvider` ->
/// `Controller` stack, the same order `main.rs` bootstraps in, but without
/// starting the scheduler — tests dispatch cycles directly so they aren't
/// at the mercy of the 5s/60s background tick cadence.
#[allow(dead_code)]
pub fn build(
    circuits_cfg: Vec<CircuitConfig>,
    global: GlobalConfig,
    time: Arc<dyn TimeProvider>,
    weather_source: Arc<dyn WeatherSource>,
    mut relays: HashMap<u32, Box<dyn Relay>>,
    tag: &str,
) -> Harness {
    let paths = tmp_paths(tag);
    let config = Config { paths: paths.clone(), global, circuits: circuits_cfg.clone() };

    let state = Arc::new(CircuitStateManager::init_from_disk(&config.paths, &config.circuits, time.clone()).unwrap());
    let weather = Arc::new(WeatherProvider::new(weather_source, time.clone(), &config.global));
    let threads = Arc::new(ThreadManager::new());

    let circuits: HashMap<u32, Arc<Circuit>> = circuits_cfg
        .iter()
        .map(|cfg| {
            let relay = relays.remove(&cfg.id).unwrap_or_else(|| Box::new(SimulatedRelay::new()) as Box<dyn Relay>);
            (cfg.id, Arc::new(Circuit::new(cfg.clone(), relay)))
        })
        .collect();

    let controller = Arc::new(Controller::new(&config, circuits, threads, state.clone(), weather, time));
    Harness { controller, state, paths }
}

#[allow(dead_code)]
pub fn wait_until(controller: &Controller, target: ControllerState, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if controller.controller_state() == target {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[allow(dead_code)]
pub fn read_log(paths: &PathsConfig) -> Vec<IrrigationResultRecord> {
    let content = fs::read_to_string(&paths.irrigation_log_file).unwrap_or_default();
    if content.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str(&content).unwrap_or_default()
}
