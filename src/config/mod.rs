pub mod run_options;

use run_options::Args;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;

use crate::error::AppError;

pub const CONFIG_FILE: &str = "./nic.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    pub zones_state_file: String,
    pub irrigation_log_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { zones_state_file: "zones_state.json".to_owned(), irrigation_log_file: "irrigation_log.json".to_owned() }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StandardConditions {
    /// kWh/m^2/day
    pub solar_total: f64,
    /// degrees Celsius
    pub temperature: f64,
    /// mm
    pub rainfall: f64,
}

impl Default for StandardConditions {
    fn default() -> Self {
        Self { solar_total: 5.0, temperature: 20.0, rainfall: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct CorrectionFactors {
    pub solar: f64,
    pub rain: f64,
    pub temperature: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct IrrigationLimits {
    pub min_percent: f64,
    pub max_percent: f64,
    pub main_valve_max_flow: f64,
}

impl Default for IrrigationLimits {
    fn default() -> Self {
        Self { min_percent: 20.0, max_percent: 300.0, main_valve_max_flow: 3000.0 }
    }
}

impl IrrigationLimits {
    fn validate(&self) -> Result<(), AppError> {
        if self.min_percent > 100.0 || self.max_percent < 100.0 {
            return Err(AppError::Config(format!(
                "irrigation limits must satisfy min_percent <= 100 <= max_percent, got [{}, {}]",
                self.min_percent, self.max_percent
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
    Development,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutomationConfig {
    pub auto_enabled: bool,
    pub scheduled_hour: u32,
    pub scheduled_minute: u32,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub use_weather_simulator: bool,
    #[serde(default)]
    pub max_flow_monitoring: bool,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            auto_enabled: true,
            scheduled_hour: 22,
            scheduled_minute: 0,
            environment: Environment::Development,
            use_weather_simulator: true,
            max_flow_monitoring: false,
        }
    }
}

impl AutomationConfig {
    fn validate(&self) -> Result<(), AppError> {
        if self.scheduled_hour > 23 {
            return Err(AppError::Config(format!("scheduled_hour {} out of range [0,23]", self.scheduled_hour)));
        }
        if self.scheduled_minute > 59 {
            return Err(AppError::Config(format!("scheduled_minute {} out of range [0,59]", self.scheduled_minute)));
        }
        Ok(())
    }

    /// Simulator use is gated on the environment, not just the flag (§4.4).
    pub fn simulator_active(&self) -> bool {
        self.use_weather_simulator && self.environment != Environment::Production
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "nic=info".to_owned()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: default_log_filter() }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GeoPos {
    pub lat: f64,
    pub long: f64,
    pub elev: f64,
}

impl Default for GeoPos {
    fn default() -> Self {
        Self { lat: 40.440_725, long: -8.682_944, elev: 51.0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherEndpoints {
    pub address: String,
    pub geo_pos: GeoPos,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: i64,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub station_id: String,
}

fn default_cache_ttl() -> i64 {
    900
}

impl Default for WeatherEndpoints {
    fn default() -> Self {
        Self {
            address: "https://weather.example/api".to_owned(),
            geo_pos: GeoPos::default(),
            cache_ttl_secs: default_cache_ttl(),
            token: String::new(),
            station_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GlobalConfig {
    #[serde(default)]
    pub standard: StandardConditions,
    #[serde(default)]
    pub correction: CorrectionFactors,
    #[serde(default)]
    pub limits: IrrigationLimits,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub weather: WeatherEndpoints,
}

impl GlobalConfig {
    fn validate(&self) -> Result<(), AppError> {
        self.limits.validate()?;
        self.automation.validate()?;
        Ok(())
    }
}

/// Which water-amount input mode a circuit uses. Exactly one variant is
/// active per circuit (§3 invariant).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitterModel {
    EvenArea { target_mm: f64, area_m2: f64 },
    Dripper { liters_per_minimum_dripper: f64 },
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitConfig {
    pub id: u32,
    pub name: String,
    pub relay_pin: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub emitter: EmitterModel,
    pub interval_days: u32,
    /// flow rate in L/h -> dripper count at that rate. Must be non-empty;
    /// keys must be positive integers (§3 invariant).
    pub drippers: BTreeMap<u32, u32>,
    #[serde(default)]
    pub correction: CorrectionFactors,
}

fn default_true() -> bool {
    true
}

impl CircuitConfig {
    /// Sum of `dripper_flow_lph * count` across the inventory, in L/h.
    pub fn effective_flow_lph(&self) -> f64 {
        self.drippers.iter().map(|(flow, count)| *flow as f64 * *count as f64).sum()
    }

    /// Flow rate, in L/h, of the slowest dripper in the inventory. Used by
    /// the dripper-mode volume formula (§4.2).
    pub fn min_dripper_flow_lph(&self) -> Option<f64> {
        self.drippers.keys().min().map(|f| *f as f64)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.drippers.is_empty() {
            return Err(AppError::Config(format!("circuit {} has an empty dripper inventory", self.id)));
        }
        if self.drippers.keys().any(|flow| *flow == 0) {
            return Err(AppError::Config(format!("circuit {} has a non-positive dripper flow rate", self.id)));
        }
        if self.effective_flow_lph() <= 0.0 {
            return Err(AppError::Config(format!("circuit {} has zero effective flow", self.id)));
        }
        if let EmitterModel::EvenArea { target_mm, area_m2 } = self.emitter {
            if target_mm <= 0.0 || area_m2 <= 0.0 {
                return Err(AppError::Config(format!("circuit {} even-area mode needs positive target_mm/area_m2", self.id)));
            }
        }
        if let EmitterModel::Dripper { liters_per_minimum_dripper } = self.emitter {
            if liters_per_minimum_dripper <= 0.0 {
                return Err(AppError::Config(format!(
                    "circuit {} dripper mode needs a positive liters_per_minimum_dripper",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub global: GlobalConfig,
    pub circuits: Vec<CircuitConfig>,
}

impl Config {
    pub fn load(args: Args) -> Result<Self, AppError> {
        let config_content = fs::read_to_string(&args.cfg_file)
            .map_err(|e| AppError::Config(format!("unable to read {:?}: {e}", args.cfg_file)))?;
        Self::load_from_str(&config_content)
    }

    pub fn load_from_str(config_str: &str) -> Result<Self, AppError> {
        let config: Config = toml::from_str(config_str).map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        self.global.validate()?;
        for circuit in &self.circuits {
            circuit.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [[circuits]]
        id = 1
        name = "front lawn"
        relay_pin = 17
        interval_days = 2
        [circuits.emitter]
        even_area = { target_mm = 5.0, area_m2 = 2.0 }
        [circuits.drippers]
        10 = 1
    "#;

    #[test]
    fn load_minimal() {
        let cfg = Config::load_from_str(MINIMAL).unwrap();
        assert_eq!(cfg.circuits.len(), 1);
        assert_eq!(cfg.circuits[0].effective_flow_lph(), 10.0);
        assert!(cfg.global.limits.min_percent <= 100.0);
    }

    #[test]
    fn rejects_empty_dripper_inventory() {
        let bad = r#"
            [[circuits]]
            id = 1
            name = "x"
            relay_pin = 1
            interval_days = 1
            [circuits.emitter]
            dripper = { liters_per_minimum_dripper = 2.0 }
            [circuits.drippers]
        "#;
        assert!(Config::load_from_str(bad).is_err());
    }

    #[test]
    fn rejects_bad_limits() {
        let bad = format!(
            "{}\n[global.limits]\nmin_percent = 150.0\nmax_percent = 300.0\nmain_valve_max_flow = 1.0\n",
            MINIMAL
        );
        assert!(Config::load_from_str(&bad).is_err());
    }
}
