//! C3 — weather model. A pure, deterministic, side-effect-free function
//! from (circuit config, recent weather, globals) to a volume decision.
//! Grounded in the donor's `watering_alg.rs` adjustment math
//! (`adjust_daily_sector_progress`), generalized from a fixed ET/rain
//! adjustment into the full per-factor correction model spec §4.3 names.

use crate::config::{CircuitConfig, GlobalConfig};
use crate::weather::Conditions;

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherModelResult {
    pub target_volume: f64,
    pub min_bound: f64,
    pub max_bound: f64,
    pub skip: bool,
    pub details: String,
}

/// Basal volume under standard (reference) weather, before any correction
/// (§4.2's even-area/dripper formulas; shared with the duration calc in
/// `circuit.rs`).
pub fn base_volume_liters(config: &CircuitConfig) -> f64 {
    match config.emitter {
        crate::config::EmitterModel::EvenArea { target_mm, area_m2 } => target_mm * area_m2,
        crate::config::EmitterModel::Dripper { liters_per_minimum_dripper } => {
            let min_flow = config.min_dripper_flow_lph().unwrap_or(1.0);
            liters_per_minimum_dripper * (config.effective_flow_lph() / min_flow)
        }
    }
}

/// Computes the weather-adjusted target volume for one circuit.
pub fn compute(config: &CircuitConfig, conditions: &Conditions, global: &GlobalConfig) -> WeatherModelResult {
    let base = base_volume_liters(config);
    let standard = &global.standard;

    let solar_delta = conditions.solar_total - standard.solar_total;
    let rain_delta = conditions.rainfall_mm - standard.rainfall;
    let temp_delta = conditions.temperature_celsius - standard.temperature;

    let combined_factor = 1.0
        + (global.correction.solar + config.correction.solar) * solar_delta
        + (global.correction.rain + config.correction.rain) * rain_delta
        + (global.correction.temperature + config.correction.temperature) * temp_delta;

    let adjusted = base * combined_factor;

    let min_percent = global.limits.min_percent;
    let max_percent = global.limits.max_percent;
    let min_bound = base * (min_percent / 100.0);
    let max_bound = base * (max_percent / 100.0);

    let skip = adjusted < min_bound && min_percent == 0.0;
    let target_volume = if skip { 0.0 } else { adjusted.clamp(min_bound, max_bound) };

    let details = format!(
        "base={base:.3}L combined_factor={combined_factor:.4} adjusted={adjusted:.3}L bounds=[{min_bound:.3},{max_bound:.3}]"
    );

    WeatherModelResult { target_volume, min_bound, max_bound, skip, details }
}
