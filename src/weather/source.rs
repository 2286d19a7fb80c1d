//! Pluggable weather data sources backing C4. The real network client is
//! external to this crate (§1 Non-goals); `RemoteWeatherSource` is a minimal
//! stand-in grounded in the donor's `RealSensorController` HTTP pattern
//! (`src/sensors/interface.rs`). `SimulatedWeatherSource` is fully in scope
//! (§4.4) and deterministic so tests can assert on its output.

use crate::config::WeatherEndpoints;
use crate::error::AppError;
use crate::weather::Conditions;

pub trait WeatherSource: Send + Sync {
    /// Fetches conditions observed over the last `window_days`. Any
    /// failure (network, auth, malformed payload) is surfaced as
    /// `AppError::WeatherFetch`; the caller (C4) is responsible for
    /// falling back to standard conditions.
    fn fetch(&self, window_days: u32) -> Result<Conditions, AppError>;
}

#[derive(Debug, serde::Deserialize)]
struct RemotePayload {
    solar_total: f64,
    temperature_celsius: f64,
    rainfall_mm: f64,
}

pub struct RemoteWeatherSource {
    endpoint: WeatherEndpoints,
    client: reqwest::blocking::Client,
}

impl RemoteWeatherSource {
    pub fn new(endpoint: WeatherEndpoints) -> Self {
        Self { endpoint, client: reqwest::blocking::Client::new() }
    }
}

impl WeatherSource for RemoteWeatherSource {
    fn fetch(&self, window_days: u32) -> Result<Conditions, AppError> {
        let url = format!("{}?days={}&station={}", self.endpoint.address, window_days, self.endpoint.station_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.endpoint.token)
            .send()
            .map_err(|e| AppError::WeatherFetch(e.to_string()))?;
        let payload: RemotePayload = resp.json().map_err(|e| AppError::WeatherFetch(e.to_string()))?;
        Ok(Conditions {
            solar_total: payload.solar_total,
            temperature_celsius: payload.temperature_celsius,
            rainfall_mm: payload.rainfall_mm,
        })
    }
}

/// Deterministic, bounded synthetic weather, used iff
/// `use_weather_simulator=true` AND `environment != production` (§4.4).
/// Values are a pure function of `window_days` so repeated calls with the
/// same window are reproducible in tests.
pub struct SimulatedWeatherSource;

impl WeatherSource for SimulatedWeatherSource {
    fn fetch(&self, window_days: u32) -> Result<Conditions, AppError> {
        let w = window_days.max(1) as f64;
        // Bounded, deterministic oscillation — no real RNG, no clock read.
        let solar_total = 3.0 + (w * 0.37).sin().abs() * 4.0; // [3, 7] kWh/m^2/day
        let temperature_celsius = 15.0 + (w * 0.21).cos() * 10.0; // [5, 25] C
        let rainfall_mm = ((w * 0.53).sin().max(0.0)) * 12.0; // [0, 12] mm
        Ok(Conditions { solar_total, temperature_celsius, rainfall_mm })
    }
}
