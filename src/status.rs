//! C12 — status aggregator. Composes per-circuit runtime (C2) and durable
//! (C5) state into one view, plus renders the controller-level status in
//! both the structured and legacy text forms named in §6.

use crate::circuit::RuntimeStatus;
use crate::controller::ControllerState;
use crate::state::{CircuitState, Outcome};

#[derive(Debug, Clone)]
pub struct CircuitStatus {
    pub id: u32,
    pub circuit_state: CircuitState,
    pub active: bool,
    pub target_volume: f64,
    pub current_volume: f64,
    pub target_duration: i64,
    pub elapsed_seconds: i64,
    pub progress_percent: f64,
    pub has_fault: bool,
    pub fault_reason: Option<String>,
    pub last_outcome: Option<Outcome>,
    pub last_irrigation: Option<String>,
    pub last_duration: Option<i64>,
    pub last_volume: Option<f64>,
}

impl CircuitStatus {
    pub fn compose(
        id: u32,
        runtime: Option<RuntimeStatus>,
        durable: crate::state::CircuitSnapshot,
        planned_target: Option<f64>,
    ) -> Self {
        let runtime = runtime.unwrap_or_default();
        let target_volume = if runtime.active { runtime.target_volume } else { planned_target.unwrap_or(runtime.target_volume) };
        Self {
            id,
            circuit_state: durable.circuit_state,
            active: runtime.active,
            target_volume,
            current_volume: runtime.current_volume,
            target_duration: runtime.target_duration,
            elapsed_seconds: runtime.elapsed_seconds,
            progress_percent: runtime.progress_percent,
            has_fault: runtime.has_fault,
            fault_reason: runtime.fault_reason,
            last_outcome: durable.last_outcome,
            last_irrigation: durable.last_irrigation,
            last_duration: durable.last_duration,
            last_volume: durable.last_volume,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerStatus {
    pub controller_state: ControllerState,
    pub auto_enabled: bool,
    pub auto_paused: bool,
    pub zones: Vec<CircuitStatus>,
}

impl ControllerStatus {
    /// Structured form, the preferred output named in §6.
    pub fn irrigating_zone_ids(&self) -> Vec<u32> {
        self.zones.iter().filter(|z| z.active).map(|z| z.id).collect()
    }

    /// Legacy text form named in §6, kept alongside the structured one
    /// since both are named as outputs.
    pub fn to_legacy_text(&self) -> String {
        let ids = self.irrigating_zone_ids().iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");
        format!(
            "Controller State:{:?}, Auto Enabled:{}, Auto Paused:{}, Currently Irrigating Zones:[{}]",
            self.controller_state, self.auto_enabled, self.auto_paused, ids
        )
    }
}
