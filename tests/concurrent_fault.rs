//! §8 S5 — two circuits running concurrently, one faults on valve close.
//! A single circuit's hardware fault must not escalate the controller to
//! ERROR; it's scoped to that circuit's outcome.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use nic::controller::ControllerState;
use nic::relay::Relay;
use nic::state::Outcome;
use test_utilities::{MockRelay, MockTime, ScriptedWeatherSource};

#[test]
fn s5_one_circuit_faults_the_other_succeeds_controller_stays_idle() {
    let time = Arc::new(MockTime::new(0));
    let circuits = vec![common::even_area_circuit(1, 1, 5.0, 2.0, 10), common::even_area_circuit(3, 1, 5.0, 2.0, 10)];
    let global = common::global_config(20.0, 300.0);
    let weather = Arc::new(ScriptedWeatherSource::new(vec![
        nic::weather::Conditions { solar_total: 5.0, temperature_celsius: 20.0, rainfall_mm: 0.0 },
        nic::weather::Conditions { solar_total: 5.0, temperature_celsius: 20.0, rainfall_mm: 0.0 },
    ]));

    let faulty_relay = MockRelay::new();
    faulty_relay.set_fail_closes(true);
    let mut relays: HashMap<u32, Box<dyn Relay>> = HashMap::new();
    relays.insert(3, Box::new(faulty_relay));

    let harness = common::build(circuits, global, time, weather, relays, "s5");

    harness.controller.start_auto_cycle().unwrap();
    assert!(common::wait_until(&harness.controller, ControllerState::Idle, Duration::from_secs(5)));

    let snap1 = harness.state.get(1).unwrap();
    assert_eq!(snap1.last_outcome, Some(Outcome::Success));

    let snap3 = harness.state.get(3).unwrap();
    assert_eq!(snap3.last_outcome, Some(Outcome::Failed));

    let status = harness.controller.get_status();
    let zone3 = status.zones.iter().find(|z| z.id == 3).unwrap();
    assert!(zone3.has_fault);

    // A single-circuit hardware fault is not a fatal executor condition.
    assert_eq!(harness.controller.controller_state(), ControllerState::Idle);

    let log = common::read_log(&harness.paths);
    assert_eq!(log.len(), 2);
    assert!(log.iter().any(|r| r.circuit_id == 1 && r.outcome == Outcome::Success));
    assert!(log.iter().any(|r| r.circuit_id == 3 && r.outcome == Outcome::Failed));
}
