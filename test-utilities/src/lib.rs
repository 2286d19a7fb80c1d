//! Shared test doubles for `nic`'s integration tests: a fault-injectable
//! relay, a scripted weather source, and a controllable clock. Kept in a
//! sibling crate (donor convention) so both the unit tests inside `nic`
//! and the `tests/` integration suite can reuse them without a dev-only
//! circular dependency.

pub mod mock_relay;
pub mod mock_time;
pub mod mock_weather;

pub use mock_relay::MockRelay;
pub use mock_time::MockTime;
pub use mock_weather::ScriptedWeatherSource;
