use std::collections::HashMap;
use std::sync::{mpsc, Arc};

use nic::circuit::Circuit;
use nic::config::run_options::get_args;
use nic::config::Config;
use nic::controller::Controller;
use nic::relay::SimulatedRelay;
use nic::state::CircuitStateManager;
use nic::threads::ThreadManager;
use nic::time::{RealTimeProvider, TimeProvider};
use nic::utils::init_logging;
use nic::weather::provider::WeatherProvider;
use nic::weather::source::{RemoteWeatherSource, SimulatedWeatherSource, WeatherSource};

use tracing::info;

/// Bootstrap wiring: load config, construct the durable and runtime
/// components, start the scheduler, then block until an interrupt signal
/// arrives and shut down cleanly. This glue is ambient process plumbing
/// implied by "the node" but not itself part of any one component.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = get_args();
    let config = Config::load(args).map_err(|e| {
        eprintln!("fatal configuration error: {e}");
        e
    })?;

    init_logging(&config.global.logging.filter);
    info!("starting node irrigation controller");

    let time: Arc<dyn TimeProvider> = Arc::new(RealTimeProvider);
    let threads = Arc::new(ThreadManager::new());
    let state = Arc::new(CircuitStateManager::init_from_disk(&config.paths, &config.circuits, time.clone())?);

    let weather_source: Arc<dyn WeatherSource> = if config.global.automation.simulator_active() {
        info!("using the simulated weather source (use_weather_simulator=true, environment != production)");
        Arc::new(SimulatedWeatherSource)
    } else {
        Arc::new(RemoteWeatherSource::new(config.global.weather.clone()))
    };
    let weather = Arc::new(WeatherProvider::new(weather_source, time.clone(), &config.global));

    // The real GPIO relay driver is external to this crate; every circuit
    // runs against a simulated relay until a `GpioPin` implementation is
    // wired in at this seam.
    let circuits: HashMap<u32, Arc<Circuit>> = config
        .circuits
        .iter()
        .map(|cfg| (cfg.id, Arc::new(Circuit::new(cfg.clone(), Box::new(SimulatedRelay::new())))))
        .collect();

    let controller = Arc::new(Controller::new(&config, circuits, threads, state, weather, time));
    controller.start_background_tasks()?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    rx.recv()?;

    info!("shutdown signal received, stopping");
    controller.shutdown()?;
    Ok(())
}
