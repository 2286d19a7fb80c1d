use std::sync::atomic::{AtomicUsize, Ordering};

use nic::error::AppError;
use nic::weather::source::WeatherSource;
use nic::weather::Conditions;

/// A weather source that replays a fixed script of responses, one per
/// call, repeating the last entry once exhausted. Lets tests drive
/// specific weather scenarios (S1/S2) without a network round-trip.
pub struct ScriptedWeatherSource {
    script: Vec<Result<Conditions, String>>,
    calls: AtomicUsize,
}

impl ScriptedWeatherSource {
    pub fn new(script: Vec<Conditions>) -> Self {
        Self { script: script.into_iter().map(Ok).collect(), calls: AtomicUsize::new(0) }
    }

    pub fn failing() -> Self {
        Self { script: vec![Err("mock weather fetch failure".into())], calls: AtomicUsize::new(0) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl WeatherSource for ScriptedWeatherSource {
    fn fetch(&self, _window_days: u32) -> Result<Conditions, AppError> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        let entry = self.script.get(idx).or_else(|| self.script.last()).cloned_or_err();
        match entry {
            Ok(conditions) => Ok(conditions),
            Err(reason) => Err(AppError::WeatherFetch(reason)),
        }
    }
}

/// Small helper trait so `fetch` can clone out of a borrowed `Option<&Result<...>>`
/// without pulling in an extra dependency for a one-off conversion.
trait ClonedOrErr {
    fn cloned_or_err(self) -> Result<Conditions, String>;
}

impl ClonedOrErr for Option<&Result<Conditions, String>> {
    fn cloned_or_err(self) -> Result<Conditions, String> {
        match self {
            Some(Ok(c)) => Ok(*c),
            Some(Err(e)) => Err(e.clone()),
            None => Err("scripted weather source has no entries".to_owned()),
        }
    }
}
