//! C4 — weather provider. Caches the last fetched conditions and serves
//! them until they go stale, falling back to standard conditions (never an
//! exception to the caller) on any fetch failure.

use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::config::{GlobalConfig, StandardConditions};
use crate::time::TimeProvider;
use crate::weather::source::WeatherSource;
use crate::weather::Conditions;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionsSnapshot {
    pub conditions: Conditions,
    pub fetched_at: i64,
    /// True when this snapshot is the standard-conditions fallback rather
    /// than a real observation (§4.4 failure policy).
    pub is_fallback: bool,
}

struct Cached {
    snapshot: ConditionsSnapshot,
}

pub struct WeatherProvider {
    source: Arc<dyn WeatherSource>,
    time: Arc<dyn TimeProvider>,
    ttl_secs: i64,
    standard: StandardConditions,
    cache: Mutex<Option<Cached>>,
}

impl WeatherProvider {
    pub fn new(source: Arc<dyn WeatherSource>, time: Arc<dyn TimeProvider>, global: &GlobalConfig) -> Self {
        Self {
            source,
            time,
            ttl_secs: global.weather.cache_ttl_secs,
            standard: global.standard,
            cache: Mutex::new(None),
        }
    }

    fn standard_snapshot(&self, now: i64) -> ConditionsSnapshot {
        ConditionsSnapshot {
            conditions: Conditions {
                solar_total: self.standard.solar_total,
                temperature_celsius: self.standard.temperature,
                rainfall_mm: self.standard.rainfall,
            },
            fetched_at: now,
            is_fallback: true,
        }
    }

    /// Returns cached conditions if fresh enough, otherwise refreshes.
    /// Never returns an error: any fetch problem degrades to standard
    /// conditions with a WARN log (§4.4).
    pub fn get_recent(&self, window_days: u32) -> ConditionsSnapshot {
        let now = self.time.now();
        {
            let guard = self.cache.lock().unwrap();
            if let Some(cached) = guard.as_ref() {
                if now - cached.snapshot.fetched_at < self.ttl_secs {
                    return cached.snapshot;
                }
            }
        }

        let snapshot = match self.source.fetch(window_days) {
            Ok(conditions) => ConditionsSnapshot { conditions, fetched_at: now, is_fallback: false },
            Err(e) => {
                warn!("weather fetch failed, falling back to standard conditions: {e}");
                self.standard_snapshot(now)
            }
        };

        *self.cache.lock().unwrap() = Some(Cached { snapshot });
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalConfig;
    use crate::error::AppError;
    use crate::time::RealTimeProvider;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct FixedTime(AtomicI64);
    impl TimeProvider for FixedTime {
        fn now(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
        fn sleep(&self, _d: std::time::Duration) {}
    }

    struct FailingSource;
    impl WeatherSource for FailingSource {
        fn fetch(&self, _window_days: u32) -> Result<Conditions, AppError> {
            Err(AppError::WeatherFetch("boom".into()))
        }
    }

    struct CountingSource(std::sync::atomic::AtomicUsize);
    impl WeatherSource for CountingSource {
        fn fetch(&self, _window_days: u32) -> Result<Conditions, AppError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Conditions { solar_total: 1.0, temperature_celsius: 2.0, rainfall_mm: 3.0 })
        }
    }

    #[test]
    fn falls_back_to_standard_on_error() {
        let global = GlobalConfig::default();
        let provider =
            WeatherProvider::new(Arc::new(FailingSource), Arc::new(RealTimeProvider), &global);
        let snap = provider.get_recent(3);
        assert!(snap.is_fallback);
        assert_eq!(snap.conditions.solar_total, global.standard.solar_total);
    }

    #[test]
    fn caches_within_ttl() {
        let mut global = GlobalConfig::default();
        global.weather.cache_ttl_secs = 100;
        let time = Arc::new(FixedTime(AtomicI64::new(1000)));
        let source = Arc::new(CountingSource(std::sync::atomic::AtomicUsize::new(0)));
        let provider = WeatherProvider::new(source.clone(), time.clone(), &global);

        provider.get_recent(3);
        provider.get_recent(3);
        assert_eq!(source.0.load(Ordering::SeqCst), 1);

        time.0.store(1200, Ordering::SeqCst); // past TTL
        provider.get_recent(3);
        assert_eq!(source.0.load(Ordering::SeqCst), 2);
    }
}
