//! C10 (task scheduler) and C11 (auto irrigation service). A single
//! SCHEDULER worker that runs a small set of named periodic tasks, and
//! the daily auto-cycle trigger layered on top of it. Grounded in the
//! donor's `water_window.rs` daily-window check, rebuilt on a generic
//! tick loop rather than a bespoke auto-only thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::AutomationConfig;
use crate::error::AppError;
use crate::threads::{TaskType, ThreadManager};
use crate::time::TimeProvider;

/// Shared between `TaskScheduler`'s loop and whatever holds the handle:
/// the controller flips `paused` to suppress `auto_irrigation_tick`
/// without touching configuration (§9: pause is a volatile, in-process
/// flag that reverts on restart).
#[derive(Default)]
struct AutoCycleState {
    paused: AtomicBool,
    fired_on_day: Mutex<Option<i64>>,
}

pub struct TaskScheduler {
    threads: Arc<ThreadManager>,
    time: Arc<dyn TimeProvider>,
    auto_state: Arc<AutoCycleState>,
}

impl TaskScheduler {
    pub fn new(threads: Arc<ThreadManager>, time: Arc<dyn TimeProvider>) -> Self {
        Self { threads, time, auto_state: Arc::new(AutoCycleState::default()) }
    }

    pub fn pause_auto(&self) {
        self.auto_state.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume_auto(&self) {
        self.auto_state.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_auto_paused(&self) -> bool {
        self.auto_state.paused.load(Ordering::SeqCst)
    }

    /// Starts the single SCHEDULER worker, ticking `refresh_state` every
    /// 5s, weather-cache refresh at `weather_refresh_interval`, and the
    /// auto-irrigation check every minute (§4.9).
    pub fn start(
        &self,
        automation: AutomationConfig,
        weather_refresh_interval: Duration,
        on_refresh_state: impl Fn() + Send + 'static,
        on_weather_refresh: impl Fn() + Send + 'static,
        on_start_auto_cycle: impl Fn() + Send + 'static,
    ) -> Result<(), AppError> {
        let time = self.time.clone();
        let auto_state = self.auto_state.clone();

        self.threads.start(TaskType::Scheduler, "main", move |cancel| {
            let mut last_refresh_state = time.now();
            let mut last_weather_refresh = time.now();
            let mut last_auto_tick = time.now();

            while !cancel.is_cancelled() {
                let now = time.now();

                if now - last_refresh_state >= 5 {
                    on_refresh_state();
                    last_refresh_state = now;
                }
                if now - last_weather_refresh >= weather_refresh_interval.as_secs() as i64 {
                    on_weather_refresh();
                    last_weather_refresh = now;
                }
                if now - last_auto_tick >= 60 {
                    auto_irrigation_tick(&automation, &auto_state, &*time, &on_start_auto_cycle);
                    last_auto_tick = now;
                }

                time.sleep(Duration::from_secs(1));
            }
            debug!("scheduler worker stopping");
        })?;
        Ok(())
    }

    pub fn stop(&self, deadline: Duration) -> Result<(), AppError> {
        self.threads.stop(TaskType::Scheduler, "main", deadline)
    }
}

/// C11's per-minute decision: fire the auto cycle at most once per
/// scheduled window per day (§4.9).
fn auto_irrigation_tick(
    automation: &AutomationConfig,
    auto_state: &AutoCycleState,
    time: &dyn TimeProvider,
    on_start_auto_cycle: &impl Fn(),
) {
    if !automation.auto_enabled || auto_state.paused.load(Ordering::SeqCst) {
        return;
    }
    let now = time.now();
    let (hour, minute, day) = hour_minute_day(now);
    if hour != automation.scheduled_hour || minute != automation.scheduled_minute {
        return;
    }

    let mut fired = auto_state.fired_on_day.lock().unwrap();
    if *fired == Some(day) {
        return;
    }
    *fired = Some(day);
    drop(fired);

    info!("auto irrigation cycle firing for scheduled window {:02}:{:02}", hour, minute);
    on_start_auto_cycle();
}

fn hour_minute_day(unix_secs: i64) -> (u32, u32, i64) {
    let dt = chrono::DateTime::<chrono::Utc>::from_timestamp(unix_secs, 0).unwrap_or_default();
    use chrono::Timelike;
    (dt.hour(), dt.minute(), unix_secs / 86_400)
}
