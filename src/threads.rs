//! C6 — thread manager. A typed worker registry enforcing one worker per
//! `(task_type, key)`, with bounded start/stop/join. Generalizes the
//! donor's single-purpose database actor thread (`src/db/mod.rs`'s
//! `thread::spawn` + `mpsc` loop) into a keyed registry, per spec §5's
//! "parallel OS threads" concurrency model.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    Irrigation,
    Executor,
    Scheduler,
}

/// A cancellation signal observed by a worker at bounded intervals
/// (≤ 1s, per §5). Cloning shares the same underlying flag.
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl Default for CancelToken {
    /// A token that is never linked to a worker's stop signal — only
    /// useful standalone, e.g. for a manual run dispatched outside the
    /// executor's batch machinery, or in tests.
    fn default() -> Self {
        Self::new()
    }
}

struct DoneSignal {
    pair: Arc<(Mutex<bool>, Condvar)>,
}

impl DoneSignal {
    fn new() -> Self {
        Self { pair: Arc::new((Mutex::new(false), Condvar::new())) }
    }

    /// Waits until done or `deadline` elapses. Returns true if done.
    fn wait(&self, deadline: Duration) -> bool {
        let (lock, cvar) = &*self.pair;
        let guard = lock.lock().unwrap();
        if *guard {
            return true;
        }
        let (guard, _timeout) = cvar.wait_timeout_while(guard, deadline, |done| !*done).unwrap();
        *guard
    }
}

struct Slot {
    cancel: CancelToken,
    done: DoneSignal,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Registry {
    slots: HashMap<(TaskType, String), Slot>,
}

/// Keyed registry of OS-thread workers, one thread per `(task_type, key)`.
pub struct ThreadManager {
    registry: Mutex<Registry>,
}

impl Default for ThreadManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadManager {
    pub fn new() -> Self {
        Self { registry: Mutex::new(Registry::default()) }
    }

    /// Spawns a worker thread identified by `(task_type, key)`. `work` is
    /// expected to have already composed its own completion reporting
    /// (e.g. calling a caller-supplied `on_finish`) since the thread
    /// manager only guarantees the closure runs to completion (even
    /// across a panic) and that the worker is deregistered afterward.
    pub fn start<F>(&self, task_type: TaskType, key: impl Into<String>, work: F) -> Result<CancelToken, AppError>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let key = key.into();
        let cancel = CancelToken::new();
        let done = DoneSignal::new();

        let mut registry = self.registry.lock().unwrap();
        if registry.slots.contains_key(&(task_type, key.clone())) {
            return Err(AppError::WorkerAlreadyExists { task_type, key });
        }

        let worker_cancel = cancel.clone();
        let worker_done_pair = done.pair.clone();
        let task_label = format!("{task_type:?}/{key}");

        let handle = std::thread::Builder::new()
            .name(task_label.clone())
            .spawn(move || {
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| work(worker_cancel)));
                if let Err(payload) = result {
                    let msg = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_owned());
                    error!("worker {task_label} panicked: {msg}");
                }
                let (lock, cvar) = &*worker_done_pair;
                let mut done = lock.lock().unwrap();
                *done = true;
                cvar.notify_all();
            })
            .expect("failed to spawn OS thread");

        registry.slots.insert((task_type, key.clone()), Slot { cancel: cancel.clone(), done, handle: Some(handle) });
        info!("started worker {task_type:?}/{key}");
        Ok(cancel)
    }

    /// Signals cancellation and waits up to `deadline` for the worker to
    /// finish and deregister. Does not itself remove the slot — the
    /// worker's own completion path does that via `reap()`.
    pub fn stop(&self, task_type: TaskType, key: &str, deadline: Duration) -> Result<(), AppError> {
        let (cancel, done) = {
            let registry = self.registry.lock().unwrap();
            match registry.slots.get(&(task_type, key.to_owned())) {
                Some(slot) => (slot.cancel.clone(), DoneSignal { pair: slot.done.pair.clone() }),
                None => return Ok(()), // already gone
            }
        };
        cancel.cancel();
        let finished = done.wait(deadline);
        self.reap(task_type, key);
        if finished {
            Ok(())
        } else {
            warn!("worker {task_type:?}/{key} did not stop within {deadline:?}");
            Err(AppError::WorkerStopTimeout { task_type, key: key.to_owned() })
        }
    }

    /// Waits for a worker to finish naturally (no cancellation signaled),
    /// used between batches (§5 ordering guarantee: the next batch starts
    /// only after the prior one's workers have been joined).
    pub fn wait(&self, task_type: TaskType, key: &str, deadline: Duration) -> Result<(), AppError> {
        let done = {
            let registry = self.registry.lock().unwrap();
            match registry.slots.get(&(task_type, key.to_owned())) {
                Some(slot) => DoneSignal { pair: slot.done.pair.clone() },
                None => return Ok(()),
            }
        };
        let finished = done.wait(deadline);
        self.reap(task_type, key);
        if finished {
            Ok(())
        } else {
            Err(AppError::WorkerStopTimeout { task_type, key: key.to_owned() })
        }
    }

    /// Stops every active worker of `task_type` within the shared
    /// deadline (best-effort split across workers), used by `stop_all`.
    pub fn stop_all(&self, task_type: TaskType, deadline: Duration) -> Result<(), AppError> {
        let keys = self.list_active(task_type);
        let per_worker = if keys.is_empty() { deadline } else { deadline / (keys.len() as u32).max(1) };
        let start = Instant::now();
        let mut timed_out = false;
        for key in keys {
            let remaining = deadline.saturating_sub(start.elapsed()).max(per_worker.min(deadline));
            if self.stop(task_type, &key, remaining).is_err() {
                timed_out = true;
            }
        }
        if timed_out {
            Err(AppError::WorkerStopTimeout { task_type, key: "*".to_owned() })
        } else {
            Ok(())
        }
    }

    pub fn list_active(&self, task_type: TaskType) -> Vec<String> {
        let registry = self.registry.lock().unwrap();
        let mut keys: Vec<String> =
            registry.slots.keys().filter(|(t, _)| *t == task_type).map(|(_, k)| k.clone()).collect();
        keys.sort();
        keys
    }

    pub fn active_count(&self, task_type: TaskType) -> usize {
        self.registry.lock().unwrap().slots.keys().filter(|(t, _)| *t == task_type).count()
    }

    /// Removes a finished worker's slot and joins its handle. Safe to call
    /// even if the worker is still technically running — used only after
    /// `done.wait` has already returned true, or at best-effort cleanup.
    fn reap(&self, task_type: TaskType, key: &str) {
        let handle = {
            let mut registry = self.registry.lock().unwrap();
            registry.slots.get_mut(&(task_type, key.to_owned())).and_then(|slot| slot.handle.take())
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        self.registry.lock().unwrap().slots.remove(&(task_type, key.to_owned()));
    }
}
