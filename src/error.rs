use thiserror::Error;

/// Crate-wide error type. Every component-level API returns `Result<_, AppError>`
/// (or a narrower error that converts into it) instead of panicking, except at
/// bootstrap where a malformed configuration is fatal by design (see `config`).
#[derive(Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("valve hardware error on circuit {circuit_id}: {reason}")]
    ValveHardware { circuit_id: u32, reason: String },

    #[error("illegal state transition for circuit {circuit_id}: {from:?} -> {event}")]
    IllegalStateTransition { circuit_id: u32, from: crate::state::CircuitState, event: String },

    #[error("worker already exists for {task_type:?}/{key}")]
    WorkerAlreadyExists { task_type: crate::threads::TaskType, key: String },

    #[error("worker {task_type:?}/{key} did not stop within the deadline")]
    WorkerStopTimeout { task_type: crate::threads::TaskType, key: String },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("weather fetch error: {0}")]
    WeatherFetch(String),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Persistence(e.to_string())
    }
}
