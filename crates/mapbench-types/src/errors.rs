use thiserror::Error;

pub type Result<T, E = BenchError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("map error: {0}")]
    Map(String),
    #[error("scenario error: {0}")]
    Scenario(String),
    #[error("scenario '{scenario}' iteration {iteration} did not settle within {after_ms}ms")]
    Timeout {
        scenario: String,
        iteration: u32,
        after_ms: u64,
    },
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
    #[error("report error: {0}")]
    Report(String),
    #[error("runner error: {0}")]
    Runner(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
