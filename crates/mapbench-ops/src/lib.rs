//! Operational helpers: logging setup and crash-resilient checkpoints.

use std::path::PathBuf;

use mapbench_types::{config::OpsConfig, BenchError, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod checkpoint;

pub use checkpoint::{
    CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, CHECKPOINT_KEY,
};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| BenchError::Ops(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| BenchError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

pub fn ensure_checkpoint_dir(path: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(path);
    std::fs::create_dir_all(&dir)
        .map_err(|err| BenchError::Ops(format!("failed to create checkpoint dir: {err}")))?;
    info!("Checkpoint directory ready at {:?}", dir);
    Ok(dir)
}
