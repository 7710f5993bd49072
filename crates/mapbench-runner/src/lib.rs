//! Scenario-driven measurement of an instrumented map.

mod runner;
mod session;

pub use runner::{classify_frame, FrameSample, ScenarioRunner};
pub use session::{BenchSession, Comparison};

use mapbench_types::BenchError;

pub fn runner_error(message: impl Into<String>) -> BenchError {
    BenchError::Runner(message.into())
}
