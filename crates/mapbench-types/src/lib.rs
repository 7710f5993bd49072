//! Shared domain types for the mapbench workspace.

pub mod config;
pub mod events;
pub mod samples;
pub mod summary;

mod errors;

pub use errors::{BenchError, Result};
