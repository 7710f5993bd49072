//! Reduction of raw run samples into comparable quantile summaries.

mod compare;
mod quantile;

pub use compare::{compare, format_delta, IndicatorDelta, QuantileDelta};
pub use quantile::{reduce, summarize};
