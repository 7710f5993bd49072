use std::fmt;

use mapbench_types::summary::{MetricSummary, RunSummary};
use serde::Serialize;

/// Difference of a single statistic between the reference and target builds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantileDelta {
    pub label: String,
    pub reference: Option<f64>,
    pub target: Option<f64>,
}

impl QuantileDelta {
    /// `target - reference`, absent when either side has no data.
    pub fn delta(&self) -> Option<f64> {
        Some(self.target? - self.reference?)
    }
}

impl fmt::Display for QuantileDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}/{})",
            self.label,
            format_delta(self.delta()),
            format_value(self.target),
            format_value(self.reference)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorDelta {
    pub metric: &'static str,
    pub deltas: Vec<QuantileDelta>,
}

/// Pairs every statistic of `reference` with the same statistic of `target`.
pub fn compare(reference: &RunSummary, target: &RunSummary) -> Vec<IndicatorDelta> {
    reference
        .entries()
        .into_iter()
        .zip(target.entries())
        .map(|((metric, reference), (_, target))| IndicatorDelta {
            metric,
            deltas: pair(&reference, &target),
        })
        .collect()
}

fn pair(reference: &MetricSummary, target: &MetricSummary) -> Vec<QuantileDelta> {
    match (reference, target) {
        (MetricSummary::Count(reference), MetricSummary::Count(target)) => vec![QuantileDelta {
            label: "value".into(),
            reference: Some(*reference as f64),
            target: Some(*target as f64),
        }],
        (MetricSummary::Quantiles(reference), MetricSummary::Quantiles(target)) => reference
            .quantiles
            .iter()
            .map(|point| QuantileDelta {
                label: point.quantile.to_string(),
                reference: point.value,
                target: target.get(point.quantile),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Signed two-decimal rendering, `n/a` when there is nothing to compare.
pub fn format_delta(delta: Option<f64>) -> String {
    match delta {
        Some(value) => {
            let rendered = format!("{value:.2}");
            if rendered.starts_with('-') {
                rendered
            } else {
                format!("+{rendered}")
            }
        }
        None => "n/a".into(),
    }
}

fn format_value(value: Option<f64>) -> String {
    value.map_or_else(|| "-".into(), |v| format!("{v:.2}"))
}
