use serde::{Deserialize, Serialize};

use crate::{BenchError, Result};

/// Ordered, validated set of quantiles to extract from a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct QuantileSet(Vec<f64>);

impl QuantileSet {
    pub fn new(quantiles: impl Into<Vec<f64>>) -> Result<Self> {
        let quantiles = quantiles.into();
        if let Some(bad) = quantiles
            .iter()
            .find(|q| !q.is_finite() || !(0.0..=1.0).contains(*q))
        {
            return Err(BenchError::Configuration(format!(
                "quantile {bad} must be within [0, 1]"
            )));
        }
        Ok(Self(quantiles))
    }

    /// Quantiles applied when a metric does not ask for its own set.
    pub fn standard() -> Self {
        Self(vec![0.25, 0.5, 0.75, 0.9, 0.99])
    }

    /// Low tail of the frame-rate distribution.
    pub fn frame_rate() -> Self {
        Self(vec![0.01, 0.05, 0.1, 0.25, 0.5, 0.75])
    }

    pub fn memory() -> Self {
        Self(vec![0.25, 0.5, 0.75, 0.9, 0.99])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl Default for QuantileSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl TryFrom<Vec<f64>> for QuantileSet {
    type Error = BenchError;

    fn try_from(value: Vec<f64>) -> Result<Self> {
        Self::new(value)
    }
}

impl From<QuantileSet> for Vec<f64> {
    fn from(value: QuantileSet) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantilePoint {
    pub quantile: f64,
    /// `None` marks a quantile of an empty series.
    pub value: Option<f64>,
}

/// Reduction of one metric series into its requested quantiles.
///
/// Serializes as `{"count": n, "quantiles": {"0.5": v, ...}}` where `v` is
/// `null` when the series had no samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileSummary {
    pub count: usize,
    #[serde(with = "quantile_map")]
    pub quantiles: Vec<QuantilePoint>,
}

impl QuantileSummary {
    pub fn get(&self, quantile: f64) -> Option<f64> {
        self.quantiles
            .iter()
            .find(|point| point.quantile == quantile)
            .and_then(|point| point.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricSummary {
    Count(usize),
    Quantiles(QuantileSummary),
}

/// Final result of a measurement run, in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub fps: QuantileSummary,
    pub badfps: QuantileSummary,
    pub glitches: usize,
    pub draws: QuantileSummary,
    pub tiles: QuantileSummary,
    pub vertices: QuantileSummary,
    pub models: QuantileSummary,
    #[serde(rename = "gpuMem")]
    pub gpu_mem: QuantileSummary,
    #[serde(rename = "cpuMem")]
    pub cpu_mem: QuantileSummary,
}

impl RunSummary {
    pub fn entries(&self) -> Vec<(&'static str, MetricSummary)> {
        vec![
            ("fps", MetricSummary::Quantiles(self.fps.clone())),
            ("badfps", MetricSummary::Quantiles(self.badfps.clone())),
            ("glitches", MetricSummary::Count(self.glitches)),
            ("draws", MetricSummary::Quantiles(self.draws.clone())),
            ("tiles", MetricSummary::Quantiles(self.tiles.clone())),
            ("vertices", MetricSummary::Quantiles(self.vertices.clone())),
            ("models", MetricSummary::Quantiles(self.models.clone())),
            ("gpuMem", MetricSummary::Quantiles(self.gpu_mem.clone())),
            ("cpuMem", MetricSummary::Quantiles(self.cpu_mem.clone())),
        ]
    }
}

mod quantile_map {
    use std::collections::BTreeMap;

    use serde::{de::Error, ser::SerializeMap, Deserialize, Deserializer, Serializer};

    use super::QuantilePoint;

    pub fn serialize<S: Serializer>(
        points: &[QuantilePoint],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(points.len()))?;
        for point in points {
            map.serialize_entry(&point.quantile.to_string(), &point.value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<QuantilePoint>, D::Error> {
        let raw = BTreeMap::<String, Option<f64>>::deserialize(deserializer)?;
        let mut points = raw
            .into_iter()
            .map(|(key, value)| {
                key.parse::<f64>()
                    .map(|quantile| QuantilePoint { quantile, value })
                    .map_err(|err| D::Error::custom(format!("invalid quantile key {key}: {err}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        points.sort_by(|a, b| a.quantile.total_cmp(&b.quantile));
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantile_set_rejects_out_of_range() {
        assert!(QuantileSet::new(vec![0.0, 0.5, 1.0]).is_ok());
        assert!(QuantileSet::new(vec![1.5]).is_err());
        assert!(QuantileSet::new(vec![-0.1]).is_err());
        assert!(QuantileSet::new(vec![f64::NAN]).is_err());
    }

    #[test]
    fn quantile_set_deserialize_validates() {
        let parsed: QuantileSet = serde_json::from_str("[0.1, 0.9]").expect("valid set");
        assert_eq!(parsed.as_slice(), &[0.1, 0.9]);
        assert!(serde_json::from_str::<QuantileSet>("[2.0]").is_err());
    }

    #[test]
    fn summary_serializes_no_data_as_null() {
        let summary = QuantileSummary {
            count: 0,
            quantiles: vec![
                QuantilePoint {
                    quantile: 0.5,
                    value: None,
                },
                QuantilePoint {
                    quantile: 0.99,
                    value: None,
                },
            ],
        };
        let value = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(value["count"], 0);
        assert!(value["quantiles"]["0.5"].is_null());
        assert!(value["quantiles"]["0.99"].is_null());

        let back: QuantileSummary = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, summary);
    }

    #[test]
    fn get_looks_up_by_quantile() {
        let summary = QuantileSummary {
            count: 3,
            quantiles: vec![QuantilePoint {
                quantile: 0.5,
                value: Some(7.0),
            }],
        };
        assert_eq!(summary.get(0.5), Some(7.0));
        assert_eq!(summary.get(0.75), None);
    }
}
