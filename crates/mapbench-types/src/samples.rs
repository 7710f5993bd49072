use serde::{Deserialize, Serialize};

/// Metric streams accumulated during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Tiles,
    Draws,
    /// Vertex count in millions.
    Vertices,
    Fps,
    BadFps,
    Models,
    /// GPU memory in millions of bytes, sampled on the interval.
    GpuMem,
    /// CPU memory in millions of bytes, sampled on the interval.
    CpuMem,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::Tiles,
        Metric::Draws,
        Metric::Vertices,
        Metric::Fps,
        Metric::BadFps,
        Metric::Models,
        Metric::GpuMem,
        Metric::CpuMem,
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySeries {
    #[serde(with = "series")]
    pub gpu: Vec<f64>,
    #[serde(with = "series")]
    pub cpu: Vec<f64>,
}

/// Append-only accumulator of every metric stream for one run.
///
/// The serialized shape is the checkpoint format:
/// `{"tiles":[..],"draws":[..],"vertices":[..],"fps":[..],"badfps":[..],"models":[..],"mem":{"gpu":[..],"cpu":[..]}}`.
/// Non-finite samples are written as `"NaN"`, `"Infinity"` or `"-Infinity"`;
/// a `null` entry reads back as NaN.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleBuffer {
    #[serde(with = "series")]
    pub tiles: Vec<f64>,
    #[serde(with = "series")]
    pub draws: Vec<f64>,
    #[serde(with = "series")]
    pub vertices: Vec<f64>,
    #[serde(with = "series")]
    pub fps: Vec<f64>,
    #[serde(with = "series")]
    pub badfps: Vec<f64>,
    #[serde(with = "series")]
    pub models: Vec<f64>,
    pub mem: MemorySeries,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` to the series for `metric`. Values are never rejected.
    pub fn record(&mut self, metric: Metric, value: f64) {
        self.series_mut(metric).push(value);
    }

    pub fn series(&self, metric: Metric) -> &[f64] {
        match metric {
            Metric::Tiles => &self.tiles,
            Metric::Draws => &self.draws,
            Metric::Vertices => &self.vertices,
            Metric::Fps => &self.fps,
            Metric::BadFps => &self.badfps,
            Metric::Models => &self.models,
            Metric::GpuMem => &self.mem.gpu,
            Metric::CpuMem => &self.mem.cpu,
        }
    }

    fn series_mut(&mut self, metric: Metric) -> &mut Vec<f64> {
        match metric {
            Metric::Tiles => &mut self.tiles,
            Metric::Draws => &mut self.draws,
            Metric::Vertices => &mut self.vertices,
            Metric::Fps => &mut self.fps,
            Metric::BadFps => &mut self.badfps,
            Metric::Models => &mut self.models,
            Metric::GpuMem => &mut self.mem.gpu,
            Metric::CpuMem => &mut self.mem.cpu,
        }
    }

    pub fn snapshot(&self) -> SampleBuffer {
        self.clone()
    }

    /// Number of frames observed so far.
    pub fn frame_count(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        Metric::ALL.iter().all(|metric| self.series(*metric).is_empty())
    }
}

/// JSON has no literal for non-finite numbers, so they are spelled out.
mod series {
    use serde::{de::Error, ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    const NAN: &str = "NaN";
    const INFINITY: &str = "Infinity";
    const NEG_INFINITY: &str = "-Infinity";

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            if value.is_finite() {
                seq.serialize_element(value)?;
            } else if value.is_nan() {
                seq.serialize_element(NAN)?;
            } else if value.is_sign_positive() {
                seq.serialize_element(INFINITY)?;
            } else {
                seq.serialize_element(NEG_INFINITY)?;
            }
        }
        seq.end()
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored {
        Number(Option<f64>),
        Special(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        Vec::<Stored>::deserialize(deserializer)?
            .into_iter()
            .map(|stored| match stored {
                Stored::Number(value) => Ok(value.unwrap_or(f64::NAN)),
                Stored::Special(raw) => match raw.as_str() {
                    NAN => Ok(f64::NAN),
                    INFINITY => Ok(f64::INFINITY),
                    NEG_INFINITY => Ok(f64::NEG_INFINITY),
                    other => Err(D::Error::custom(format!("invalid sample '{other}'"))),
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_preserves_order_across_interleaved_metrics() {
        let mut buffer = SampleBuffer::new();
        buffer.record(Metric::Fps, 30.0);
        buffer.record(Metric::Draws, 5.0);
        buffer.record(Metric::Fps, 10.0);
        buffer.record(Metric::GpuMem, 120.5);
        buffer.record(Metric::Fps, 25.0);
        buffer.record(Metric::Draws, 0.0);

        assert_eq!(buffer.series(Metric::Fps), &[30.0, 10.0, 25.0]);
        assert_eq!(buffer.series(Metric::Draws), &[5.0, 0.0]);
        assert_eq!(buffer.mem.gpu, vec![120.5]);
        assert!(buffer.mem.cpu.is_empty());
    }

    #[test]
    fn record_accepts_degenerate_values() {
        let mut buffer = SampleBuffer::new();
        buffer.record(Metric::Vertices, -1.0);
        buffer.record(Metric::Vertices, f64::INFINITY);
        assert_eq!(buffer.series(Metric::Vertices).len(), 2);
    }

    #[test]
    fn snapshot_serializes_to_checkpoint_shape() {
        let mut buffer = SampleBuffer::new();
        buffer.record(Metric::Tiles, 12.0);
        buffer.record(Metric::CpuMem, 48.0);

        let value = serde_json::to_value(buffer.snapshot()).expect("serialize");
        assert_eq!(value["tiles"], serde_json::json!([12.0]));
        assert_eq!(value["mem"]["cpu"], serde_json::json!([48.0]));
        assert_eq!(value["mem"]["gpu"], serde_json::json!([]));
        assert_eq!(value["badfps"], serde_json::json!([]));
    }

    #[test]
    fn non_finite_samples_survive_serialization() {
        let mut buffer = SampleBuffer::new();
        buffer.record(Metric::Fps, 60.0);
        buffer.record(Metric::Fps, f64::INFINITY);
        buffer.record(Metric::BadFps, f64::NEG_INFINITY);
        buffer.record(Metric::GpuMem, f64::NAN);

        let raw = serde_json::to_string(&buffer).expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
        assert_eq!(value["fps"], serde_json::json!([60.0, "Infinity"]));
        assert_eq!(value["mem"]["gpu"], serde_json::json!(["NaN"]));

        let restored: SampleBuffer = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(restored.fps, vec![60.0, f64::INFINITY]);
        assert_eq!(restored.badfps, vec![f64::NEG_INFINITY]);
        assert!(restored.mem.gpu[0].is_nan());
    }

    #[test]
    fn null_samples_read_back_as_nan() {
        let raw = r#"{"tiles":[1,null],"draws":[],"vertices":[],"fps":[],"badfps":[],"models":[],"mem":{"gpu":[],"cpu":[]}}"#;
        let restored: SampleBuffer = serde_json::from_str(raw).expect("deserialize");
        assert_eq!(restored.tiles[0], 1.0);
        assert!(restored.tiles[1].is_nan());
        assert!(serde_json::from_str::<SampleBuffer>(&raw.replace("null", "\"fast\"")).is_err());
    }

    #[test]
    fn empty_buffer_reports_empty() {
        let mut buffer = SampleBuffer::new();
        assert!(buffer.is_empty());
        buffer.record(Metric::Models, 0.0);
        assert!(!buffer.is_empty());
        assert_eq!(buffer.frame_count(), 0);
    }
}
