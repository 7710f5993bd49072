use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{BenchError, Result};

/// Known map styles as `(display name, style id)`.
pub const STYLES: [(&str, &str); 5] = [
    ("A", "b2b8046f-9bb0-469a-9860-9847032935cc"),
    ("Online", "eb10e2c3-3c28-4b81-b74b-859c9c4cf47e"),
    ("SDK", "c080bb6a-8134-4993-93a1-5b4d8c36a59b"),
    ("Immersive", "8e055b04-e7b5-42a5-95e2-a0b5190a034e"),
    ("Immersive Light", "ffaaf4c3-4b23-45c8-b816-4f719a3170a9"),
];

/// Known SDK builds as `(display name, endpoint)`.
pub const REFERENCES: [(&str, &str); 1] = [("production", "https://mapgl.2gis.com/api/js/v1")];

pub const DEFAULT_ENDPOINT: &str = "https://mapgl.2gis.com/api/js/v1";
pub const DEFAULT_STYLE: &str = "eb10e2c3-3c28-4b81-b74b-859c9c4cf47e";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphicsPreset {
    Light,
    Normal,
    #[default]
    Immersive,
}

/// Immutable parameters of one measurement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    pub reference: String,
    /// Overrides `reference` when set.
    #[serde(default)]
    pub custom_reference: Option<String>,
    pub target: String,
    pub style_id: String,
    #[serde(default)]
    pub graphics_preset: GraphicsPreset,
    #[serde(default = "default_true")]
    pub immersive_roads: bool,
    pub iterations: u32,
    #[serde(default)]
    pub warmup: bool,
}

impl RunParams {
    /// Endpoint measured as the baseline.
    pub fn reference_endpoint(&self) -> &str {
        match self.custom_reference.as_deref() {
            Some(custom) if !custom.is_empty() => custom,
            _ => &self.reference,
        }
    }

    /// Human-readable name of the baseline build.
    pub fn reference_name(&self) -> String {
        if let Some(custom) = self.custom_reference.as_deref().filter(|c| !c.is_empty()) {
            return custom.to_string();
        }
        REFERENCES
            .iter()
            .find(|(_, endpoint)| *endpoint == self.reference)
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| self.reference.clone())
    }

    pub fn style_name(&self) -> String {
        STYLES
            .iter()
            .find(|(_, id)| *id == self.style_id)
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| self.style_id.clone())
    }

    /// Scenario playbacks performed by one run, warm-up included.
    pub fn total_iterations(&self) -> u32 {
        self.iterations.saturating_add(u32::from(self.warmup))
    }
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            reference: DEFAULT_ENDPOINT.into(),
            custom_reference: None,
            target: DEFAULT_ENDPOINT.into(),
            style_id: DEFAULT_STYLE.into(),
            graphics_preset: GraphicsPreset::Immersive,
            immersive_roads: true,
            iterations: 1,
            warmup: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_memory_interval_ms")]
    pub memory_interval_ms: u64,
    #[serde(default = "default_bad_fps_threshold")]
    pub bad_fps_threshold: f64,
    /// Upper bound for a single scenario playback. Unbounded when absent.
    #[serde(default)]
    pub playback_timeout_ms: Option<u64>,
}

impl SamplingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.memory_interval_ms == 0 {
            return Err(BenchError::Configuration(
                "sampling.memory_interval_ms must be greater than zero".into(),
            ));
        }
        let threshold = self.bad_fps_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(BenchError::Configuration(
                "sampling.bad_fps_threshold must be positive".into(),
            ));
        }
        if self.playback_timeout_ms == Some(0) {
            return Err(BenchError::Configuration(
                "sampling.playback_timeout_ms must be greater than zero when set".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            memory_interval_ms: default_memory_interval_ms(),
            bad_fps_threshold: default_bad_fps_threshold(),
            playback_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpsConfig {
    pub log_level: String,
    pub checkpoint_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    pub run: RunParams,
    #[serde(default)]
    pub sampling: SamplingConfig,
    pub ops: OpsConfig,
    pub report: ReportConfig,
}

impl BenchConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            BenchError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            BenchError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.run.iterations == 0 {
            return Err(BenchError::Configuration(
                "run.iterations must be greater than zero".into(),
            ));
        }
        if self.run.reference_endpoint().is_empty() || self.run.target.is_empty() {
            return Err(BenchError::Configuration(
                "run.reference and run.target must not be empty".into(),
            ));
        }
        if self.run.iterations.checked_add(u32::from(self.run.warmup)).is_none() {
            return Err(BenchError::Configuration(
                "run.iterations leaves no room for the warm-up playback".into(),
            ));
        }
        self.sampling.validate()?;
        if self.report.channel_capacity == 0 {
            return Err(BenchError::Configuration(
                "report.channel_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            run: RunParams::default(),
            sampling: SamplingConfig::default(),
            ops: OpsConfig {
                log_level: "info".into(),
                checkpoint_dir: ".mapbench".into(),
            },
            report: ReportConfig {
                channel_capacity: 64,
            },
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_memory_interval_ms() -> u64 {
    1000
}

fn default_bad_fps_threshold() -> f64 {
    20.0
}
