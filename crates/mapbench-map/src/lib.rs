//! Instrumented map abstraction layer and scenario playback.

use async_trait::async_trait;
use mapbench_types::{config::RunParams, BenchError, Result};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::broadcast,
    time::{Duration, Instant},
};

mod scenario;
mod simulated;

pub use scenario::{
    builtin_scenarios, Scenario, ScenarioPlayer, ScenarioStep, ScriptedPlayer,
};
pub use simulated::{FrameProfile, SimulatedFrame, SimulatedMap, SimulatedMapFactory};

/// Per-frame rendering counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStats {
    pub draw_count: u32,
    pub tile_count: u32,
    pub vertex_count: u64,
}

/// Memory counters in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub gpu: f64,
    pub cpu: f64,
}

/// Frame lifecycle notifications, timestamped by the map when they happen.
///
/// `Start` and `End` strictly alternate for each frame and are delivered in
/// render order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameEvent {
    Start {
        at: Instant,
    },
    End {
        at: Instant,
        stats: FrameStats,
        loaded_models: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// `[longitude, latitude]`.
    pub center: [f64; 2],
    pub zoom: f64,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub rotation: f64,
}

impl Camera {
    pub const fn new(center: [f64; 2], zoom: f64) -> Self {
        Self {
            center,
            zoom,
            pitch: 0.0,
            rotation: 0.0,
        }
    }

    pub const fn tilted(mut self, pitch: f64, rotation: f64) -> Self {
        self.pitch = pitch;
        self.rotation = rotation;
        self
    }
}

#[async_trait]
pub trait InstrumentedMap: Send + Sync {
    /// Each receiver observes every frame rendered after it subscribed.
    /// Dropping the receiver unsubscribes.
    fn subscribe_frames(&self) -> broadcast::Receiver<FrameEvent>;
    fn collect_stats(&self) -> bool;
    fn set_collect_stats(&self, enabled: bool);
    fn frame_stats(&self) -> FrameStats;
    fn loaded_models(&self) -> usize;
    async fn memory_stats(&self) -> Result<MemoryStats>;
    /// Animates the camera and resolves once the transition has settled.
    async fn ease_to(&self, camera: Camera, duration: Duration) -> Result<()>;
    async fn idle(&self, duration: Duration) -> Result<()>;
    async fn destroy(&mut self) -> Result<()>;
}

/// Loads an SDK build and constructs a map instance from it.
#[async_trait]
pub trait MapFactory: Send + Sync {
    type Map: InstrumentedMap;

    async fn create(&self, endpoint: &str, params: &RunParams) -> Result<Self::Map>;
}

/// Generate an error aligned with map semantics.
pub fn map_error(message: impl Into<String>) -> BenchError {
    BenchError::Map(message.into())
}
