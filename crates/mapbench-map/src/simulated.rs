use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use mapbench_types::{
    config::{GraphicsPreset, RunParams},
    Result,
};
use tokio::{
    sync::broadcast,
    time::{sleep, Duration, Instant},
};
use tracing::info;

use crate::{map_error, Camera, FrameEvent, FrameStats, InstrumentedMap, MapFactory, MemoryStats};

const FRAME_CHANNEL_CAPACITY: usize = 4096;
const BASE_GPU_BYTES: f64 = 64.0 * 1_000_000.0;
const BASE_CPU_BYTES: f64 = 128.0 * 1_000_000.0;

/// Rendering characteristics of the simulated map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameProfile {
    pub frame_time: Duration,
    pub tiles_per_zoom: u32,
    pub draws_per_tile: u32,
    pub vertices_per_tile: u64,
    /// Models that become loaded per camera move, capped at `max_models`.
    pub models_per_move: usize,
    pub max_models: usize,
}

impl Default for FrameProfile {
    fn default() -> Self {
        Self {
            frame_time: Duration::from_millis(16),
            tiles_per_zoom: 2,
            draws_per_tile: 3,
            vertices_per_tile: 12_000,
            models_per_move: 4,
            max_models: 64,
        }
    }
}

impl FrameProfile {
    fn for_preset(preset: GraphicsPreset) -> Self {
        let base = Self::default();
        match preset {
            GraphicsPreset::Light => Self {
                vertices_per_tile: base.vertices_per_tile / 2,
                models_per_move: 0,
                ..base
            },
            GraphicsPreset::Normal => base,
            GraphicsPreset::Immersive => Self {
                frame_time: Duration::from_millis(20),
                vertices_per_tile: base.vertices_per_tile * 3,
                ..base
            },
        }
    }
}

/// One scripted frame for [`SimulatedMap::render`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedFrame {
    pub frame_time: Duration,
    pub stats: FrameStats,
    pub loaded_models: usize,
}

impl SimulatedFrame {
    /// Frame lasting `1 / fps` seconds that issues `draw_count` draws.
    pub fn at_fps(fps: f64, draw_count: u32) -> Self {
        Self {
            frame_time: Duration::from_secs_f64(1.0 / fps),
            stats: FrameStats {
                draw_count,
                tile_count: draw_count,
                vertex_count: u64::from(draw_count) * 1_000,
            },
            loaded_models: 0,
        }
    }
}

struct SimulatedState {
    frames: broadcast::Sender<FrameEvent>,
    collect_stats: AtomicBool,
    last_stats: Mutex<FrameStats>,
    loaded_models: AtomicUsize,
    camera: Mutex<Camera>,
    fail_memory_queries: AtomicBool,
    destroyed: AtomicBool,
    memory_queries: AtomicUsize,
}

/// Deterministic in-process stand-in for the map SDK.
#[derive(Clone)]
pub struct SimulatedMap {
    profile: FrameProfile,
    state: Arc<SimulatedState>,
}

impl SimulatedMap {
    pub fn new(profile: FrameProfile) -> Self {
        let (frames, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        Self {
            profile,
            state: Arc::new(SimulatedState {
                frames,
                collect_stats: AtomicBool::new(false),
                last_stats: Mutex::new(FrameStats::default()),
                loaded_models: AtomicUsize::new(0),
                camera: Mutex::new(Camera::new([82.897904, 54.98318], 16.0)),
                fail_memory_queries: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
                memory_queries: AtomicUsize::new(0),
            }),
        }
    }

    pub fn fail_memory_queries(&self, fail: bool) {
        self.state.fail_memory_queries.store(fail, Ordering::SeqCst);
    }

    pub fn memory_queries(&self) -> usize {
        self.state.memory_queries.load(Ordering::SeqCst)
    }

    /// Live frame listeners.
    pub fn frame_subscribers(&self) -> usize {
        self.state.frames.receiver_count()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.destroyed.load(Ordering::SeqCst)
    }

    pub fn camera(&self) -> Camera {
        self.state
            .camera
            .lock()
            .map(|camera| *camera)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    /// Renders the given frames back to back, emitting a start/end pair for each.
    pub async fn render(&self, frames: &[SimulatedFrame]) -> Result<()> {
        for frame in frames {
            self.render_frame(frame).await?;
        }
        Ok(())
    }

    async fn render_frame(&self, frame: &SimulatedFrame) -> Result<()> {
        if self.is_destroyed() {
            return Err(map_error("map instance has been destroyed"));
        }
        let _ = self.state.frames.send(FrameEvent::Start { at: Instant::now() });
        sleep(frame.frame_time).await;

        let stats = if self.collect_stats() {
            frame.stats
        } else {
            FrameStats::default()
        };
        self.store_stats(stats)?;
        self.state
            .loaded_models
            .store(frame.loaded_models, Ordering::SeqCst);
        let _ = self.state.frames.send(FrameEvent::End {
            at: Instant::now(),
            stats,
            loaded_models: frame.loaded_models,
        });
        Ok(())
    }

    fn store_stats(&self, stats: FrameStats) -> Result<()> {
        let mut last = self
            .state
            .last_stats
            .lock()
            .map_err(|_| map_error("failed to lock frame stats"))?;
        *last = stats;
        Ok(())
    }

    fn frames_for(&self, duration: Duration) -> u32 {
        let frame_nanos = self.profile.frame_time.as_nanos().max(1);
        u32::try_from(duration.as_nanos() / frame_nanos)
            .unwrap_or(u32::MAX)
            .max(1)
    }

    fn scene_frame(&self, camera: &Camera, draws: bool) -> SimulatedFrame {
        let tile_count = self.profile.tiles_per_zoom * camera.zoom.max(1.0).round() as u32;
        let draw_count = if draws {
            tile_count * self.profile.draws_per_tile
        } else {
            0
        };
        SimulatedFrame {
            frame_time: self.profile.frame_time,
            stats: FrameStats {
                draw_count,
                tile_count,
                vertex_count: u64::from(tile_count) * self.profile.vertices_per_tile,
            },
            loaded_models: self.loaded_models(),
        }
    }
}

#[async_trait]
impl InstrumentedMap for SimulatedMap {
    fn subscribe_frames(&self) -> broadcast::Receiver<FrameEvent> {
        self.state.frames.subscribe()
    }

    fn collect_stats(&self) -> bool {
        self.state.collect_stats.load(Ordering::SeqCst)
    }

    fn set_collect_stats(&self, enabled: bool) {
        self.state.collect_stats.store(enabled, Ordering::SeqCst);
    }

    fn frame_stats(&self) -> FrameStats {
        self.state
            .last_stats
            .lock()
            .map(|stats| *stats)
            .unwrap_or_default()
    }

    fn loaded_models(&self) -> usize {
        self.state.loaded_models.load(Ordering::SeqCst)
    }

    async fn memory_stats(&self) -> Result<MemoryStats> {
        self.state.memory_queries.fetch_add(1, Ordering::SeqCst);
        sleep(Duration::from_millis(5)).await;
        if self.state.fail_memory_queries.load(Ordering::SeqCst) {
            return Err(map_error("memory statistics are unavailable"));
        }
        let stats = self.frame_stats();
        let models = self.loaded_models() as f64;
        Ok(MemoryStats {
            gpu: BASE_GPU_BYTES + stats.vertex_count as f64 * 32.0,
            cpu: BASE_CPU_BYTES + models * 2_000_000.0,
        })
    }

    async fn ease_to(&self, camera: Camera, duration: Duration) -> Result<()> {
        let start = self.camera();
        let steps = self.frames_for(duration);
        for step in 1..=steps {
            let t = f64::from(step) / f64::from(steps);
            let current = Camera {
                center: [
                    start.center[0] + (camera.center[0] - start.center[0]) * t,
                    start.center[1] + (camera.center[1] - start.center[1]) * t,
                ],
                zoom: start.zoom + (camera.zoom - start.zoom) * t,
                pitch: start.pitch + (camera.pitch - start.pitch) * t,
                rotation: start.rotation + (camera.rotation - start.rotation) * t,
            };
            let frame = self.scene_frame(&current, true);
            self.render_frame(&frame).await?;
        }
        if let Ok(mut slot) = self.state.camera.lock() {
            *slot = camera;
        }
        let models =
            (self.loaded_models() + self.profile.models_per_move).min(self.profile.max_models);
        self.state.loaded_models.store(models, Ordering::SeqCst);
        Ok(())
    }

    async fn idle(&self, duration: Duration) -> Result<()> {
        let camera = self.camera();
        for _ in 0..self.frames_for(duration) {
            let frame = self.scene_frame(&camera, false);
            self.render_frame(&frame).await?;
        }
        Ok(())
    }

    async fn destroy(&mut self) -> Result<()> {
        info!("Destroying simulated map instance");
        self.state.destroyed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Builds [`SimulatedMap`] instances, pretending to load the requested SDK build.
#[derive(Debug, Clone, Default)]
pub struct SimulatedMapFactory {
    profile: Option<FrameProfile>,
}

impl SimulatedMapFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed profile instead of deriving one from the graphics preset.
    pub fn with_profile(mut self, profile: FrameProfile) -> Self {
        self.profile = Some(profile);
        self
    }
}

#[async_trait]
impl MapFactory for SimulatedMapFactory {
    type Map = SimulatedMap;

    async fn create(&self, endpoint: &str, params: &RunParams) -> Result<SimulatedMap> {
        info!(
            "Loading simulated map from {} (style {}, preset {:?}, immersive roads {})",
            endpoint, params.style_id, params.graphics_preset, params.immersive_roads
        );
        sleep(Duration::from_millis(10)).await;
        let profile = self
            .profile
            .unwrap_or_else(|| FrameProfile::for_preset(params.graphics_preset));
        Ok(SimulatedMap::new(profile))
    }
}
