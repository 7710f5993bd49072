use futures::{future::BoxFuture, stream::FuturesUnordered, StreamExt};
use mapbench_map::{FrameEvent, FrameStats, InstrumentedMap, MemoryStats, ScenarioPlayer};
use mapbench_ops::CheckpointStore;
use mapbench_stats::summarize;
use mapbench_types::{
    config::{RunParams, SamplingConfig},
    events::RunnerState,
    samples::{Metric, SampleBuffer},
    summary::RunSummary,
    BenchError, Result,
};
use tokio::{
    sync::broadcast::{
        self,
        error::{RecvError, TryRecvError},
    },
    time::{interval_at, timeout, Duration, Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::runner_error;

const MILLION: f64 = 1_000_000.0;

/// A completed frame as seen by the frame-end handler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSample {
    /// Time since the paired frame start; `None` when no start was observed.
    pub elapsed: Option<Duration>,
    pub stats: FrameStats,
    pub loaded_models: usize,
}

/// Appends one frame's observations to `buffer`.
///
/// Frames at or below `bad_fps_threshold` count as bad whether or not they
/// drew anything, but only frames that issued draws enter the fps series.
/// Counters are recorded for every frame. A frame whose start and end share a
/// timestamp has no measurable rate and is treated like an unpaired end.
pub fn classify_frame(buffer: &mut SampleBuffer, frame: &FrameSample, bad_fps_threshold: f64) {
    if let Some(elapsed) = frame.elapsed.filter(|elapsed| !elapsed.is_zero()) {
        let fps = 1e9 / elapsed.as_nanos() as f64;
        if fps <= bad_fps_threshold {
            buffer.record(Metric::BadFps, fps);
        }
        if frame.stats.draw_count > 0 {
            buffer.record(Metric::Fps, fps);
        }
    }
    buffer.record(Metric::Draws, f64::from(frame.stats.draw_count));
    buffer.record(Metric::Tiles, f64::from(frame.stats.tile_count));
    buffer.record(Metric::Vertices, frame.stats.vertex_count as f64 / MILLION);
    buffer.record(Metric::Models, frame.loaded_models as f64);
}

/// Listeners, timer and in-flight queries owned by one run.
///
/// Dropping it unsubscribes from frame events, stops the interval, abandons
/// pending memory queries and restores the map's collect-stats toggle.
struct Attachment<'a, M: InstrumentedMap> {
    map: &'a M,
    frames: Option<broadcast::Receiver<FrameEvent>>,
    ticker: Interval,
    memory_queries: FuturesUnordered<BoxFuture<'a, Result<MemoryStats>>>,
    previous_collect_stats: bool,
    frame_start: Option<Instant>,
    recording: bool,
    bad_fps_threshold: f64,
    buffer: SampleBuffer,
}

impl<'a, M: InstrumentedMap> Attachment<'a, M> {
    fn attach(map: &'a M, sampling: &SamplingConfig) -> Self {
        let period = Duration::from_millis(sampling.memory_interval_ms);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(?period, "attached frame listeners and memory sampler");
        Self {
            map,
            frames: Some(map.subscribe_frames()),
            ticker,
            memory_queries: FuturesUnordered::new(),
            previous_collect_stats: map.collect_stats(),
            frame_start: None,
            recording: false,
            bad_fps_threshold: sampling.bad_fps_threshold,
            buffer: SampleBuffer::new(),
        }
    }

    fn set_recording(&mut self, recording: bool) {
        self.map.set_collect_stats(recording);
        self.recording = recording;
    }

    fn on_frame(&mut self, event: FrameEvent) {
        match event {
            FrameEvent::Start { at } => self.frame_start = Some(at),
            FrameEvent::End {
                at,
                stats,
                loaded_models,
            } => {
                let elapsed = self
                    .frame_start
                    .take()
                    .map(|start| at.saturating_duration_since(start));
                if self.recording {
                    let frame = FrameSample {
                        elapsed,
                        stats,
                        loaded_models,
                    };
                    classify_frame(&mut self.buffer, &frame, self.bad_fps_threshold);
                }
            }
        }
    }

    fn on_tick<S: CheckpointStore + ?Sized>(&mut self, checkpoints: &S) {
        let map = self.map;
        self.memory_queries.push(map.memory_stats());
        checkpoints.persist(&self.buffer);
    }

    fn on_memory(&mut self, result: Result<MemoryStats>) {
        match result {
            Ok(stats) => {
                self.buffer.record(Metric::GpuMem, stats.gpu / MILLION);
                self.buffer.record(Metric::CpuMem, stats.cpu / MILLION);
            }
            Err(err) => warn!("Memory statistics unavailable for this tick: {err}"),
        }
    }

    /// Consumes frame events already queued, so an iteration's frames are
    /// attributed to it before the next one starts.
    fn drain_frames(&mut self) {
        while let Some(frames) = self.frames.as_mut() {
            match frames.try_recv() {
                Ok(event) => self.on_frame(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Frame listener lagged behind, frames dropped")
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}

impl<M: InstrumentedMap> Drop for Attachment<'_, M> {
    fn drop(&mut self) {
        self.map.set_collect_stats(self.previous_collect_stats);
        debug!(
            pending_memory_queries = self.memory_queries.len(),
            "detached frame listeners and memory sampler"
        );
    }
}

async fn next_frame(frames: &mut Option<broadcast::Receiver<FrameEvent>>) -> Option<FrameEvent> {
    let Some(receiver) = frames.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match receiver.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Frame listener lagged behind, frames dropped")
            }
            Err(RecvError::Closed) => {
                *frames = None;
                return None;
            }
        }
    }
}

/// Drives one measurement run against a map instance.
pub struct ScenarioRunner<'a, M, P, S: ?Sized> {
    map: &'a M,
    player: &'a P,
    checkpoints: &'a S,
    sampling: SamplingConfig,
    state: RunnerState,
}

impl<'a, M, P, S> ScenarioRunner<'a, M, P, S>
where
    M: InstrumentedMap,
    P: ScenarioPlayer<M>,
    S: CheckpointStore + ?Sized,
{
    pub fn new(map: &'a M, player: &'a P, checkpoints: &'a S, sampling: SamplingConfig) -> Self {
        Self {
            map,
            player,
            checkpoints,
            sampling,
            state: RunnerState::Idle,
        }
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    fn transition(&mut self, next: RunnerState) {
        debug!(from = ?self.state, to = ?next, "runner state change");
        self.state = next;
    }

    /// Plays `scenario` `params.iterations` times (plus one unrecorded warm-up
    /// playback when `params.warmup` is set) and reduces what was sampled.
    ///
    /// On failure the partial samples are left in the checkpoint store; the
    /// frame listener, timer and stats toggle are released on every path.
    pub async fn measure(&mut self, scenario: &str, params: &RunParams) -> Result<RunSummary> {
        self.sampling.validate()?;
        self.transition(RunnerState::Attaching);
        let mut attachment = Attachment::attach(self.map, &self.sampling);
        info!(
            scenario,
            iterations = params.iterations,
            warmup = params.warmup,
            "Measuring scenario"
        );

        let mut outcome = Ok(());
        for iteration in 0..params.total_iterations() {
            self.transition(RunnerState::Running { iteration });
            attachment.set_recording(!(params.warmup && iteration == 0));
            if let Err(err) = self
                .play_iteration(&mut attachment, scenario, iteration)
                .await
            {
                outcome = Err(err);
                break;
            }
        }

        self.transition(RunnerState::Finalizing);
        let buffer = std::mem::take(&mut attachment.buffer);
        drop(attachment);
        let result = match outcome {
            Ok(()) => {
                self.checkpoints.clear();
                Ok(summarize(&buffer))
            }
            Err(err) => {
                warn!(
                    frames = buffer.frame_count(),
                    "Scenario '{scenario}' failed, partial samples kept in checkpoint: {err}"
                );
                self.checkpoints.persist(&buffer);
                Err(err)
            }
        };
        self.transition(RunnerState::Idle);
        result
    }

    async fn play_iteration(
        &self,
        attachment: &mut Attachment<'a, M>,
        scenario: &str,
        iteration: u32,
    ) -> Result<()> {
        let playback = self.player.run(self.map, scenario);
        let bounded = async {
            match self.sampling.playback_timeout_ms {
                Some(limit) => match timeout(Duration::from_millis(limit), playback).await {
                    Ok(result) => result,
                    Err(_) => Err(BenchError::Timeout {
                        scenario: scenario.to_string(),
                        iteration,
                        after_ms: limit,
                    }),
                },
                None => playback.await,
            }
        };
        tokio::pin!(bounded);

        loop {
            tokio::select! {
                result = &mut bounded => {
                    attachment.drain_frames();
                    debug!(iteration, frames = attachment.buffer.frame_count(), "playback settled");
                    return result;
                }
                event = next_frame(&mut attachment.frames) => match event {
                    Some(event) => attachment.on_frame(event),
                    None => return Err(runner_error("map closed its frame channel during playback")),
                },
                _ = attachment.ticker.tick() => attachment.on_tick(self.checkpoints),
                Some(result) = attachment.memory_queries.next(), if !attachment.memory_queries.is_empty() => {
                    attachment.on_memory(result)
                }
            }
        }
    }
}
