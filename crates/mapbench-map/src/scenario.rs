use async_trait::async_trait;
use mapbench_types::{BenchError, Result};
use tokio::time::Duration;
use tracing::debug;

use crate::{Camera, InstrumentedMap};

const CITY_CENTER: [f64; 2] = [82.897904, 54.98318];

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioStep {
    EaseTo { camera: Camera, duration_ms: u64 },
    Idle { duration_ms: u64 },
}

/// Named, ordered script of map interactions.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, steps: Vec<ScenarioStep>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }
}

pub fn builtin_scenarios() -> Vec<Scenario> {
    use ScenarioStep::*;

    let home = Camera::new(CITY_CENTER, 16.0);
    vec![
        Scenario::new(
            "zoom",
            vec![
                EaseTo {
                    camera: Camera::new(CITY_CENTER, 12.0),
                    duration_ms: 3_000,
                },
                Idle { duration_ms: 1_000 },
                EaseTo {
                    camera: Camera::new(CITY_CENTER, 18.0),
                    duration_ms: 3_000,
                },
                Idle { duration_ms: 1_000 },
                EaseTo {
                    camera: home,
                    duration_ms: 1_500,
                },
            ],
        ),
        Scenario::new(
            "pan",
            vec![
                EaseTo {
                    camera: Camera::new([82.9207, 55.0302], 16.0),
                    duration_ms: 2_500,
                },
                EaseTo {
                    camera: Camera::new([82.9346, 54.9833], 16.0),
                    duration_ms: 2_500,
                },
                EaseTo {
                    camera: Camera::new([82.8743, 54.9718], 16.0),
                    duration_ms: 2_500,
                },
                EaseTo {
                    camera: home,
                    duration_ms: 2_500,
                },
                Idle { duration_ms: 1_000 },
            ],
        ),
        Scenario::new(
            "fly-around",
            vec![
                EaseTo {
                    camera: home.tilted(45.0, 0.0),
                    duration_ms: 1_500,
                },
                EaseTo {
                    camera: Camera::new(CITY_CENTER, 17.0).tilted(60.0, 120.0),
                    duration_ms: 4_000,
                },
                EaseTo {
                    camera: Camera::new(CITY_CENTER, 17.0).tilted(60.0, 240.0),
                    duration_ms: 4_000,
                },
                EaseTo {
                    camera: home,
                    duration_ms: 2_000,
                },
            ],
        ),
    ]
}

#[async_trait]
pub trait ScenarioPlayer<M: InstrumentedMap>: Send + Sync {
    /// Plays the named scenario once, resolving after its last step settles.
    async fn run(&self, map: &M, scenario: &str) -> Result<()>;
}

/// Plays scenarios from a fixed catalogue, one step at a time.
pub struct ScriptedPlayer {
    scenarios: Vec<Scenario>,
}

impl ScriptedPlayer {
    pub fn new(scenarios: Vec<Scenario>) -> Self {
        Self { scenarios }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_scenarios())
    }
}

#[async_trait]
impl<M: InstrumentedMap> ScenarioPlayer<M> for ScriptedPlayer {
    async fn run(&self, map: &M, scenario: &str) -> Result<()> {
        let script = self
            .scenarios
            .iter()
            .find(|candidate| candidate.name == scenario)
            .ok_or_else(|| BenchError::Scenario(format!("unknown scenario '{scenario}'")))?;

        for (index, step) in script.steps.iter().enumerate() {
            debug!(scenario, step = index, ?step, "playing scenario step");
            match step {
                ScenarioStep::EaseTo {
                    camera,
                    duration_ms,
                } => {
                    map.ease_to(*camera, Duration::from_millis(*duration_ms))
                        .await?
                }
                ScenarioStep::Idle { duration_ms } => {
                    map.idle(Duration::from_millis(*duration_ms)).await?
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FrameEvent, FrameProfile, SimulatedMap};

    #[test]
    fn builtin_catalogue_is_ordered() {
        let names: Vec<String> = builtin_scenarios().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["zoom", "pan", "fly-around"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_scenario_is_an_error() {
        let map = SimulatedMap::new(FrameProfile::default());
        let player = ScriptedPlayer::builtin();
        let err = player.run(&map, "orbit").await.expect_err("unknown");
        assert!(matches!(err, BenchError::Scenario(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn steps_render_frames_in_order() {
        let map = SimulatedMap::new(FrameProfile {
            frame_time: Duration::from_millis(50),
            ..FrameProfile::default()
        });
        let mut frames = map.subscribe_frames();
        let player = ScriptedPlayer::new(vec![Scenario::new(
            "short",
            vec![
                ScenarioStep::EaseTo {
                    camera: Camera::new(CITY_CENTER, 14.0),
                    duration_ms: 100,
                },
                ScenarioStep::Idle { duration_ms: 50 },
            ],
        )]);

        player.run(&map, "short").await.expect("playback");

        let mut ends = Vec::new();
        while let Ok(event) = frames.try_recv() {
            if let FrameEvent::End { stats, .. } = event {
                ends.push(stats.draw_count);
            }
        }
        assert_eq!(ends.len(), 3);
        assert!(ends[0] > 0 && ends[1] > 0);
        assert_eq!(ends[2], 0);
    }
}
