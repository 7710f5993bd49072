use mapbench_map::{InstrumentedMap, MapFactory, ScenarioPlayer};
use mapbench_ops::CheckpointStore;
use mapbench_report::ReportSink;
use mapbench_stats::{compare, summarize, IndicatorDelta};
use mapbench_types::{
    config::{RunParams, SamplingConfig},
    events::{ReportEvent, RunnerState},
    summary::RunSummary,
    Result,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::ScenarioRunner;

/// Reference and target summaries of the same scenario, with their deltas.
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub reference: RunSummary,
    pub target: RunSummary,
    pub deltas: Vec<IndicatorDelta>,
}

/// Owns the single live map instance and the collaborators of a measurement.
///
/// Every measurement destroys the previous map before the factory builds the
/// next one, so at most one instance is alive at a time.
pub struct BenchSession<F, P, S, R>
where
    F: MapFactory,
{
    factory: F,
    player: P,
    checkpoints: S,
    reporter: R,
    sampling: SamplingConfig,
    map: Option<F::Map>,
}

impl<F, P, S, R> BenchSession<F, P, S, R>
where
    F: MapFactory,
    P: ScenarioPlayer<F::Map>,
    S: CheckpointStore,
    R: ReportSink,
{
    pub fn new(
        sampling: SamplingConfig,
        factory: F,
        player: P,
        checkpoints: S,
        reporter: R,
    ) -> Self {
        Self {
            factory,
            player,
            checkpoints,
            reporter,
            sampling,
            map: None,
        }
    }

    pub fn map(&self) -> Option<&F::Map> {
        self.map.as_ref()
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Summarizes and discards the samples of a run that never finished.
    pub async fn recover_checkpoint(&self) -> Result<Option<RunSummary>> {
        let Some(buffer) = self.checkpoints.recover_if_present()? else {
            return Ok(None);
        };
        if buffer.is_empty() {
            info!("Discarding checkpoint without samples");
            return Ok(None);
        }
        warn!(
            frames = buffer.frame_count(),
            "Found checkpoint of an interrupted run"
        );
        let summary = summarize(&buffer);
        self.reporter
            .publish(ReportEvent::log("Recovered results of an interrupted run"))
            .await?;
        Ok(Some(summary))
    }

    /// Loads the SDK build at `endpoint` and measures `scenario` on it.
    pub async fn measure(
        &mut self,
        endpoint: &str,
        scenario: &str,
        params: &RunParams,
    ) -> Result<RunSummary> {
        self.teardown().await?;
        let created = self.factory.create(endpoint, params).await?;
        let map = self.map.insert(created);

        self.reporter
            .publish(ReportEvent::log(format!("Testing {endpoint}")))
            .await?;
        self.reporter
            .publish(ReportEvent::lifecycle(
                RunnerState::Attaching,
                Some(format!("scenario {scenario}")),
            ))
            .await?;

        let mut runner = ScenarioRunner::new(
            &*map,
            &self.player,
            &self.checkpoints,
            self.sampling.clone(),
        );
        let outcome = runner.measure(scenario, params).await;

        self.reporter
            .publish(ReportEvent::lifecycle(
                runner.state(),
                Some(match &outcome {
                    Ok(_) => format!("scenario {scenario} finished"),
                    Err(err) => format!("scenario {scenario} failed: {err}"),
                }),
            ))
            .await?;
        outcome
    }

    /// Measures the reference build and reports the outcome as a finish event.
    pub async fn measure_reference(
        &mut self,
        scenario: &str,
        params: &RunParams,
    ) -> Result<RunSummary> {
        let endpoint = params.reference_endpoint().to_string();
        match self.measure(&endpoint, scenario, params).await {
            Ok(summary) => {
                self.reporter
                    .publish(ReportEvent::finish(true, Some(summary.clone())))
                    .await?;
                Ok(summary)
            }
            Err(err) => {
                self.reporter
                    .publish(ReportEvent::finish(false, None))
                    .await?;
                Err(err)
            }
        }
    }

    /// Measures the reference build, then the target, and reports per-quantile deltas.
    pub async fn measure_comparing(
        &mut self,
        scenario: &str,
        params: &RunParams,
    ) -> Result<Comparison> {
        let reference_endpoint = params.reference_endpoint().to_string();
        let outcome = async {
            let reference = self.measure(&reference_endpoint, scenario, params).await?;
            let target = self.measure(&params.target, scenario, params).await?;
            Ok::<_, mapbench_types::BenchError>((reference, target))
        }
        .await;

        let (reference, target) = match outcome {
            Ok(pair) => pair,
            Err(err) => {
                self.reporter
                    .publish(ReportEvent::finish(false, None))
                    .await?;
                return Err(err);
            }
        };

        let deltas = compare(&reference, &target);
        for indicator in &deltas {
            self.reporter
                .publish(ReportEvent::log(indicator.metric))
                .await?;
            for delta in &indicator.deltas {
                self.reporter
                    .publish(ReportEvent::log(format!("  {delta}")))
                    .await?;
            }
        }
        self.reporter
            .publish(ReportEvent::finish(true, Some(reference.clone())))
            .await?;

        Ok(Comparison {
            reference,
            target,
            deltas,
        })
    }

    /// Destroys the live map instance, if any.
    pub async fn teardown(&mut self) -> Result<()> {
        if let Some(mut previous) = self.map.take() {
            info!("Destroying previous map instance");
            previous.destroy().await?;
        }
        Ok(())
    }
}
