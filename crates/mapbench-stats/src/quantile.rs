use mapbench_types::{
    samples::{Metric, SampleBuffer},
    summary::{QuantilePoint, QuantileSet, QuantileSummary, RunSummary},
};
use tracing::debug;

/// Reduces `samples` to the requested quantiles using nearest-rank selection.
///
/// The input is copied and sorted ascending with IEEE total ordering, so equal
/// values keep arrival order and NaN sorts after every number. Quantile `q`
/// maps to index `round(q * (n - 1))`. An empty input yields `None` for every
/// quantile.
pub fn reduce(samples: &[f64], quantiles: &QuantileSet) -> QuantileSummary {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let points = quantiles
        .as_slice()
        .iter()
        .map(|&quantile| QuantilePoint {
            quantile,
            value: nearest_rank(&sorted, quantile),
        })
        .collect();

    QuantileSummary {
        count: sorted.len(),
        quantiles: points,
    }
}

fn nearest_rank(sorted: &[f64], quantile: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let index = (quantile * last as f64).round() as usize;
    sorted.get(index.min(last)).copied()
}

/// Reduces every series of a run into its summary.
pub fn summarize(buffer: &SampleBuffer) -> RunSummary {
    debug!(
        frames = buffer.frame_count(),
        memory_ticks = buffer.mem.gpu.len(),
        "reducing run samples"
    );
    let frame_rate = QuantileSet::frame_rate();
    let memory = QuantileSet::memory();
    let standard = QuantileSet::standard();

    RunSummary {
        fps: reduce(buffer.series(Metric::Fps), &frame_rate),
        badfps: reduce(buffer.series(Metric::BadFps), &frame_rate),
        glitches: buffer.series(Metric::BadFps).len(),
        draws: reduce(buffer.series(Metric::Draws), &standard),
        tiles: reduce(buffer.series(Metric::Tiles), &standard),
        vertices: reduce(buffer.series(Metric::Vertices), &standard),
        models: reduce(buffer.series(Metric::Models), &standard),
        gpu_mem: reduce(buffer.series(Metric::GpuMem), &memory),
        cpu_mem: reduce(buffer.series(Metric::CpuMem), &memory),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[f64]) -> QuantileSet {
        QuantileSet::new(values.to_vec()).expect("valid quantiles")
    }

    #[test]
    fn extremes_match_min_and_max() {
        let samples = [7.0, -3.5, 12.0, 0.0, 4.25];
        let summary = reduce(&samples, &set(&[0.0, 1.0]));
        assert_eq!(summary.count, 5);
        assert_eq!(summary.get(0.0), Some(-3.5));
        assert_eq!(summary.get(1.0), Some(12.0));
    }

    #[test]
    fn values_come_from_sorted_rank() {
        let samples: Vec<f64> = (1..=11).rev().map(f64::from).collect();
        let summary = reduce(&samples, &set(&[0.1, 0.25, 0.5, 0.9]));
        // n = 11 -> index = round(q * 10)
        assert_eq!(summary.get(0.1), Some(2.0));
        assert_eq!(summary.get(0.25), Some(4.0));
        assert_eq!(summary.get(0.5), Some(6.0));
        assert_eq!(summary.get(0.9), Some(10.0));
    }

    #[test]
    fn non_integral_rank_rounds_to_nearest() {
        let samples = [10.0, 20.0, 30.0, 40.0];
        // index = q * 3: 0.4 -> 1.2 -> 1, 0.5 -> 1.5 -> 2, 0.75 -> 2.25 -> 2
        let summary = reduce(&samples, &set(&[0.4, 0.5, 0.75]));
        assert_eq!(summary.get(0.4), Some(20.0));
        assert_eq!(summary.get(0.5), Some(30.0));
        assert_eq!(summary.get(0.75), Some(30.0));
    }

    #[test]
    fn preserves_requested_order() {
        let summary = reduce(&[1.0, 2.0], &set(&[0.75, 0.25]));
        let order: Vec<f64> = summary.quantiles.iter().map(|p| p.quantile).collect();
        assert_eq!(order, vec![0.75, 0.25]);
    }

    #[test]
    fn empty_series_yields_no_data() {
        let summary = reduce(&[], &QuantileSet::frame_rate());
        assert_eq!(summary.count, 0);
        assert_eq!(summary.quantiles.len(), 6);
        assert!(summary.quantiles.iter().all(|p| p.value.is_none()));
    }

    #[test]
    fn single_sample_fills_every_quantile() {
        let summary = reduce(&[42.0], &QuantileSet::standard());
        assert!(summary.quantiles.iter().all(|p| p.value == Some(42.0)));
    }

    #[test]
    fn nan_samples_sort_last() {
        let summary = reduce(&[f64::NAN, 1.0, 2.0], &set(&[0.0, 0.5]));
        assert_eq!(summary.get(0.0), Some(1.0));
        assert_eq!(summary.get(0.5), Some(2.0));
    }

    #[test]
    fn input_is_not_reordered() {
        let samples = vec![3.0, 1.0, 2.0];
        let _ = reduce(&samples, &QuantileSet::standard());
        assert_eq!(samples, vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn summarize_empty_buffer_is_all_no_data() {
        let summary = summarize(&SampleBuffer::new());
        assert_eq!(summary.glitches, 0);
        for (name, metric) in summary.entries() {
            match metric {
                mapbench_types::summary::MetricSummary::Count(count) => {
                    assert_eq!(count, 0, "{name}")
                }
                mapbench_types::summary::MetricSummary::Quantiles(q) => {
                    assert!(q.quantiles.iter().all(|p| p.value.is_none()), "{name}")
                }
            }
        }
    }

    #[test]
    fn summarize_uses_metric_specific_quantiles() {
        let mut buffer = SampleBuffer::new();
        for fps in [60.0, 12.0, 45.0, 8.0] {
            buffer.record(Metric::Fps, fps);
        }
        buffer.record(Metric::BadFps, 12.0);
        buffer.record(Metric::BadFps, 8.0);
        buffer.record(Metric::GpuMem, 300.0);

        let summary = summarize(&buffer);
        assert_eq!(summary.glitches, 2);
        assert_eq!(summary.fps.get(0.01), Some(8.0));
        assert_eq!(summary.fps.get(0.75), Some(45.0));
        assert_eq!(summary.gpu_mem.get(0.99), Some(300.0));
        assert_eq!(summary.cpu_mem.count, 0);
        assert_eq!(summary.draws.quantiles.len(), 5);
    }
}
