use std::fmt::Write;

use mapbench_runner::Comparison;
use mapbench_types::{
    config::RunParams,
    summary::{MetricSummary, QuantileSummary, RunSummary},
};

pub fn header(params: &RunParams) -> String {
    let warmup = if params.warmup { " + warmup" } else { "" };
    format!(
        "{} - {} (iterations: {}{warmup})",
        params.reference_name(),
        params.style_name(),
        params.iterations
    )
}

/// Renders a summary as one block per metric under the run header.
pub fn render_results(params: &RunParams, summary: &RunSummary, failed: bool) -> String {
    let mut out = header(params);
    if failed {
        out.push_str(" (failed)");
    }
    out.push('\n');
    for (name, metric) in summary.entries() {
        match metric {
            MetricSummary::Count(value) => {
                let _ = writeln!(out, "{name}: {value}");
            }
            MetricSummary::Quantiles(quantiles) => {
                let _ = writeln!(out, "{name}");
                out.push_str(&quantile_table(&quantiles));
            }
        }
    }
    out
}

fn quantile_table(summary: &QuantileSummary) -> String {
    let labels: Vec<String> = summary
        .quantiles
        .iter()
        .map(|point| point.quantile.to_string())
        .collect();
    let values: Vec<String> = summary
        .quantiles
        .iter()
        .map(|point| point.value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}")))
        .collect();

    let mut top = String::from("  q    ");
    let mut bottom = String::from("  value");
    for (label, value) in labels.iter().zip(&values) {
        let width = label.len().max(value.len());
        let _ = write!(top, "  {label:>width$}");
        let _ = write!(bottom, "  {value:>width$}");
    }
    format!("{top}\n{bottom}\n")
}

pub fn render_comparison(params: &RunParams, comparison: &Comparison) -> String {
    let mut out = format!("{} vs {}\n", header(params), params.target);
    for indicator in &comparison.deltas {
        let _ = writeln!(out, "{}", indicator.metric);
        for delta in &indicator.deltas {
            let _ = writeln!(out, "  {delta}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use mapbench_stats::summarize;
    use mapbench_types::samples::{Metric, SampleBuffer};

    use super::*;

    fn summary() -> RunSummary {
        let mut buffer = SampleBuffer::new();
        for fps in [60.0, 58.0, 12.0] {
            buffer.record(Metric::Fps, fps);
        }
        buffer.record(Metric::BadFps, 12.0);
        buffer.record(Metric::Draws, 40.0);
        summarize(&buffer)
    }

    #[test]
    fn header_names_reference_and_style() {
        let mut params = RunParams::default();
        assert_eq!(header(&params), "production - Online (iterations: 1)");
        params.warmup = true;
        params.iterations = 5;
        params.custom_reference = Some("https://example.test/sdk".into());
        assert_eq!(
            header(&params),
            "https://example.test/sdk - Online (iterations: 5 + warmup)"
        );
    }

    #[test]
    fn results_show_scalars_and_missing_quantiles() {
        let text = render_results(&RunParams::default(), &summary(), false);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "production - Online (iterations: 1)");
        assert!(lines.contains(&"glitches: 1"));
        assert!(lines.contains(&"gpuMem"));

        let fps_row = lines
            .iter()
            .position(|line| *line == "fps")
            .expect("fps block");
        assert!(lines[fps_row + 1].trim_start().starts_with("q"));
        assert!(lines[fps_row + 2].contains("58.00"));

        let gpu_row = lines
            .iter()
            .position(|line| *line == "gpuMem")
            .expect("gpuMem block");
        assert!(lines[gpu_row + 2]
            .split_whitespace()
            .skip(1)
            .all(|value| value == "-"));
    }

    #[test]
    fn recovered_results_are_marked_failed() {
        let text = render_results(&RunParams::default(), &summary(), true);
        assert!(text.starts_with("production - Online (iterations: 1) (failed)\n"));
    }
}
