use std::env;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use mapbench_map::{builtin_scenarios, ScenarioStep, ScriptedPlayer, SimulatedMapFactory};
use mapbench_ops::{ensure_checkpoint_dir, init_tracing, FileCheckpointStore};
use mapbench_report::LocalReporter;
use mapbench_runner::BenchSession;
use mapbench_types::config::{BenchConfig, GraphicsPreset, RunParams, STYLES};
use tracing::info;

mod display;

#[derive(Parser)]
#[command(
    name = "mapbench",
    version,
    about = "Frame, volume and memory benchmarks for a map renderer"
)]
struct Cli {
    /// Path to a TOML config; falls back to MAPBENCH_CONFIG, then configs/dev.toml.
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print results as JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Measure a scenario against the reference build.
    Run { scenario: String },
    /// Measure a scenario against the reference build, then the target build.
    Compare { scenario: String },
    /// Print and delete results left behind by an interrupted run.
    Recover,
    /// List built-in scenarios.
    Scenarios,
}

#[derive(Args)]
struct Overrides {
    #[arg(long, global = true)]
    iterations: Option<u32>,

    /// Play the scenario once more before measuring, without recording it.
    #[arg(long, global = true, conflicts_with = "no_warmup")]
    warmup: bool,

    /// Measure every playback, overriding a configured warm-up.
    #[arg(long, global = true)]
    no_warmup: bool,

    /// Style name (e.g. "Immersive") or style id.
    #[arg(long, global = true)]
    style: Option<String>,

    #[arg(long, global = true, value_parser = parse_preset)]
    preset: Option<GraphicsPreset>,

    /// Custom reference endpoint measured instead of the configured one.
    #[arg(long, global = true)]
    reference: Option<String>,

    #[arg(long, global = true)]
    target: Option<String>,
}

impl Overrides {
    fn apply(self, run: &mut RunParams) {
        if let Some(iterations) = self.iterations {
            run.iterations = iterations;
        }
        if self.warmup {
            run.warmup = true;
        }
        if self.no_warmup {
            run.warmup = false;
        }
        if let Some(style) = self.style {
            run.style_id = STYLES
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&style))
                .map(|(_, id)| id.to_string())
                .unwrap_or(style);
        }
        if let Some(preset) = self.preset {
            run.graphics_preset = preset;
        }
        if let Some(reference) = self.reference {
            run.custom_reference = Some(reference);
        }
        if let Some(target) = self.target {
            run.target = target;
        }
    }
}

fn parse_preset(raw: &str) -> std::result::Result<GraphicsPreset, String> {
    match raw.to_ascii_lowercase().as_str() {
        "light" => Ok(GraphicsPreset::Light),
        "normal" => Ok(GraphicsPreset::Normal),
        "immersive" => Ok(GraphicsPreset::Immersive),
        other => Err(format!(
            "unknown preset '{other}', expected light, normal or immersive"
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref());
    cli.overrides.apply(&mut config.run);
    config.validate()?;

    init_tracing(&config.ops)?;
    let checkpoint_dir = ensure_checkpoint_dir(&config.ops.checkpoint_dir)?;

    if let Command::Scenarios = cli.command {
        for scenario in builtin_scenarios() {
            let duration_ms: u64 = scenario
                .steps
                .iter()
                .map(|step| match step {
                    ScenarioStep::EaseTo { duration_ms, .. } => *duration_ms,
                    ScenarioStep::Idle { duration_ms } => *duration_ms,
                })
                .sum();
            println!(
                "{:<12} {} steps, {:.1}s",
                scenario.name,
                scenario.steps.len(),
                duration_ms as f64 / 1000.0
            );
        }
        return Ok(());
    }

    let mut session = BenchSession::new(
        config.sampling.clone(),
        SimulatedMapFactory::new(),
        ScriptedPlayer::builtin(),
        FileCheckpointStore::new(checkpoint_dir),
        LocalReporter::new(config.report.channel_capacity),
    );

    let recovered = session.recover_checkpoint().await?;
    if let Some(summary) = &recovered {
        if cli.json {
            println!("{}", serde_json::to_string_pretty(summary)?);
        } else {
            println!("{}", display::render_results(&config.run, summary, true));
        }
    }

    let outcome = match cli.command {
        Command::Run { scenario } => session
            .measure_reference(&scenario, &config.run)
            .await
            .map_err(anyhow::Error::from)
            .and_then(|summary| {
                if cli.json {
                    Ok(serde_json::to_string_pretty(&summary)?)
                } else {
                    Ok(display::render_results(&config.run, &summary, false))
                }
            }),
        Command::Compare { scenario } => session
            .measure_comparing(&scenario, &config.run)
            .await
            .map_err(anyhow::Error::from)
            .and_then(|comparison| {
                if cli.json {
                    Ok(serde_json::to_string_pretty(&comparison)?)
                } else {
                    Ok(display::render_comparison(&config.run, &comparison))
                }
            }),
        Command::Recover => Ok(if recovered.is_none() {
            "No checkpoint found".to_string()
        } else {
            String::new()
        }),
        Command::Scenarios => Ok(String::new()),
    };

    session.teardown().await?;
    let output = outcome?;
    if !output.is_empty() {
        println!("{output}");
    }
    info!("mapbench finished");
    Ok(())
}

fn load_config(explicit: Option<&str>) -> BenchConfig {
    let from_env = env::var("MAPBENCH_CONFIG").ok();
    let path = explicit
        .map(str::to_string)
        .or(from_env)
        .unwrap_or_else(|| "configs/dev.toml".into());
    match BenchConfig::from_file(&path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path
                );
                BenchConfig::default()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path
            );
            BenchConfig::default()
        }
    }
}
