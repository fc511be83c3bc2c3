use std::num::NonZeroU64;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use occupancy::{LocalizationEngine, MockTelemetrySource, SiteConfig, TelemetrySource, TuningMode};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "occupancy")]
#[command(version, about = "RSSI occupancy estimation over recorded probe telemetry")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate one timestamp and print positions and zone headcounts
    Evaluate {
        #[command(flatten)]
        input: Input,
        /// Evaluated timestamp (ms since epoch)
        #[arg(short, long)]
        time: u64,
    },
    /// Total headcount every period between two timestamps
    HeadcountScan {
        #[command(flatten)]
        input: Input,
        #[command(flatten)]
        range: TimeRange,
    },
    /// Reference-device errors and headcounts every period between two timestamps
    ErrorScan {
        #[command(flatten)]
        input: Input,
        #[command(flatten)]
        range: TimeRange,
    },
    /// Tune sensor biases against reference-device ground truth
    Tune {
        #[command(flatten)]
        input: Input,
        #[arg(short, long)]
        time: u64,
        /// Sensor to tune; every active sensor when omitted
        #[arg(short, long)]
        sensor: Option<String>,
        #[arg(short, long, value_enum, default_value_t = Mode::Automatic)]
        mode: Mode,
        /// Discard devices with more than twice the mean error and rescan
        #[arg(long)]
        drop_worst: bool,
    },
    /// Predicted received power over the map for one sensor
    SignalGrid {
        /// Site configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        sensor: String,
        /// Sample spacing in pixels
        #[arg(long)]
        spacing: Option<f64>,
    },
}

#[derive(Args)]
struct Input {
    /// Site configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,
    /// Recorded probe records (JSON array)
    #[arg(short, long)]
    records: PathBuf,
    /// Observation window length in ms
    #[arg(short, long, default_value_t = 5 * 60 * 1000)]
    period: u64,
}

impl Input {
    fn period(&self) -> Result<NonZeroU64> {
        NonZeroU64::new(self.period).context("period must be positive")
    }
}

#[derive(Args)]
struct TimeRange {
    #[arg(long)]
    start: u64,
    #[arg(long)]
    end: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Automatic,
    Manual,
}

impl From<Mode> for TuningMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Automatic => TuningMode::Automatic,
            Mode::Manual => TuningMode::Manual,
        }
    }
}

#[derive(Serialize)]
struct DevicePosition {
    id: String,
    name: String,
    x: f64,
    y: f64,
    within_any_zone: bool,
    is_pseudo: bool,
    members: Vec<String>,
}

#[derive(Serialize)]
struct EvaluateReport {
    summary: occupancy::PassSummary,
    occupants: Vec<DevicePosition>,
}

fn load(input: &Input) -> Result<(LocalizationEngine, MockTelemetrySource)> {
    let config = SiteConfig::from_file(&input.config)
        .with_context(|| format!("loading site config {}", input.config.display()))?;
    let json = std::fs::read_to_string(&input.records)
        .with_context(|| format!("reading probe records {}", input.records.display()))?;
    let source = MockTelemetrySource::from_json_str(input.records.display().to_string(), &json)?;
    Ok((LocalizationEngine::new(config), source))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Evaluate { input, time } => {
            let (mut engine, mut source) = load(&input)?;
            let summary = engine.evaluate_window(&mut source, time, input.period()?)?;
            let occupants = engine
                .occupants()
                .iter()
                .filter_map(|o| {
                    let estimate = o.estimate_at(time)?;
                    Some(DevicePosition {
                        id: o.id.clone(),
                        name: o.name.clone(),
                        x: estimate.position.x,
                        y: estimate.position.y,
                        within_any_zone: estimate.within_any_zone,
                        is_pseudo: o.is_pseudo,
                        members: o.member_ids.clone(),
                    })
                })
                .collect();
            print_json(&EvaluateReport { summary, occupants })?;
        }
        Command::HeadcountScan { input, range } => {
            let (mut engine, mut source) = load(&input)?;
            let samples = engine.headcount_scan(&mut source, range.start, range.end, input.period()?)?;
            print_json(&samples)?;
        }
        Command::ErrorScan { input, range } => {
            let (mut engine, mut source) = load(&input)?;
            let report = engine.error_scan(&mut source, range.start, range.end, input.period()?)?;
            print_json(&report)?;
        }
        Command::Tune {
            input,
            time,
            sensor,
            mode,
            drop_worst,
        } => {
            let (mut engine, mut source) = load(&input)?;
            let records = source.fetch(time.saturating_sub(input.period()?.get()), time)?;
            engine.load_window(&records);
            let outcomes = match sensor {
                Some(id) => vec![engine.try_tune_bias(&id, time, mode.into(), drop_worst)?],
                None => engine.tune_all(time, mode.into(), drop_worst),
            };
            print_json(&outcomes)?;
        }
        Command::SignalGrid { config, sensor, spacing } => {
            let config = SiteConfig::from_file(&config)
                .with_context(|| format!("loading site config {}", config.display()))?;
            let engine = LocalizationEngine::new(config);
            let grid = engine
                .signal_grid(&sensor, spacing)
                .with_context(|| format!("unknown sensor {}", sensor))?;
            print_json(&grid)?;
        }
    }

    Ok(())
}
