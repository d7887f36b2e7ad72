//! CLI entry point for the parkstat occupancy analytics tool.
//!
//! Provides subcommands for building the full dashboard payload,
//! ranking facilities by stability, and correlating a car park with
//! its nearest bike station.

use anyhow::Result;
use chrono::Duration;
use clap::{Parser, Subcommand, ValueEnum};
use parkstat::analyzers::bucketize::{bucketize, dedup};
use parkstat::analyzers::correlate::correlate_nearest;
use parkstat::analyzers::report::{self, AnalyticsConfig};
use parkstat::analyzers::stability::{RankOrder, rank_stability};
use parkstat::analyzers::types::Kind;
use parkstat::ingest::load_history;
use parkstat::locations::{JsonLocations, LocationResolver, NoLocations};
use parkstat::output::write_json;
use std::ffi::OsStr;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "parkstat")]
#[command(about = "Occupancy analytics for car parks and bike stations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Car,
    Bike,
    All,
}

impl KindArg {
    fn to_filter(self) -> Option<Kind> {
        match self {
            KindArg::Car => Some(Kind::Car),
            KindArg::Bike => Some(Kind::Bike),
            KindArg::All => None,
        }
    }
}

impl std::fmt::Display for KindArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KindArg::Car => write!(f, "car"),
            KindArg::Bike => write!(f, "bike"),
            KindArg::All => write!(f, "all"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the full dashboard payload (series + stability + correlation)
    Report {
        /// Path to the semicolon-delimited history file
        #[arg(value_name = "HISTORY_CSV")]
        input: String,

        /// Optional locations.json with facility coordinates
        #[arg(short, long)]
        locations: Option<String>,

        /// Bucket width in minutes
        #[arg(short = 'w', long, default_value_t = 60)]
        bucket_minutes: u32,

        /// Trailing stability window in hours
        #[arg(long, default_value_t = 24)]
        window_hours: u32,

        /// Minimum buckets per entity to enter the stability ranking
        #[arg(long, default_value_t = 6)]
        min_samples: usize,

        /// Car facility to correlate; defaults to the best-supported one
        #[arg(short, long)]
        target: Option<String>,

        /// Output JSON path (stdout when omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Rank facilities by occupancy volatility over the trailing window
    Stability {
        /// Path to the semicolon-delimited history file
        #[arg(value_name = "HISTORY_CSV")]
        input: String,

        /// Bucket width in minutes
        #[arg(short = 'w', long, default_value_t = 60)]
        bucket_minutes: u32,

        /// Trailing window in hours
        #[arg(long, default_value_t = 24)]
        window_hours: u32,

        /// Minimum buckets per entity to enter the ranking
        #[arg(long, default_value_t = 6)]
        min_samples: usize,

        /// Which facility kind to rank
        #[arg(short, long, value_enum, default_value_t = KindArg::Car)]
        kind: KindArg,

        /// Rank the most volatile facilities first instead
        #[arg(long, default_value_t = false)]
        unstable_first: bool,

        /// Output JSON path (stdout when omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Correlate a car park with its nearest bike station
    Correlate {
        /// Path to the semicolon-delimited history file
        #[arg(value_name = "HISTORY_CSV")]
        input: String,

        /// Optional locations.json with facility coordinates
        #[arg(short, long)]
        locations: Option<String>,

        /// Bucket width in minutes (the common resampling width)
        #[arg(short = 'w', long, default_value_t = 60)]
        bucket_minutes: u32,

        /// Car facility to correlate; defaults to the best-supported one
        #[arg(short, long)]
        target: Option<String>,

        /// Output JSON path (stdout when omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/parkstat.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("parkstat.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Report {
            input,
            locations,
            bucket_minutes,
            window_hours,
            min_samples,
            target,
            output,
        } => {
            let ingested = load_history(&input)?;
            info!(
                readings = ingested.readings.len(),
                dropped = ingested.dropped.total(),
                "history loaded"
            );

            let resolver = load_resolver(locations.as_deref())?;
            let cfg = AnalyticsConfig {
                bucket_width_secs: i64::from(bucket_minutes) * 60,
                window: Duration::hours(i64::from(window_hours)),
                min_samples,
                target_car: target,
            };

            let data = report::run(ingested, resolver.as_ref(), &cfg);
            write_json(output.as_deref().map(Path::new), &data)?;
        }

        Commands::Stability {
            input,
            bucket_minutes,
            window_hours,
            min_samples,
            kind,
            unstable_first,
            output,
        } => {
            let ingested = load_history(&input)?;
            let readings = dedup(ingested.readings);
            let bucketed = bucketize(&readings, i64::from(bucket_minutes) * 60);

            let order = if unstable_first {
                RankOrder::MostUnstableFirst
            } else {
                RankOrder::MostStableFirst
            };
            let ranking = rank_stability(
                &bucketed,
                kind.to_filter(),
                Duration::hours(i64::from(window_hours)),
                min_samples,
                order,
            );

            if ranking.is_empty() {
                warn!(min_samples, "no facility has enough samples to rank");
            }
            write_json(output.as_deref().map(Path::new), &ranking)?;
        }

        Commands::Correlate {
            input,
            locations,
            bucket_minutes,
            target,
            output,
        } => {
            let ingested = load_history(&input)?;
            let readings = dedup(ingested.readings);
            let bucketed = bucketize(&readings, i64::from(bucket_minutes) * 60);

            let resolver = load_resolver(locations.as_deref())?;
            let target = target
                .or_else(|| report::default_target(&bucketed))
                .ok_or_else(|| anyhow::anyhow!("no car facility in the data"))?;

            let result = correlate_nearest(
                &bucketed,
                resolver.as_ref(),
                &target,
                i64::from(bucket_minutes) * 60,
            )?;
            write_json(output.as_deref().map(Path::new), &result)?;
        }
    }

    Ok(())
}

/// Loads the coordinate table when a path was given; otherwise runs with
/// data-borne coordinates only.
fn load_resolver(path: Option<&str>) -> Result<Box<dyn LocationResolver>> {
    match path {
        Some(p) => {
            let table = JsonLocations::from_path(p)?;
            info!(entries = table.len(), path = p, "location table loaded");
            Ok(Box::new(table))
        }
        None => Ok(Box::new(NoLocations)),
    }
}
