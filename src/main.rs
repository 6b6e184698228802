//! CLI entry point for the trip demand pipeline.
//!
//! Provides subcommands for summarizing aggregated demand, inspecting the
//! windowed train/test split, and running a baseline forecast end to end.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use trip_demand::{
    config::{AggregationLevel, ForecastMode, PipelineConfig, ScalePolicy},
    fetch::load_source,
    output::{append_records, print_json, print_pretty},
    parser::parse_trips,
    pipeline::{PipelineContext, types::RawRecord},
    regressor::WindowMeanBaseline,
    stats::preview,
};

#[derive(Parser)]
#[command(name = "trip_demand")]
#[command(about = "Turn geo-tagged trip records into demand sequences and forecasts")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and aggregate trips, then log a summary and preview
    Summarize {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Number of aggregated rows to preview
        #[arg(short, long)]
        preview: Option<usize>,
    },
    /// Build windowed sequences and split them into train and test sets
    Sequences {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Fit the baseline regressor, evaluate it, and forecast future demand
    Forecast {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        #[command(flatten)]
        pipeline: PipelineArgs,

        /// CSV file to append test-set predictions to
        #[arg(long, default_value = "predictions.csv")]
        predictions: String,

        /// CSV file to append forecast rows to
        #[arg(long, default_value = "forecast.csv")]
        forecast: String,

        /// Abort the run if it takes longer than this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AggregationArg {
    Daily,
    Hourly,
}

#[derive(Clone, Copy, ValueEnum)]
enum ForecastModeArg {
    Single,
    Rolling,
}

#[derive(Args)]
struct PipelineArgs {
    /// JSON config file; flags override its values
    #[arg(short, long)]
    config: Option<String>,

    /// Bucket trips per day or per hour
    #[arg(short, long, value_enum)]
    aggregation: Option<AggregationArg>,

    /// Grid cell size in degrees
    #[arg(short, long)]
    region_size: Option<f64>,

    /// Window width in buckets
    #[arg(short, long)]
    sequence_length: Option<usize>,

    /// Fraction of samples used for training
    #[arg(short, long)]
    train_ratio: Option<f64>,

    /// Number of future periods to forecast
    #[arg(short, long)]
    days_to_predict: Option<usize>,

    /// Reuse one window per region, or roll predictions forward
    #[arg(long, value_enum)]
    forecast_mode: Option<ForecastModeArg>,

    /// Scale constant arrays to zero instead of failing
    #[arg(long, default_value_t = false)]
    allow_degenerate_scale: bool,
}

impl PipelineArgs {
    fn resolve(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("Failed to load config '{path}'"))?,
            None => PipelineConfig::default(),
        };

        if let Some(level) = self.aggregation {
            config.aggregation_level = match level {
                AggregationArg::Daily => AggregationLevel::Daily,
                AggregationArg::Hourly => AggregationLevel::Hourly,
            };
        }
        if let Some(region_size) = self.region_size {
            config.region_size = region_size;
        }
        if let Some(sequence_length) = self.sequence_length {
            config.sequence_length = sequence_length;
        }
        if let Some(train_ratio) = self.train_ratio {
            config.train_ratio = train_ratio;
        }
        if let Some(days) = self.days_to_predict {
            config.days_to_predict = days;
        }
        if let Some(mode) = self.forecast_mode {
            config.forecast_mode = match mode {
                ForecastModeArg::Single => ForecastMode::Single,
                ForecastModeArg::Rolling => ForecastMode::Rolling,
            };
        }
        if self.allow_degenerate_scale {
            config.scale_policy = ScalePolicy::Collapse;
        }

        config.validate()?;
        Ok(config)
    }

    fn context(&self) -> Result<PipelineContext> {
        Ok(PipelineContext::new(self.resolve()?)?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file
    let _file_guard = init_logging()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Summarize {
            source,
            pipeline,
            preview: limit,
        } => {
            let ctx = pipeline.context()?;
            let rows = load_rows(&source).await?;
            let (buckets, summary) = ctx.prepare(rows)?;

            print_pretty(&summary);
            print_json(&summary)?;
            let limit = limit.unwrap_or(ctx.config().preview_limit);
            print_json(&preview(&buckets, limit))?;
        }
        Commands::Sequences { source, pipeline } => {
            let ctx = pipeline.context()?;
            let rows = load_rows(&source).await?;
            let (buckets, summary) = ctx.prepare(rows)?;
            let sequence = ctx.sequences(&buckets)?;
            let summary = summary.with_sequences(sequence.len());
            let regions = sequence.regions.len();
            let split = ctx.split(sequence)?;

            info!(
                samples = summary.sequences,
                regions,
                train = split.train.targets.len(),
                test = split.test.targets.len(),
                "Sequence split ready"
            );
            print_json(&summary)?;
            print_json(&split.scalers)?;
        }
        Commands::Forecast {
            source,
            pipeline,
            predictions,
            forecast,
            timeout_secs,
        } => {
            let ctx = pipeline.context()?;
            let rows = load_rows(&source).await?;
            let mut model = WindowMeanBaseline::new();

            let run = ctx.run(rows, &mut model);
            let report = match timeout_secs {
                Some(secs) => tokio::time::timeout(Duration::from_secs(secs), run)
                    .await
                    .with_context(|| format!("Pipeline did not finish within {secs}s"))??,
                None => run.await?,
            };

            print_json(&report.summary)?;
            print_json(&report.evaluation)?;
            append_records(&predictions, &report.predictions)?;
            append_records(&forecast, &report.forecast)?;

            info!(
                predictions = report.predictions.len(),
                forecast = report.forecast.len(),
                predictions_file = %predictions,
                forecast_file = %forecast,
                "Results written"
            );
        }
    }

    Ok(())
}

/// Colored stderr logging plus a JSON rolling log file.
fn init_logging() -> Result<WorkerGuard> {
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/trip_demand.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("trip_demand.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

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

    Ok(file_guard)
}

/// Loads and decodes the raw trip rows from a file or URL.
#[tracing::instrument]
async fn load_rows(source: &str) -> Result<Vec<RawRecord>> {
    let bytes = load_source(source).await?;
    let rows = parse_trips(&bytes)?;
    info!(rows = rows.len(), "Trip rows decoded");
    Ok(rows)
}
