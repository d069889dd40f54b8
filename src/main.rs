use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use vidcurate::{
    BatchRequest, CommandDetector, CurationConfig, CurationPipeline, DatasetIndexer, FrameNaming,
    TargetClass,
};

const EXIT_NEED_RETRY: i32 = 2;
const EXIT_FATAL: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "vidcurate")]
#[command(about = "Curates generated candidate videos into a training dataset")]
#[command(version)]
#[command(long_about = "Filters generated hand-object interaction videos (hand and target \
object presence, static camera, optional plausibility score), normalizes the survivors to a \
fixed frame count and commits them as indexed samples of a dataset with a manifest. \
Exits 0 when every candidate succeeded, 2 when the batch should be retried and 1 on fatal errors.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "vidcurate.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Object name used in sample names (`<object>_<viewpoint>_<NNN>`)
    #[arg(long)]
    object: Option<String>,

    /// Viewpoint name used in sample names
    #[arg(long)]
    viewpoint: Option<String>,

    /// Override the candidate video directory
    #[arg(long, value_name = "DIR")]
    candidates: Option<PathBuf>,

    /// Override the scene capture directory (intrinsics, depth image)
    #[arg(long, value_name = "DIR")]
    capture_dir: Option<PathBuf>,

    /// Override the dataset root
    #[arg(long, value_name = "DIR")]
    dataset_root: Option<PathBuf>,

    /// Target object class, as a COCO name or numeric id
    #[arg(long, value_name = "CLASS")]
    target_class: Option<String>,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write a daily-rolling log file into this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without processing videos")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Check the dataset for incomplete samples and manifest drift, then exit
    #[arg(long)]
    audit: bool,

    /// Run the gates only; nothing is normalized, committed or deleted
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Handle special modes that don't require logging
    if args.print_config {
        match print_default_config() {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("Failed to render default configuration: {:#}", e);
                std::process::exit(EXIT_FATAL);
            }
        }
    }

    let guard = match init_logging(&args) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            std::process::exit(EXIT_FATAL);
        }
    };

    let exit_code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            EXIT_FATAL
        }
    };

    info!("vidcurate exited with code: {}", exit_code);
    // Flush the file writer before exiting
    drop(guard);
    std::process::exit(exit_code);
}

async fn run(args: Args) -> Result<i32> {
    info!("Starting vidcurate v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = CurationConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;
    if let Some(dir) = &args.candidates {
        config.paths.candidate_dir = dir.to_string_lossy().to_string();
    }
    if let Some(dir) = &args.capture_dir {
        config.paths.capture_dir = dir.to_string_lossy().to_string();
    }
    if let Some(dir) = &args.dataset_root {
        config.paths.dataset_root = dir.to_string_lossy().to_string();
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        if args.validate_config {
            eprintln!("✗ Configuration validation failed: {}", e);
        }
        return Ok(EXIT_FATAL);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(0);
    }

    if args.audit {
        return audit(&config).await;
    }

    let (Some(object), Some(viewpoint)) = (&args.object, &args.viewpoint) else {
        bail!("--object and --viewpoint are required to run a batch");
    };

    let detector = CommandDetector::from_config(&config.detector)
        .context("A detector program is required (detector.program)")?;
    let mut request = BatchRequest::from_config(&config, object, viewpoint);
    request.target_class = args
        .target_class
        .as_deref()
        .map(str::parse::<TargetClass>)
        .transpose()?;
    request.dry_run = args.dry_run;

    let pipeline = CurationPipeline::from_config(config, Arc::new(detector))?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight candidates");
            signal_token.cancel();
        }
    });

    let report = pipeline.run_batch(&request, cancel).await?;

    println!(
        "{}_{}: {} candidate(s), {} accepted, {} rejected, {} committed, {} failed",
        report.object,
        report.viewpoint,
        report.total,
        report.accepted,
        report.rejected,
        report.committed,
        report.failed
    );
    for outcome in report.outcomes.iter().filter(|o| !o.reasons.is_empty()) {
        println!("  {}: {}", outcome.video.display(), outcome.reasons.join("; "));
    }

    Ok(if report.all_succeeded { 0 } else { EXIT_NEED_RETRY })
}

async fn audit(config: &CurationConfig) -> Result<i32> {
    let naming = FrameNaming::new(
        config.normalize.frame_prefix.clone(),
        config.normalize.index_width as usize,
    );
    let indexer = DatasetIndexer::open(
        &config.dataset_root(),
        config.dataset.clone(),
        naming,
        config.target_length(),
    )
    .await?;

    let report = indexer.audit().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.is_clean() {
        info!("Dataset audit clean: {} sample(s)", report.samples);
        Ok(0)
    } else {
        warn!("Dataset audit found problems");
        Ok(EXIT_NEED_RETRY)
    }
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vidcurate={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "vidcurate.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# vidcurate configuration file");
    println!("# This is the default configuration with all available options.");
    println!("# Environment overrides: VIDCURATE_<SECTION>__<KEY>, e.g. VIDCURATE_MOTION__THRESHOLD");
    println!();
    println!("{}", toml::to_string_pretty(&CurationConfig::default())?);
    Ok(())
}
