use anyhow::Result;
use clap::Parser;
use maude_acquire::batch::DEFAULT_OUTPUT_DIR;
use maude_acquire::detect::{auto_detect_input, CANDIDATE_PATTERNS};
use maude_acquire::{BatchOptions, BatchOutput, ClientConfig, FdaClient};
use maude_model::ExtractError;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "maude")]
#[command(about = "Extract FDA MAUDE adverse-event records for a list of MAUDE URLs")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_HASH"), ")"))]
#[command(after_help = "\
Examples:
  maude                               Auto-detect a URL file in the current directory
  maude my_urls.txt                   Use a specific file
  maude my_urls.txt -o results        Custom output directory
  maude my_urls.txt --delay 0.5       Fixed delay between requests")]
struct Cli {
    /// Text file with one FDA MAUDE detail URL per line (default: auto-detect in current directory)
    input_file: Option<PathBuf>,

    /// Output directory for extracted data
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    output: PathBuf,

    /// Delay in seconds between API requests (0 = adaptive, starting with no delay)
    #[arg(long, default_value_t = 0.0, value_parser = parse_delay)]
    delay: f64,

    /// Only process the first N records
    #[arg(long)]
    limit: Option<usize>,

    /// Log progress and outcome for every record
    #[arg(short, long)]
    verbose: bool,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "info", value_enum)]
    log_level: LogLevel,

    /// Use UTC timestamps instead of local time
    #[arg(long, global = true)]
    utc: bool,
}

#[derive(Clone, clap::ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = tokio::select! {
        result = run(&cli) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Extraction interrupted by user");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => {
            tracing::info!("Extraction completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    // Keep the HTTP stack quiet at debug/trace
    let level = match cli.log_level {
        LogLevel::Error => "error",
        LogLevel::Warn  => "warn",
        LogLevel::Info  => "info",
        LogLevel::Debug => "debug,hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn",
        LogLevel::Trace => "trace,hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    // Timestamp format: 2026-02-14 19:44:09.123 -08:00
    let time_format = "%Y-%m-%d %H:%M:%S%.3f %:z";

    if cli.utc {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_timer(tracing_subscriber::fmt::time::ChronoUtc::new(time_format.to_string()))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(time_format.to_string()))
            .init();
    }
}

/// Seconds between requests: finite and non-negative.
fn parse_delay(raw: &str) -> Result<f64, String> {
    let secs: f64 = raw.parse().map_err(|e| format!("invalid number '{raw}': {e}"))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("delay must be a finite, non-negative number of seconds, got '{raw}'"));
    }
    Ok(secs)
}

/// The explicit input file if it exists, otherwise a batch links file detected in `cwd`.
fn resolve_input(explicit: Option<&Path>, cwd: &Path) -> Result<PathBuf> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(ExtractError::InputNotFound(path.to_path_buf()).into());
            }
            Ok(path.to_path_buf())
        }
        None => {
            let detected = auto_detect_input(cwd).ok_or_else(|| {
                ExtractError::NoInputDetected(cwd.to_path_buf(), CANDIDATE_PATTERNS.to_vec())
            })?;
            tracing::info!(path = %detected.display(), "Auto-detected FDA MAUDE file");
            Ok(detected)
        }
    }
}

fn build_client(delay: f64) -> Result<FdaClient> {
    let mut client = FdaClient::new(ClientConfig::default())?;
    if delay != 0.0 {
        client = client.with_delay(delay);
        tracing::info!(delay_secs = delay, "Using custom delay between requests");
    } else {
        tracing::info!(
            delay_secs = client.request_delay().as_secs_f64(),
            "Using adaptive delay, adjusted on rate limiting"
        );
    }
    Ok(client)
}

/// A run that retrieved nothing counts as failed.
fn check_extracted(output: &BatchOutput) -> Result<()> {
    anyhow::ensure!(!output.records.is_empty(), ExtractError::NothingExtracted);
    Ok(())
}

async fn run(cli: &Cli) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let input = resolve_input(cli.input_file.as_deref(), &cwd)?;
    let mut client = build_client(cli.delay)?;

    let options = BatchOptions {
        output_dir: cli.output.clone(),
        limit: cli.limit,
        verbose: cli.verbose,
    };

    tracing::info!(input = %input.display(), output = %options.output_dir.display(), "Extracting MAUDE records");
    let result = maude_acquire::extract_batch(&mut client, &input, &options).await?;

    check_extracted(&result)
}
