use anyhow::{Context, Result};
use clap::Parser;
use findcount::{
    config::parse_pool_size, CancelSignal, ConfigOverrides, CountConfig, EncodingMode,
    ErrorPolicy, SourceKind, SubstringCounter,
};
use std::{path::PathBuf, process::ExitCode, time::Duration};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Count substring occurrences in files or URLs listed one per line on stdin
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data source type (url|file)
    #[arg(short = 't', long = "type")]
    source_type: Option<SourceKind>,

    /// Substring to count
    #[arg(short, long)]
    substring: Option<String>,

    /// Execution time limit (e.g. 30s, 1m 30s)
    #[arg(short, long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    /// Maximum number of targets fetched at once (default: CPU cores)
    #[arg(short = 'j', long, allow_negative_numbers = true)]
    pool_size: Option<i64>,

    /// Which error to report when several targets fail (first|last)
    #[arg(long)]
    error_policy: Option<ErrorPolicy>,

    /// How to handle invalid UTF-8 in a source (failfast|lossy)
    #[arg(long)]
    encoding: Option<EncodingMode>,

    /// Configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = runtime.block_on(async {
        match run(cli).await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                ExitCode::FAILURE
            }
        }
    });

    // Workers abandoned on cancellation and a blocked stdin read must not
    // hold the process open.
    runtime.shutdown_background();
    code
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let pool_size = cli.pool_size.map(parse_pool_size).transpose()?;

    let config = CountConfig::load_from(cli.config.as_deref())
        .context("failed to load configuration")?
        .merge_with_cli(ConfigOverrides {
            substring: cli.substring,
            source_type: cli.source_type,
            pool_size,
            time_limit: cli.duration,
            error_policy: cli.error_policy,
            encoding_mode: cli.encoding,
            log_level: cli.log_level,
        });

    init_logging(&config.log_level);
    debug!("Effective configuration: {:?}", config);

    let cancel = CancelSignal::new();
    cancel.arm_deadline(config.time_limit);
    cancel.arm_interrupt();

    let counter = SubstringCounter::from_config(&config);
    let mut stdout = tokio::io::stdout();
    let report = counter
        .count_total(&cancel, tokio::io::stdin(), &mut stdout)
        .await;

    stdout
        .write_all(format!("Total: {}\n", report.total).as_bytes())
        .await?;
    stdout.flush().await?;

    match report.into_result() {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("Error: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
