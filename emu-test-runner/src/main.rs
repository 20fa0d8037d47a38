use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use emu_test_runner::{report, RunnerConfig, TestInvocation};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "emu-test-runner", about = "Run a test ROM under the emulator and report pass/fail")]
struct Cli {
    /// Path to the emulator executable (looked up on PATH if bare)
    emulator: PathBuf,

    /// Path to the test ROM image
    test_image: PathBuf,

    /// File the emulator writes serial output to [default: temp file]
    #[arg(long)]
    serial_out: Option<PathBuf>,

    /// Interval between polls of the serial output, in milliseconds [default: 250]
    #[arg(short = 'i', long)]
    poll_interval_ms: Option<u64>,

    /// Timeout in seconds [default: 30]
    #[arg(short, long)]
    timeout: Option<u64>,

    /// How long to wait after interrupting the emulator before killing it [default: 2000]
    #[arg(long)]
    grace_period_ms: Option<u64>,

    /// JSON config file supplying defaults for the options above
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> RunnerConfig {
        RunnerConfig {
            poll_interval_ms: self.poll_interval_ms,
            timeout_secs: self.timeout,
            grace_period_ms: self.grace_period_ms,
            serial_out: self.serial_out.clone(),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let file_config = match &cli.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };
    let config = file_config.merge(cli.overrides());
    let invocation = TestInvocation::new(cli.emulator, cli.test_image, &config)?;

    tracing::info!(
        emulator = %invocation.emulator.display(),
        image = %invocation.test_image.display(),
        timeout_secs = invocation.deadline.as_secs(),
        "Launching emulator test"
    );

    // The emulator has its own process group, so a terminal Ctrl-C only
    // reaches us; dropping the run kills the group.
    let outcome = tokio::select! {
        outcome = emu_test_runner::run(&invocation) => {
            outcome.context("failed to launch emulator")?
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, stopping emulator");
            return Ok(ExitCode::FAILURE);
        }
    };

    report::render(&outcome, &mut std::io::stdout().lock())?;
    Ok(ExitCode::from(outcome.verdict.exit_code()))
}
