use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tempfile::TempDir;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 2000;

/// Optional settings, from a JSON config file or from command-line flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    pub poll_interval_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub grace_period_ms: Option<u64>,
    pub serial_out: Option<PathBuf>,
}

impl RunnerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config `{}`", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid config `{}`", path.display()))
    }

    /// Layer `overrides` on top of `self`; set fields in `overrides` win.
    pub fn merge(self, overrides: RunnerConfig) -> RunnerConfig {
        RunnerConfig {
            poll_interval_ms: overrides.poll_interval_ms.or(self.poll_interval_ms),
            timeout_secs: overrides.timeout_secs.or(self.timeout_secs),
            grace_period_ms: overrides.grace_period_ms.or(self.grace_period_ms),
            serial_out: overrides.serial_out.or(self.serial_out),
        }
    }
}

/// Everything one supervised run needs. Built once, never mutated.
#[derive(Debug)]
pub struct TestInvocation {
    pub emulator: PathBuf,
    pub test_image: PathBuf,
    pub serial_out: PathBuf,
    pub poll_interval: Duration,
    pub deadline: Duration,
    pub grace_period: Duration,
    /// Private directory holding a default `serial_out`; deleted on drop.
    pub scratch_dir: Option<TempDir>,
}

impl TestInvocation {
    pub fn new(emulator: PathBuf, test_image: PathBuf, config: &RunnerConfig) -> Result<Self> {
        let poll_interval_ms = config.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        let timeout_secs = config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if poll_interval_ms == 0 {
            bail!("poll interval must be greater than zero");
        }
        if timeout_secs == 0 {
            bail!("timeout must be greater than zero");
        }

        let (serial_out, scratch_dir) = match &config.serial_out {
            Some(path) => (path.clone(), None),
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("emu-test-runner-")
                    .tempdir()
                    .context("failed to create scratch directory for serial output")?;
                (dir.path().join("serial.out"), Some(dir))
            }
        };

        Ok(Self {
            emulator,
            test_image,
            serial_out,
            poll_interval: Duration::from_millis(poll_interval_ms),
            deadline: Duration::from_secs(timeout_secs),
            grace_period: Duration::from_millis(
                config.grace_period_ms.unwrap_or(DEFAULT_GRACE_PERIOD_MS),
            ),
            scratch_dir,
        })
    }
}
