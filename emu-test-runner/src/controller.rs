//! The supervision loop.
//!
//! One cooperative loop on the current task: each tick checks the deadline
//! before touching the child or the filesystem, then the child's status,
//! then the serial output. The sleep between ticks is the only yield point.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::artifact;
use crate::classify::{classify, Classification};
use crate::config::TestInvocation;
use crate::error::{ArtifactError, LaunchError};
use crate::supervisor::{ChildExit, Supervisor, Termination};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed,
    TimedOut,
    /// The emulator exited non-zero or by signal before a result.
    CrashExitNonzero,
    /// The serial output was not 7-bit text.
    Undecodable,
    /// The emulator exited cleanly without printing a result.
    CrashNoResult,
}

impl Verdict {
    pub fn is_pass(self) -> bool {
        self == Verdict::Passed
    }

    pub fn exit_code(self) -> u8 {
        if self.is_pass() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Passed => "passed",
            Verdict::Failed => "failed",
            Verdict::TimedOut => "timed out",
            Verdict::CrashExitNonzero => "abnormal exit",
            Verdict::Undecodable => "undecodable output",
            Verdict::CrashNoResult => "no result",
        })
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub verdict: Verdict,
    /// Last successfully decoded serial output.
    pub transcript: String,
    /// One-line reason for any verdict other than a pass.
    pub diagnostic: Option<String>,
    /// How the emulator ended, if it was observed.
    pub exit: Option<ChildExit>,
    pub elapsed: Duration,
    pub ticks: u32,
}

/// Launch the emulator and supervise it until a verdict is reached.
///
/// Only launch failures are returned as errors; every other outcome is a
/// [`RunReport`]. The emulator has exited or been stopped by the time this
/// returns.
pub async fn run(invocation: &TestInvocation) -> Result<RunReport, LaunchError> {
    artifact::reset(&invocation.serial_out)
        .await
        .map_err(|source| LaunchError::ArtifactReset {
            path: invocation.serial_out.clone(),
            source,
        })?;

    let mut supervisor = Supervisor::launch(invocation).await?;
    Ok(supervise(invocation, &mut supervisor).await)
}

struct Outcome {
    verdict: Verdict,
    diagnostic: Option<String>,
    exit: Option<ChildExit>,
}

impl Outcome {
    fn new(verdict: Verdict, diagnostic: Option<String>, exit: Option<ChildExit>) -> Self {
        Self {
            verdict,
            diagnostic,
            exit,
        }
    }
}

async fn supervise(invocation: &TestInvocation, supervisor: &mut Supervisor) -> RunReport {
    let started = Instant::now();
    let mut transcript = String::new();
    let mut ticks = 0u32;

    let outcome = loop {
        ticks += 1;

        let elapsed = started.elapsed();
        if elapsed >= invocation.deadline {
            break Outcome::new(
                Verdict::TimedOut,
                Some(format!(
                    "timed out after {:.1}s without a test result",
                    invocation.deadline.as_secs_f64()
                )),
                None,
            );
        }

        let exit = match supervisor.poll() {
            Ok(exit) => exit,
            Err(e) => {
                break Outcome::new(
                    Verdict::CrashExitNonzero,
                    Some(format!("could not query emulator status: {e}")),
                    None,
                )
            }
        };
        if let Some(exit) = exit.filter(|exit| !exit.success()) {
            break Outcome::new(
                Verdict::CrashExitNonzero,
                Some(format!("emulator exited abnormally with {exit}")),
                Some(exit),
            );
        }

        match artifact::read(&invocation.serial_out).await {
            Ok(text) => transcript = text,
            Err(ArtifactError::Decode(e)) => {
                break Outcome::new(
                    Verdict::Undecodable,
                    Some(format!("{e}; raw bytes: {}", e.raw_escaped())),
                    exit,
                )
            }
            Err(ArtifactError::Io { path, source }) => {
                warn!(path = %path.display(), error = %source, "Failed to read serial output");
            }
        }

        trace!(
            tick = ticks,
            elapsed_ms = elapsed.as_millis() as u64,
            bytes = transcript.len(),
            "Polled serial output"
        );

        match classify(&transcript) {
            Classification::Passed => break Outcome::new(Verdict::Passed, None, exit),
            Classification::Failed => {
                break Outcome::new(
                    Verdict::Failed,
                    Some("test image reported failure".to_string()),
                    exit,
                )
            }
            Classification::Pending => {}
        }

        if let Some(exit) = exit {
            break Outcome::new(
                Verdict::CrashNoResult,
                Some("emulator exited without writing test result".to_string()),
                Some(exit),
            );
        }

        tokio::time::sleep(invocation.poll_interval).await;
    };

    // A finished test ROM usually spins forever, so stop it on every path.
    let exit = match supervisor.terminate(invocation.grace_period).await {
        Termination::AlreadyExited(exit) => Some(exit),
        Termination::Interrupted(exit) => {
            debug!(%exit, "Emulator stopped after interrupt");
            Some(exit)
        }
        Termination::Killed(exit) => {
            warn!(%exit, "Emulator did not stop after interrupt and was killed");
            Some(exit)
        }
        Termination::Failed(e) => {
            warn!(error = %e, "Failed to terminate emulator");
            None
        }
    };

    let elapsed = started.elapsed();
    info!(
        verdict = %outcome.verdict,
        elapsed_ms = elapsed.as_millis() as u64,
        ticks,
        "Test run finished"
    );

    RunReport {
        verdict: outcome.verdict,
        transcript,
        diagnostic: outcome.diagnostic,
        exit: outcome.exit.or(exit),
        elapsed,
        ticks,
    }
}
