//! Ownership of the emulator child process.
//!
//! The emulator runs in its own process group. Dropping the [`Supervisor`]
//! kills that group, so neither the emulator nor anything it forked can
//! outlive it, even if the controller bails out early or panics.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::TestInvocation;
use crate::error::LaunchError;

/// How a finished emulator process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    pub code: Option<i32>,
    /// Terminating signal, on Unix.
    pub signal: Option<i32>,
}

impl ChildExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ChildExit {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ChildExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown status"),
        }
    }
}

/// Result of [`Supervisor::terminate`].
#[derive(Debug)]
pub enum Termination {
    /// The child had exited before we asked it to stop.
    AlreadyExited(ChildExit),
    /// The child exited within the grace period after the interrupt.
    Interrupted(ChildExit),
    /// The grace period ran out and the child was killed.
    Killed(ChildExit),
    Failed(io::Error),
}

pub struct Supervisor {
    child: Child,
    emulator: PathBuf,
    /// Process group holding the emulator and anything it forks. Cleared
    /// once the group has been swept.
    pgid: Option<u32>,
}

impl Supervisor {
    /// Spawn `emulator <image> --serial-out <artifact> --headless` as the
    /// leader of a new process group.
    pub async fn launch(invocation: &TestInvocation) -> Result<Self, LaunchError> {
        let emulator =
            which::which(&invocation.emulator).map_err(|source| LaunchError::EmulatorNotFound {
                path: invocation.emulator.clone(),
                source,
            })?;

        let is_file = tokio::fs::metadata(&invocation.test_image)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(LaunchError::TestImageMissing(invocation.test_image.clone()));
        }

        let mut command = Command::new(&emulator);
        command
            .arg(&invocation.test_image)
            .arg("--serial-out")
            .arg(&invocation.serial_out)
            .arg("--headless")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|source| LaunchError::Spawn {
            path: emulator.clone(),
            source,
        })?;
        let pgid = child.id();

        info!(
            emulator = %emulator.display(),
            image = %invocation.test_image.display(),
            serial_out = %invocation.serial_out.display(),
            pid = ?pgid,
            "Launched emulator"
        );

        Ok(Self {
            child,
            emulator,
            pgid,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Non-blocking status check: `None` while the emulator is still running.
    pub fn poll(&mut self) -> io::Result<Option<ChildExit>> {
        Ok(self.child.try_wait()?.map(ChildExit::from))
    }

    /// Interrupt the emulator's process group, then kill it if the emulator
    /// is still alive after `grace`. The emulator itself is left alone if it
    /// has already exited. On every path, whatever is left of the group is
    /// killed afterwards, and the emulator is reaped unless this returns
    /// [`Termination::Failed`].
    pub async fn terminate(&mut self, grace: Duration) -> Termination {
        let termination = self.stop(grace).await;
        self.sweep();
        termination
    }

    async fn stop(&mut self, grace: Duration) -> Termination {
        match self.poll() {
            Ok(Some(exit)) => return Termination::AlreadyExited(exit),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to query emulator status before interrupt"),
        }

        if let Err(e) = self.interrupt() {
            warn!(error = %e, "Failed to interrupt emulator");
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => Termination::Interrupted(status.into()),
            Ok(Err(e)) => Termination::Failed(e),
            Err(_) => {
                debug!(
                    emulator = %self.emulator.display(),
                    grace_ms = grace.as_millis() as u64,
                    "Emulator ignored interrupt, killing"
                );
                #[cfg(unix)]
                if let Some(pgid) = self.pgid {
                    if let Err(e) = signal_group(pgid, libc::SIGKILL) {
                        warn!(pgid, error = %e, "Failed to kill emulator process group");
                    }
                }
                if let Err(e) = self.child.kill().await {
                    return Termination::Failed(e);
                }
                match self.poll() {
                    Ok(Some(exit)) => Termination::Killed(exit),
                    Ok(None) => Termination::Failed(io::Error::new(
                        io::ErrorKind::Other,
                        "emulator still running after kill",
                    )),
                    Err(e) => Termination::Failed(e),
                }
            }
        }
    }

    #[cfg(unix)]
    fn interrupt(&mut self) -> io::Result<()> {
        match self.pgid {
            Some(pgid) => signal_group(pgid, libc::SIGINT),
            None => Ok(()),
        }
    }

    #[cfg(not(unix))]
    fn interrupt(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    /// Kill any helpers the emulator left behind in its process group.
    fn sweep(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        #[cfg(unix)]
        if let Err(e) = signal_group(pgid, libc::SIGKILL) {
            warn!(pgid, error = %e, "Failed to kill emulator process group");
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.sweep();
    }
}

/// Send `signal` to every process in group `pgid`. A group with no
/// processes left is not an error.
#[cfg(unix)]
fn signal_group(pgid: u32, signal: libc::c_int) -> io::Result<()> {
    let rc = unsafe { libc::kill(-(pgid as libc::pid_t), signal) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}
