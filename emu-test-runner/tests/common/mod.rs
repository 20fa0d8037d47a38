//! Fake emulators for the integration tests.
//!
//! The "emulator" is `sh` and the "test image" is a script, so the runner
//! invokes `sh <script> --serial-out <path> --headless` and the script sees
//! the serial output path as `$2`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use emu_test_runner::TestInvocation;
use tempfile::TempDir;

pub struct FakeRom {
    pub dir: TempDir,
    pub invocation: TestInvocation,
}

impl FakeRom {
    /// `body` may use `{dir}` for the scratch directory path.
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("rom.sh");
        let body = body.replace("{dir}", &dir.path().display().to_string());
        std::fs::write(&script, body).unwrap();

        let invocation = TestInvocation {
            emulator: PathBuf::from("sh"),
            test_image: script,
            serial_out: dir.path().join("serial.out"),
            poll_interval: Duration::from_millis(50),
            deadline: Duration::from_secs(10),
            grace_period: Duration::from_secs(2),
            scratch_dir: None,
        };
        Self { dir, invocation }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// Pid the script wrote to `file` with `echo $$ > {dir}/<file>`.
pub fn read_pid(path: &Path) -> i32 {
    std::fs::read_to_string(path).unwrap().trim().parse().unwrap()
}

/// A killed zombie still answers `kill(pid, 0)`, so it counts as gone.
pub fn process_alive(pid: i32) -> bool {
    if unsafe { libc::kill(pid, 0) } != 0 {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .map_or(true, |(_, rest)| !rest.trim_start().starts_with('Z')),
        Err(_) => !cfg!(target_os = "linux"),
    }
}

/// Orphans are reaped by init some time after they die.
pub async fn wait_until_gone(pid: i32) -> bool {
    for _ in 0..100 {
        if !process_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
