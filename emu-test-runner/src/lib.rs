//! Supervise an emulator running a self-checking test ROM and turn its
//! serial output into a pass/fail exit code.

pub mod artifact;
pub mod classify;
pub mod config;
pub mod controller;
pub mod error;
pub mod report;
pub mod supervisor;

pub use config::{RunnerConfig, TestInvocation};
pub use controller::{run, RunReport, Verdict};
pub use error::{ArtifactError, DecodeError, LaunchError};
