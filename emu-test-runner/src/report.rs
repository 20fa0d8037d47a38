use std::io::{self, Write};

use crate::controller::RunReport;

pub const SEPARATOR: &str = "-----------------------------";

/// Write the human-readable transcript: serial output, a separator, the
/// reason for a non-pass, and a final result line.
pub fn render(report: &RunReport, out: &mut impl Write) -> io::Result<()> {
    out.write_all(report.transcript.as_bytes())?;
    if !report.transcript.is_empty() && !report.transcript.ends_with('\n') {
        writeln!(out)?;
    }
    writeln!(out, "{SEPARATOR}")?;
    if let Some(diagnostic) = &report.diagnostic {
        writeln!(out, "{diagnostic}")?;
    }
    if report.verdict.is_pass() {
        writeln!(out, "Test Passed")
    } else {
        writeln!(out, "Test Failed")
    }
}
