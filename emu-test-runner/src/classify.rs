//! Marker search over the decoded serial transcript.

/// Literal the test ROM prints when any check fails.
pub const FAILED_MARKER: &str = "Failed";
/// Literal the test ROM prints once every check has passed.
pub const PASSED_MARKER: &str = "Passed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Pending,
    Passed,
    Failed,
}

/// Classify the full transcript seen so far.
///
/// `Failed` wins over `Passed` when both markers are present: a ROM that
/// reports a failure anywhere in its output has failed, whatever it prints
/// afterwards. Matching is exact and case-sensitive.
pub fn classify(text: &str) -> Classification {
    if text.contains(FAILED_MARKER) {
        Classification::Failed
    } else if text.contains(PASSED_MARKER) {
        Classification::Passed
    } else {
        Classification::Pending
    }
}
