use serde::{Deserialize, Serialize};

/// Cumulative run counters, reported at per-operation granularity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub bytes: u64,
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: &Progress);
    fn complete(&self, progress: &Progress);
}

/// Reporter that discards everything. Used by tests and library callers
/// that do not surface progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn report(&self, _progress: &Progress) {}
    fn complete(&self, _progress: &Progress) {}
}
