//! Progress reporting for scan jobs
//!
//! The pipeline reports a percentage at each stage boundary; the queue
//! turns that into job status. Callers with no status to keep pass
//! [`NoOpProgress`].

/// Sink for stage progress, 0 to 100
pub trait ProgressReporter: Send + Sync {
    fn report(&self, percent: u8);
}

/// Progress reporter that does nothing
#[derive(Debug, Clone, Copy)]
pub struct NoOpProgress;

impl ProgressReporter for NoOpProgress {
    #[inline(always)]
    fn report(&self, _percent: u8) {}
}

/// Stage boundaries reported by the scanner
pub mod stage {
    pub const STARTED: u8 = 5;
    pub const FETCHED: u8 = 40;
    pub const EXTRACTED: u8 = 50;
    pub const DOWNLOADED: u8 = 90;
    pub const DONE: u8 = 100;
}
