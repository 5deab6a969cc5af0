//! Job bookkeeping types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::pipeline::{ScanRequest, ScanResult};

/// Lifecycle state of a job as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Active,
    Completed,
    Failed,
    /// No job with that id was ever submitted
    NotFound,
}

impl JobState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::NotFound)
    }
}

/// Snapshot of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub id: String,
    pub state: JobState,
    /// 0 to 100
    pub progress: u8,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ScanResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    #[must_use]
    pub fn not_found(id: &str) -> Self {
        Self {
            id: id.to_string(),
            state: JobState::NotFound,
            progress: 0,
            attempts: 0,
            result: None,
            error: None,
            created_at: None,
            finished_at: None,
        }
    }
}

/// Stored state of one job
#[derive(Debug, Clone)]
pub(crate) struct JobRecord {
    pub request: ScanRequest,
    pub state: JobState,
    pub progress: u8,
    pub attempts: u32,
    pub result: Option<ScanResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(request: ScanRequest) -> Self {
        Self {
            request,
            state: JobState::Queued,
            progress: 0,
            attempts: 0,
            result: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn status(&self, id: &str) -> JobStatus {
        JobStatus {
            id: id.to_string(),
            state: self.state,
            progress: self.progress,
            attempts: self.attempts,
            result: self.result.clone(),
            error: self.error.clone(),
            created_at: Some(self.created_at),
            finished_at: self.finished_at,
        }
    }
}

/// Heap entry: higher priority first, then submission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueuedJob {
    pub priority: i32,
    pub seq: u64,
    pub id: String,
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
