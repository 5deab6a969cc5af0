//! In-process priority job queue
//!
//! Jobs wait in a binary heap (higher priority first, FIFO within a
//! priority) and are drained by a fixed set of worker tasks. Each job runs
//! the handler up to `max_attempts` times with exponential backoff between
//! attempts. Finished jobs stay queryable.

mod types;

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::ScanError;
use crate::pipeline::{ProgressReporter, ScanRequest, ScanResult};

pub use types::{JobState, JobStatus};
use types::{JobRecord, QueuedJob};

/// Boxed future returned by [`JobHandler::handle`]
pub type JobFuture<'a> = Pin<Box<dyn Future<Output = Result<ScanResult, ScanError>> + Send + 'a>>;

/// The work a queued job performs
pub trait JobHandler: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        request: &'a ScanRequest,
        progress: &'a dyn ProgressReporter,
    ) -> JobFuture<'a>;
}

/// Retry policy for whole-job attempts
#[derive(Debug, Clone, Copy)]
pub struct JobRetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl JobRetryPolicy {
    /// Delay before attempt `attempt + 1`: `base * 2^(attempt-1)`
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(1u32 << exponent)
    }
}

struct QueueInner {
    heap: Mutex<BinaryHeap<QueuedJob>>,
    jobs: DashMap<String, JobRecord>,
    notify: Notify,
    seq: AtomicU64,
    policy: JobRetryPolicy,
}

/// Writes handler progress into the job record
struct JobProgress<'a> {
    inner: &'a QueueInner,
    id: &'a str,
}

impl ProgressReporter for JobProgress<'_> {
    fn report(&self, percent: u8) {
        if let Some(mut record) = self.inner.jobs.get_mut(self.id) {
            let current = record.progress;
            record.progress = percent.min(100).max(current);
        }
    }
}

/// Handle to a running queue; cheap to clone
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl JobQueue {
    /// Spawn `workers` tasks draining the queue through `handler`
    pub fn start(handler: Arc<dyn JobHandler>, workers: usize, policy: JobRetryPolicy) -> Self {
        let inner = Arc::new(QueueInner {
            heap: Mutex::new(BinaryHeap::new()),
            jobs: DashMap::new(),
            notify: Notify::new(),
            seq: AtomicU64::new(0),
            policy,
        });

        let handles = (0..workers.max(1))
            .map(|worker_id| {
                let inner = Arc::clone(&inner);
                let handler = Arc::clone(&handler);
                tokio::spawn(async move { worker_loop(worker_id, inner, handler).await })
            })
            .collect();

        Self {
            inner,
            workers: Arc::new(Mutex::new(handles)),
        }
    }

    /// Enqueue a request; returns its job id
    pub fn add(&self, request: ScanRequest) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let priority = request.options.priority;
        self.inner.jobs.insert(id.clone(), JobRecord::new(request));

        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        self.inner.heap.lock().push(QueuedJob {
            priority,
            seq,
            id: id.clone(),
        });
        self.inner.notify.notify_one();

        log::debug!("Queued job {id} (priority {priority})");
        id
    }

    #[must_use]
    pub fn status(&self, id: &str) -> JobStatus {
        self.inner
            .jobs
            .get(id)
            .map_or_else(|| JobStatus::not_found(id), |record| record.status(id))
    }

    /// Jobs still waiting for a worker
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.heap.lock().len()
    }

    /// Abort every worker; queued jobs stay queued
    pub fn shutdown(&self) {
        for handle in self.workers.lock().drain(..) {
            handle.abort();
        }
    }
}

async fn worker_loop(worker_id: usize, inner: Arc<QueueInner>, handler: Arc<dyn JobHandler>) {
    log::debug!("Queue worker {worker_id} started");
    loop {
        let next = inner.heap.lock().pop();
        match next {
            Some(job) => run_job(&inner, handler.as_ref(), &job.id).await,
            None => inner.notify.notified().await,
        }
    }
}

async fn run_job(inner: &QueueInner, handler: &dyn JobHandler, id: &str) {
    let request = match inner.jobs.get_mut(id) {
        Some(mut record) => {
            record.state = JobState::Active;
            record.request.clone()
        }
        None => return,
    };
    let progress = JobProgress { inner, id };
    let policy = inner.policy;

    for attempt in 1..=policy.max_attempts.max(1) {
        if let Some(mut record) = inner.jobs.get_mut(id) {
            record.attempts = attempt;
        }

        match handler.handle(&request, &progress).await {
            Ok(result) => {
                if let Some(mut record) = inner.jobs.get_mut(id) {
                    record.state = JobState::Completed;
                    record.progress = 100;
                    record.result = Some(result);
                    record.error = None;
                    record.finished_at = Some(chrono::Utc::now());
                }
                log::info!("Job {id} completed on attempt {attempt}");
                return;
            }
            Err(e) if attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                log::warn!(
                    "Job {id} attempt {attempt}/{} failed: {e}; retrying in {delay:?}",
                    policy.max_attempts
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                log::error!("Job {id} failed after {attempt} attempts: {e}");
                if let Some(mut record) = inner.jobs.get_mut(id) {
                    record.state = JobState::Failed;
                    record.error = Some(e.public_message());
                    record.finished_at = Some(chrono::Utc::now());
                }
                return;
            }
        }
    }
}
