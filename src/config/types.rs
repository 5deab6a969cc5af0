//! Core configuration type for image scans
//!
//! One `ScanConfig` value is built at startup and handed to every component
//! constructor; nothing reads the environment after that.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::{
    DEFAULT_CACHE_MAX_BYTES, DEFAULT_CACHE_TTL_SECS, DEFAULT_DOWNLOAD_CONCURRENCY,
    DEFAULT_FILE_TTL_SECS, DEFAULT_IMAGE_TIMEOUT_SECS, DEFAULT_JOB_ATTEMPTS,
    DEFAULT_JOB_BACKOFF_MS, DEFAULT_MAX_IMAGE_BYTES, DEFAULT_MIN_IMAGE_HEIGHT,
    DEFAULT_MIN_IMAGE_WIDTH, DEFAULT_PURGE_INTERVAL_SECS, DEFAULT_QUEUE_WORKERS,
    DEFAULT_RENDER_ATTEMPTS, DEFAULT_RENDER_DOMAINS, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_RETRY_JITTER_MAX_MS, DEFAULT_RETRY_JITTER_MIN_MS, DEFAULT_STATIC_ATTEMPTS,
};

/// Main configuration struct for image scan operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Base directory of the durable store.
    ///
    /// **INVARIANT:** Always an absolute path (normalized in builder).
    pub(crate) storage_dir: PathBuf,

    /// Images narrower or shorter than this are rejected
    pub(crate) min_width: u32,
    pub(crate) min_height: u32,

    /// Bound on one static GET or one render navigation
    pub(crate) request_timeout_secs: u64,
    /// Bound on one image download
    pub(crate) image_timeout_secs: u64,
    pub(crate) max_image_bytes: u64,
    pub(crate) default_concurrency: usize,

    pub(crate) static_attempts: u32,
    pub(crate) render_attempts: u32,
    pub(crate) retry_jitter_min_ms: u64,
    pub(crate) retry_jitter_max_ms: u64,

    /// Skip the static fetcher for every host
    pub(crate) always_render: bool,
    /// Hostname substrings that require the render fetcher
    pub(crate) render_domains: Vec<String>,
    pub(crate) headless: bool,

    pub(crate) cache_ttl_secs: u64,
    pub(crate) cache_max_bytes: u64,

    pub(crate) file_ttl_secs: u64,
    pub(crate) purge_interval_secs: u64,

    /// Whole-pipeline attempts per job
    pub(crate) job_attempts: u32,
    pub(crate) job_backoff_ms: u64,
    pub(crate) queue_workers: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::new(),
            min_width: DEFAULT_MIN_IMAGE_WIDTH,
            min_height: DEFAULT_MIN_IMAGE_HEIGHT,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            image_timeout_secs: DEFAULT_IMAGE_TIMEOUT_SECS,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            default_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            static_attempts: DEFAULT_STATIC_ATTEMPTS,
            render_attempts: DEFAULT_RENDER_ATTEMPTS,
            retry_jitter_min_ms: DEFAULT_RETRY_JITTER_MIN_MS,
            retry_jitter_max_ms: DEFAULT_RETRY_JITTER_MAX_MS,
            always_render: false,
            render_domains: DEFAULT_RENDER_DOMAINS
                .iter()
                .map(|d| (*d).to_string())
                .collect(),
            headless: true,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cache_max_bytes: DEFAULT_CACHE_MAX_BYTES,
            file_ttl_secs: DEFAULT_FILE_TTL_SECS,
            purge_interval_secs: DEFAULT_PURGE_INTERVAL_SECS,
            job_attempts: DEFAULT_JOB_ATTEMPTS,
            job_backoff_ms: DEFAULT_JOB_BACKOFF_MS,
            queue_workers: DEFAULT_QUEUE_WORKERS,
        }
    }
}
