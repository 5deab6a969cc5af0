//! Getter methods for `ScanConfig`

use std::path::PathBuf;
use std::time::Duration;

use super::types::ScanConfig;

impl ScanConfig {
    #[must_use]
    pub fn storage_dir(&self) -> &PathBuf {
        &self.storage_dir
    }

    #[must_use]
    pub fn min_width(&self) -> u32 {
        self.min_width
    }

    #[must_use]
    pub fn min_height(&self) -> u32 {
        self.min_height
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs
    }

    #[must_use]
    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }

    #[must_use]
    pub fn max_image_bytes(&self) -> u64 {
        self.max_image_bytes
    }

    #[must_use]
    pub fn default_concurrency(&self) -> usize {
        self.default_concurrency
    }

    #[must_use]
    pub fn static_attempts(&self) -> u32 {
        self.static_attempts
    }

    #[must_use]
    pub fn render_attempts(&self) -> u32 {
        self.render_attempts
    }

    /// Inclusive millisecond window for the jittered retry delay
    #[must_use]
    pub fn retry_jitter_ms(&self) -> (u64, u64) {
        (self.retry_jitter_min_ms, self.retry_jitter_max_ms)
    }

    #[must_use]
    pub fn always_render(&self) -> bool {
        self.always_render
    }

    #[must_use]
    pub fn render_domains(&self) -> &[String] {
        &self.render_domains
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    #[must_use]
    pub fn cache_max_bytes(&self) -> u64 {
        self.cache_max_bytes
    }

    #[must_use]
    pub fn file_ttl(&self) -> Duration {
        Duration::from_secs(self.file_ttl_secs)
    }

    #[must_use]
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    #[must_use]
    pub fn job_attempts(&self) -> u32 {
        self.job_attempts
    }

    #[must_use]
    pub fn job_backoff(&self) -> Duration {
        Duration::from_millis(self.job_backoff_ms)
    }

    #[must_use]
    pub fn queue_workers(&self) -> usize {
        self.queue_workers
    }
}
