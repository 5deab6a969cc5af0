//! Builder methods available for all states
//!
//! This module contains methods that can be called on the builder
//! regardless of its current type state.

use super::builder::ScanConfigBuilder;

impl<State> ScanConfigBuilder<State> {
    #[must_use]
    pub fn min_dimensions(mut self, width: u32, height: u32) -> Self {
        self.config.min_width = width;
        self.config.min_height = height;
        self
    }

    #[must_use]
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn image_timeout_secs(mut self, secs: u64) -> Self {
        self.config.image_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn max_image_bytes(mut self, bytes: u64) -> Self {
        self.config.max_image_bytes = bytes;
        self
    }

    /// Downloads in flight per chunk when a request does not set its own limit
    #[must_use]
    pub fn default_concurrency(mut self, limit: usize) -> Self {
        self.config.default_concurrency = limit;
        self
    }

    /// Attempts per chain for the static and render fetchers
    #[must_use]
    pub fn fetch_attempts(mut self, static_attempts: u32, render_attempts: u32) -> Self {
        self.config.static_attempts = static_attempts;
        self.config.render_attempts = render_attempts;
        self
    }

    /// Window the randomized delay between fetch attempts is drawn from
    ///
    /// Tests pass `(0, 0)` to run retry chains without sleeping.
    #[must_use]
    pub fn retry_jitter_ms(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.config.retry_jitter_min_ms = min_ms;
        self.config.retry_jitter_max_ms = max_ms;
        self
    }

    #[must_use]
    pub fn always_render(mut self, always: bool) -> Self {
        self.config.always_render = always;
        self
    }

    /// Replace the list of hostname substrings that force rendering
    #[must_use]
    pub fn render_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.render_domains = domains
            .into_iter()
            .map(|d| d.into().trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        self
    }

    /// Set browser headless mode
    ///
    /// Headed mode is only honoured in debug builds; release builds force
    /// headless with a warning.
    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    #[must_use]
    pub fn cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.cache_ttl_secs = secs;
        self
    }

    #[must_use]
    pub fn cache_max_bytes(mut self, bytes: u64) -> Self {
        self.config.cache_max_bytes = bytes;
        self
    }

    #[must_use]
    pub fn file_ttl_secs(mut self, secs: u64) -> Self {
        self.config.file_ttl_secs = secs;
        self
    }

    #[must_use]
    pub fn purge_interval_secs(mut self, secs: u64) -> Self {
        self.config.purge_interval_secs = secs;
        self
    }

    /// Whole-pipeline retry policy for queued jobs
    #[must_use]
    pub fn job_retry(mut self, attempts: u32, backoff_ms: u64) -> Self {
        self.config.job_attempts = attempts;
        self.config.job_backoff_ms = backoff_ms;
        self
    }

    #[must_use]
    pub fn queue_workers(mut self, workers: usize) -> Self {
        self.config.queue_workers = workers;
        self
    }
}
