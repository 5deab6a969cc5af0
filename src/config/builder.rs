//! Type-safe builder for `ScanConfig` using the typestate pattern
//!
//! `build()` only exists once the storage directory has been provided.

use anyhow::{Result, anyhow};
use std::marker::PhantomData;
use std::path::PathBuf;

use super::types::ScanConfig;

// Type states for the builder
pub struct WithStorageDir;

pub struct ScanConfigBuilder<State = ()> {
    pub(crate) storage_dir: Option<PathBuf>,
    pub(crate) config: ScanConfig,
    pub(crate) _phantom: PhantomData<State>,
}

impl Default for ScanConfigBuilder<()> {
    fn default() -> Self {
        Self {
            storage_dir: None,
            config: ScanConfig::default(),
            _phantom: PhantomData,
        }
    }
}

impl ScanConfig {
    /// Create a builder for configuring a `ScanConfig` with a fluent interface
    #[must_use]
    pub fn builder() -> ScanConfigBuilder<()> {
        ScanConfigBuilder::default()
    }
}

impl ScanConfigBuilder<()> {
    pub fn storage_dir(self, dir: impl Into<PathBuf>) -> ScanConfigBuilder<WithStorageDir> {
        ScanConfigBuilder {
            storage_dir: Some(dir.into()),
            config: self.config,
            _phantom: PhantomData,
        }
    }
}

// Build method only available when all required fields are set
impl ScanConfigBuilder<WithStorageDir> {
    pub fn build(self) -> Result<ScanConfig> {
        let storage_dir = self
            .storage_dir
            .ok_or_else(|| anyhow!("storage_dir is required"))?;

        let storage_dir = if storage_dir.is_absolute() {
            storage_dir
        } else {
            std::env::current_dir()
                .map_err(|e| anyhow!("Failed to resolve current directory: {e}"))?
                .join(storage_dir)
        };

        let mut config = self.config;
        config.storage_dir = storage_dir;

        if config.min_width == 0 || config.min_height == 0 {
            return Err(anyhow!("minimum image dimensions must be at least 1px"));
        }
        if config.static_attempts == 0 || config.render_attempts == 0 {
            return Err(anyhow!("fetch attempt counts must be at least 1"));
        }
        if config.request_timeout_secs == 0 || config.image_timeout_secs == 0 {
            return Err(anyhow!("request and image timeouts must be at least 1s"));
        }
        if config.purge_interval_secs == 0 {
            return Err(anyhow!("purge interval must be at least 1s"));
        }
        if config.job_attempts == 0 {
            return Err(anyhow!("job_attempts must be at least 1"));
        }
        if config.retry_jitter_min_ms > config.retry_jitter_max_ms {
            return Err(anyhow!(
                "retry jitter window is inverted: {}ms > {}ms",
                config.retry_jitter_min_ms,
                config.retry_jitter_max_ms
            ));
        }
        config.default_concurrency = config
            .default_concurrency
            .clamp(1, crate::utils::MAX_DOWNLOAD_CONCURRENCY);
        config.queue_workers = config.queue_workers.max(1);

        // Enforce headless mode in release builds for production safety
        #[cfg(not(debug_assertions))]
        if !config.headless {
            tracing::warn!(
                "Forcing headless mode in release build. \
                Headed mode is only available in debug builds for development."
            );
            config.headless = true;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_storage_dir_becomes_absolute() {
        let config = ScanConfig::builder()
            .storage_dir("scans")
            .build()
            .expect("config");
        assert!(config.storage_dir().is_absolute());
        assert!(config.storage_dir().ends_with("scans"));
    }

    #[test]
    fn inverted_jitter_is_rejected() {
        let result = ScanConfig::builder()
            .storage_dir("/tmp/x")
            .retry_jitter_ms(500, 100)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn zero_purge_interval_is_rejected() {
        let result = ScanConfig::builder()
            .storage_dir("/tmp/x")
            .purge_interval_secs(0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let request = ScanConfig::builder()
            .storage_dir("/tmp/x")
            .request_timeout_secs(0)
            .build();
        assert!(request.is_err());

        let image = ScanConfig::builder()
            .storage_dir("/tmp/x")
            .image_timeout_secs(0)
            .build();
        assert!(image.is_err());
    }

    #[test]
    fn concurrency_is_clamped() {
        let config = ScanConfig::builder()
            .storage_dir("/tmp/x")
            .default_concurrency(500)
            .build()
            .expect("config");
        assert_eq!(config.default_concurrency(), crate::utils::MAX_DOWNLOAD_CONCURRENCY);
    }
}
