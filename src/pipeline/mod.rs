//! The scan pipeline for one page
//!
//! select strategy → fetch with retry/fallback → extract candidates →
//! bounded download → `result.json` → [`ScanResult`]
//!
//! A page that cannot be fetched by any strategy still produces a result,
//! with no images and the accumulated fetch errors. Only infrastructure
//! failures (storage writes) surface as `Err` and make the job retry.

pub mod progress;
pub mod types;

use std::sync::Arc;
use std::time::Instant;
use url::Url;

use crate::config::ScanConfig;
use crate::downloader::{DownloadTarget, Downloader};
use crate::error::ScanError;
use crate::extractor::{Extraction, extract};
use crate::fetch::{FetcherSet, PageFetcher, select_strategy};
use crate::retry::{RetryController, RetryOutcome};
use crate::storage::DurableStore;
use crate::utils::{MAX_DOWNLOAD_CONCURRENCY, RESULT_SUMMARY_FILE, site_namespace};

pub use progress::{NoOpProgress, ProgressReporter, stage};
pub use types::{AssetRecord, ScanOptions, ScanRequest, ScanResult, ScanStats};

/// Runs scans against injected page fetchers
pub struct Scanner {
    config: Arc<ScanConfig>,
    static_fetcher: Arc<dyn PageFetcher>,
    render_fetcher: Arc<dyn PageFetcher>,
    retry: RetryController,
    downloader: Downloader,
    store: Arc<DurableStore>,
}

impl Scanner {
    pub fn new(
        config: Arc<ScanConfig>,
        store: Arc<DurableStore>,
        static_fetcher: Arc<dyn PageFetcher>,
        render_fetcher: Arc<dyn PageFetcher>,
    ) -> Result<Self, ScanError> {
        Ok(Self {
            retry: RetryController::new(&config),
            downloader: Downloader::new(&config, Arc::clone(&store))?,
            config,
            static_fetcher,
            render_fetcher,
            store,
        })
    }

    /// Scan one page end to end
    pub async fn scan(
        &self,
        request: &ScanRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<ScanResult, ScanError> {
        let started = Instant::now();
        let url = Url::parse(&request.url)
            .map_err(|e| ScanError::Validation(format!("Invalid URL '{}': {e}", request.url)))?;
        let host = url
            .host_str()
            .ok_or_else(|| ScanError::Validation(format!("URL '{url}' has no host")))?;

        let scan_id = uuid::Uuid::new_v4().to_string();
        let site = site_namespace(&url);
        let strategy = select_strategy(host, &self.config);
        log::info!("Scan {scan_id} of {url} starting with {strategy}");
        progress.report(stage::STARTED);

        let fetchers = FetcherSet {
            static_fetcher: self.static_fetcher.as_ref(),
            render_fetcher: self.render_fetcher.as_ref(),
        };
        let outcome = self.retry.run(&url, strategy, &fetchers).await;
        progress.report(stage::FETCHED);

        let (method, errors, page_fetched, extraction, images) = match outcome {
            RetryOutcome::Fetched {
                strategy,
                content,
                errors,
            } => {
                let extraction = extract(&content, &url);
                progress.report(stage::EXTRACTED);
                log::info!(
                    "Scan {scan_id}: {} candidates ({} finds) from {url}",
                    extraction.unique_found(),
                    extraction.total_found
                );

                let target = DownloadTarget {
                    scan_id: &scan_id,
                    site: &site,
                    referer: &url,
                };
                let images = self
                    .downloader
                    .download_all(&extraction.candidates, target, self.concurrency(request))
                    .await?;
                progress.report(stage::DOWNLOADED);
                (strategy, errors, true, extraction, images)
            }
            RetryOutcome::Exhausted { strategy, errors } => {
                log::warn!("Scan {scan_id}: no strategy could fetch {url}");
                (strategy, errors, false, Extraction::default(), Vec::new())
            }
        };

        let result = ScanResult {
            scan_id: scan_id.clone(),
            url: url.to_string(),
            timestamp: chrono::Utc::now(),
            stats: ScanStats {
                by_source: extraction.by_source,
                total_found: extraction.total_found,
                unique_found: extraction.candidates.len(),
                valid_images: images.len(),
                elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                errors,
                method,
                page_fetched,
            },
            images,
        };

        self.write_summary(&site, &result).await?;
        progress.report(stage::DONE);
        Ok(result)
    }

    fn concurrency(&self, request: &ScanRequest) -> usize {
        request
            .options
            .concurrency
            .unwrap_or_else(|| self.config.default_concurrency())
            .clamp(1, MAX_DOWNLOAD_CONCURRENCY)
    }

    async fn write_summary(&self, site: &str, result: &ScanResult) -> Result<(), ScanError> {
        let json = serde_json::to_vec_pretty(result)
            .map_err(|e| ScanError::Internal(format!("Failed to serialize scan result: {e}")))?;
        let path = format!("{site}/{}/{RESULT_SUMMARY_FILE}", result.scan_id);
        self.store.store_file(&json, &path).await?;
        Ok(())
    }
}
