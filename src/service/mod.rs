//! `ImageScanService`: the facade an outer router or the CLI drives
//!
//! Owns the cache, store, browser and queue, and wires the background
//! cache cleanup and store purge tasks. Results are written through to the
//! cache by the job handler once a page was actually fetched.

pub mod export;
pub mod health;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::browser::BrowserManager;
use crate::cache::{ResultCache, fingerprint};
use crate::config::ScanConfig;
use crate::downloader::Downloader;
use crate::error::ScanError;
use crate::fetch::{PageFetcher, RenderFetcher, StaticFetcher};
use crate::pipeline::{ProgressReporter, ScanOptions, ScanRequest, ScanResult, Scanner};
use crate::queue::{JobFuture, JobHandler, JobQueue, JobRetryPolicy, JobStatus};
use crate::storage::{DurableStore, SweepReport};
use crate::utils::{ASSET_CACHE_CONTROL, content_type_for, validate_target_url};

pub use export::ArchiveStream;
pub use health::{HealthReport, MemoryReport, StorageReport};

/// Cache expired-entry sweep interval
const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of `submit`
#[derive(Debug, Clone)]
pub enum Submission {
    /// A fresh result for the same target and options was cached
    Cached(Box<ScanResult>),
    /// A job was queued; poll it by id
    Queued(String),
}

/// A stored image ready to be served
#[derive(Debug, Clone)]
pub struct RetrievedAsset {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub cache_control: &'static str,
}

/// Runs the scanner for queued jobs and writes results through to the cache
struct ScanJobHandler {
    scanner: Scanner,
    cache: Arc<ResultCache>,
}

impl JobHandler for ScanJobHandler {
    fn handle<'a>(
        &'a self,
        request: &'a ScanRequest,
        progress: &'a dyn ProgressReporter,
    ) -> JobFuture<'a> {
        Box::pin(async move {
            let result = self.scanner.scan(request, progress).await?;
            if result.is_cacheable() {
                self.cache
                    .set(&fingerprint(&request.url, &request.options), result.clone());
            } else {
                log::debug!("Not caching scan {} of {}: page never fetched", result.scan_id, request.url);
            }
            Ok(result)
        })
    }
}

pub struct ImageScanService {
    config: Arc<ScanConfig>,
    cache: Arc<ResultCache>,
    store: Arc<DurableStore>,
    queue: JobQueue,
    downloader: Downloader,
    browser: Option<BrowserManager>,
    started: Instant,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl ImageScanService {
    /// Start with the HTTP fetcher and a lazily launched browser
    pub async fn start(config: ScanConfig) -> Result<Self, ScanError> {
        let browser = BrowserManager::new(config.headless(), config.request_timeout());
        let static_fetcher: Arc<dyn PageFetcher> = Arc::new(StaticFetcher::new(&config)?);
        let render_fetcher: Arc<dyn PageFetcher> =
            Arc::new(RenderFetcher::new(browser.clone(), &config));
        Self::assemble(config, static_fetcher, render_fetcher, Some(browser)).await
    }

    /// Start with caller-supplied page fetchers
    pub async fn start_with_fetchers(
        config: ScanConfig,
        static_fetcher: Arc<dyn PageFetcher>,
        render_fetcher: Arc<dyn PageFetcher>,
    ) -> Result<Self, ScanError> {
        Self::assemble(config, static_fetcher, render_fetcher, None).await
    }

    async fn assemble(
        config: ScanConfig,
        static_fetcher: Arc<dyn PageFetcher>,
        render_fetcher: Arc<dyn PageFetcher>,
        browser: Option<BrowserManager>,
    ) -> Result<Self, ScanError> {
        let config = Arc::new(config);
        let store = Arc::new(DurableStore::open(config.storage_dir(), config.file_ttl()).await?);
        let cache = Arc::new(ResultCache::new(config.cache_ttl(), config.cache_max_bytes()));

        let scanner = Scanner::new(
            Arc::clone(&config),
            Arc::clone(&store),
            static_fetcher,
            render_fetcher,
        )?;
        let handler = Arc::new(ScanJobHandler {
            scanner,
            cache: Arc::clone(&cache),
        });
        let queue = JobQueue::start(
            handler,
            config.queue_workers(),
            JobRetryPolicy {
                max_attempts: config.job_attempts(),
                backoff: config.job_backoff(),
            },
        );

        let background = vec![
            Arc::clone(&cache).start_cleanup_task(CACHE_CLEANUP_INTERVAL),
            Arc::clone(&store).start_purge_task(config.purge_interval()),
        ];

        log::info!(
            "Image scan service started (storage: {}, workers: {})",
            config.storage_dir().display(),
            config.queue_workers()
        );

        Ok(Self {
            downloader: Downloader::new(&config, Arc::clone(&store))?,
            config,
            cache,
            store,
            queue,
            browser,
            started: Instant::now(),
            background: Mutex::new(background),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Validate `url`, answer from cache or queue a scan
    pub fn submit(&self, url: &str, options: ScanOptions) -> Result<Submission, ScanError> {
        let target = validate_target_url(url)?;
        let request = ScanRequest {
            url: target.to_string(),
            options,
        };

        let key = fingerprint(&request.url, &request.options);
        if let Some(result) = self.cache.get(&key) {
            log::info!("Serving {} from cache (scan {})", request.url, result.scan_id);
            return Ok(Submission::Cached(Box::new(result)));
        }

        Ok(Submission::Queued(self.queue.add(request)))
    }

    #[must_use]
    pub fn poll(&self, job_id: &str) -> JobStatus {
        self.queue.status(job_id)
    }

    /// Read a stored image of `scan_id`
    pub async fn retrieve_asset(
        &self,
        scan_id: &str,
        file_name: &str,
    ) -> Result<RetrievedAsset, ScanError> {
        let path = self.store.find_in_scan(scan_id, file_name).await?;
        let bytes = self.store.get_file(&path).await?;
        Ok(RetrievedAsset {
            bytes,
            content_type: content_type_for(file_name),
            cache_control: ASSET_CACHE_CONTROL,
        })
    }

    pub async fn health(&self) -> HealthReport {
        let memory = tokio::task::spawn_blocking(health::memory_snapshot)
            .await
            .unwrap_or_else(|e| {
                log::warn!("Memory snapshot failed: {e}");
                MemoryReport::default()
            });

        let reachable = self.store.is_reachable().await;
        let file_count = self.store.file_count().await.unwrap_or_else(|e| {
            log::warn!("Storage file count failed: {e}");
            0
        });

        HealthReport {
            status: if reachable { "ok" } else { "degraded" },
            uptime_secs: self.started.elapsed().as_secs(),
            memory,
            storage: StorageReport {
                reachable,
                file_count,
            },
            cache: self.cache.stats(),
            pending_jobs: self.queue.pending(),
        }
    }

    /// Zip archive of `urls`, streamed as it is built
    #[must_use]
    pub fn export_archive(&self, urls: Vec<String>) -> ArchiveStream {
        export::spawn_archive(self.downloader.clone(), urls)
    }

    /// Sweep the store now; `None` when a sweep is already running
    pub async fn purge(&self, force: bool) -> Result<Option<SweepReport>, ScanError> {
        self.store.sweep(force).await
    }

    #[must_use]
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Stop workers and background tasks and close the browser
    pub async fn shutdown(&self) {
        self.queue.shutdown();
        for handle in self.background.lock().drain(..) {
            handle.abort();
        }
        if let Some(browser) = &self.browser
            && let Err(e) = browser.shutdown().await
        {
            log::warn!("Browser shutdown failed: {e}");
        }
        log::info!("Image scan service stopped");
    }
}
