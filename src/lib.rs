pub mod browser;
pub mod cache;
pub mod config;
pub mod downloader;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod pipeline;
pub mod queue;
pub mod retry;
pub mod service;
pub mod storage;
pub mod url_normalizer;
pub mod utils;

pub use browser::BrowserManager;
pub use cache::{CacheStats, ResultCache, fingerprint};
pub use config::ScanConfig;
pub use downloader::{Downloader, run_chunked};
pub use error::{ErrorBody, ScanError};
pub use extractor::{AssetCandidate, Extraction, PageContent, SignalSource, extract};
pub use fetch::{
    FetchFuture, FetchStrategy, PageFetcher, RenderFetcher, StaticFetcher, select_strategy,
};
pub use pipeline::{
    AssetRecord, NoOpProgress, ProgressReporter, ScanOptions, ScanRequest, ScanResult, ScanStats,
    Scanner,
};
pub use queue::{JobQueue, JobState, JobStatus};
pub use retry::{RetryController, RetryOutcome};
pub use service::{HealthReport, ImageScanService, RetrievedAsset, Submission};
pub use storage::{DurableStore, SweepReport};
pub use url_normalizer::normalize;

