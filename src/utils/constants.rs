//! Shared configuration constants for imgscan
//!
//! Default values used throughout the codebase to ensure consistency
//! and avoid magic numbers.

/// Minimum accepted image width in pixels
pub const DEFAULT_MIN_IMAGE_WIDTH: u32 = 100;

/// Minimum accepted image height in pixels
pub const DEFAULT_MIN_IMAGE_HEIGHT: u32 = 100;

/// Page fetch timeout (static GET and render navigation)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Per-image download timeout
pub const DEFAULT_IMAGE_TIMEOUT_SECS: u64 = 15;

/// Largest image payload accepted by the downloader: 25MB
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 25 * 1024 * 1024;

/// Downloads in flight per chunk when the request does not say otherwise
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 5;

/// Upper bound for a caller-supplied concurrency limit
pub const MAX_DOWNLOAD_CONCURRENCY: usize = 20;

/// Attempts per chain for the static fetcher
pub const DEFAULT_STATIC_ATTEMPTS: u32 = 3;

/// Attempts per chain for the render fetcher
pub const DEFAULT_RENDER_ATTEMPTS: u32 = 2;

/// Jittered delay window between fetch attempts
pub const DEFAULT_RETRY_JITTER_MIN_MS: u64 = 1000;
pub const DEFAULT_RETRY_JITTER_MAX_MS: u64 = 3000;

/// Result cache time-to-live: 1 hour
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Result cache footprint ceiling: 100MB
pub const DEFAULT_CACHE_MAX_BYTES: u64 = 100 * 1024 * 1024;

/// Stored file time-to-live: 1 hour
pub const DEFAULT_FILE_TTL_SECS: u64 = 3600;

/// Interval between background purge sweeps: 15 minutes
pub const DEFAULT_PURGE_INTERVAL_SECS: u64 = 15 * 60;

/// Whole-pipeline attempts per queued job
pub const DEFAULT_JOB_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff between job attempts
pub const DEFAULT_JOB_BACKOFF_MS: u64 = 2000;

/// Worker tasks draining the job queue
pub const DEFAULT_QUEUE_WORKERS: usize = 2;

/// Hosts that only serve their images after client-side rendering
pub const DEFAULT_RENDER_DOMAINS: &[&str] =
    &["shopify.com", "myshopify.com", "squarespace.com", "wix.com"];

/// Referer sent with static page fetches
pub const SEARCH_ENGINE_REFERER: &str = "https://www.google.com/";

/// Cache directive attached to retrieved assets: 24 hours
pub const ASSET_CACHE_CONTROL: &str = "public, max-age=86400";

/// Sentinel kept at the storage root by every purge
pub const STORAGE_SENTINEL: &str = ".gitignore";

/// Append-only expiry log at the storage root
pub const EXPIRY_REGISTRY_FILE: &str = ".expiry-registry.jsonl";

/// Per-scan summary file
pub const RESULT_SUMMARY_FILE: &str = "result.json";

/// Chrome user agent string for stealth mode
///
/// Updated: 2025-01-29 to Chrome 132 (current stable)
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// Desktop user agents rotated across page fetches and downloads
pub const USER_AGENTS: &[&str] = &[
    CHROME_USER_AGENT,
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.2 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:134.0) Gecko/20100101 Firefox/134.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
];

/// Pick one user agent at random
#[must_use]
pub fn random_user_agent() -> &'static str {
    use rand::seq::IndexedRandom;
    USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(CHROME_USER_AGENT)
}
