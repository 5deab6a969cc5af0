//! Request and result types of a single page scan

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::extractor::SignalSource;
use crate::fetch::FetchStrategy;

/// Caller-tunable knobs of one scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Downloads in flight per chunk; configured default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    /// Queue priority, higher runs first
    #[serde(default)]
    pub priority: i32,
}

/// One validated scan submission
///
/// `url` is already absolute http(s). Nothing mutates a request after
/// it is queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub url: String,
    #[serde(default)]
    pub options: ScanOptions,
}

/// A downloaded, probed and stored image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub id: String,
    /// Normalized source URL
    pub url: String,
    pub source: SignalSource,
    /// Payload size in bytes
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub format: String,
    /// Path relative to the store base
    pub path: String,
    pub file_name: String,
    /// Retrieval route `/api/images/{scanId}/{fileName}`
    pub local_url: String,
}

/// Aggregate counters of one scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    /// Normalized finds per signal before deduplication
    pub by_source: BTreeMap<SignalSource, usize>,
    pub total_found: usize,
    pub unique_found: usize,
    pub valid_images: usize,
    pub elapsed_ms: u64,
    /// Failed fetch attempts, in order
    pub errors: Vec<String>,
    /// Strategy that produced the page, or the last one tried
    pub method: FetchStrategy,
    /// False when every fetch strategy was exhausted
    pub page_fetched: bool,
}

/// Outcome of one scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub scan_id: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub images: Vec<AssetRecord>,
    pub stats: ScanStats,
}

impl ScanResult {
    /// Whether this result describes a page that was actually loaded
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.stats.page_fetched
    }
}
