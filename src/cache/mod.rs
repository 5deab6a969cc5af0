//! In-memory result cache keyed by request fingerprint
//!
//! Entries expire individually. The footprint is approximated by the
//! serialized JSON length of each value; an insertion that would exceed
//! the ceiling first evicts the oldest fifth of the entries, repeatedly,
//! until the new value fits.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use xxhash_rust::xxh3::xxh3_64;

use crate::pipeline::{ScanOptions, ScanResult};

/// Fingerprint of a normalized target URL plus its options
#[must_use]
pub fn fingerprint(normalized_url: &str, options: &ScanOptions) -> String {
    let json = serde_json::to_vec(&(normalized_url, options)).unwrap_or_else(|e| {
        log::warn!("Options failed to serialize for fingerprint: {e}");
        normalized_url.as_bytes().to_vec()
    });
    hex::encode(xxh3_64(&json).to_be_bytes())
}

struct CacheEntry {
    value: ScanResult,
    created_at: Instant,
    ttl: Duration,
    bytes: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Keys in insertion order, oldest first
    order: VecDeque<String>,
    bytes: u64,
}

impl CacheState {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.bytes = self.bytes.saturating_sub(entry.bytes);
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        Some(entry)
    }

    /// Drop the oldest ceil(20%) of entries
    fn evict_oldest_fifth(&mut self) -> usize {
        let count = self.entries.len().div_ceil(5);
        let mut evicted = 0;
        while evicted < count {
            let Some(key) = self.order.pop_front() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.bytes = self.bytes.saturating_sub(entry.bytes);
                evicted += 1;
            }
        }
        evicted
    }
}

/// Counters reported by [`ResultCache::stats`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
    pub max_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// TTL and size bounded cache of scan results
pub struct ResultCache {
    state: Mutex<CacheState>,
    default_ttl: Duration,
    max_bytes: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    #[must_use]
    pub fn new(default_ttl: Duration, max_bytes: u64) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            default_ttl,
            max_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fresh value under `key`; an expired entry is removed and misses
    pub fn get(&self, key: &str) -> Option<ScanResult> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let expired = match state.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                log::debug!("Result cache hit for {key}");
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            state.remove(key);
            log::debug!("Result cache entry {key} expired");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert with the default TTL
    pub fn set(&self, key: &str, value: ScanResult) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Insert with an explicit TTL
    ///
    /// Values that fail to serialize, or that alone exceed the ceiling,
    /// are logged and not stored.
    pub fn set_with_ttl(&self, key: &str, value: ScanResult, ttl: Duration) {
        let bytes = match serde_json::to_vec(&value) {
            Ok(json) => json.len() as u64,
            Err(e) => {
                log::warn!("Result cache set failed for {key}: {e}");
                return;
            }
        };
        if bytes > self.max_bytes {
            log::warn!(
                "Result for {key} is {bytes} bytes, larger than the whole cache ({} bytes)",
                self.max_bytes
            );
            return;
        }

        let mut state = self.state.lock();
        state.remove(key);

        while state.bytes + bytes > self.max_bytes && !state.entries.is_empty() {
            let evicted = state.evict_oldest_fifth();
            log::debug!("Result cache over budget, evicted {evicted} oldest entries");
        }

        state.bytes += bytes;
        state.order.push_back(key.to_string());
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl,
                bytes,
            },
        );
    }

    /// Remove one entry; returns whether it was present
    pub fn evict(&self, key: &str) -> bool {
        self.state.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
        state.bytes = 0;
    }

    /// Drop every expired entry; returns how many went
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        expired.len()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let (entries, bytes) = {
            let state = self.state.lock();
            (state.entries.len(), state.bytes)
        };
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheStats {
            entries,
            bytes,
            max_bytes: self.max_bytes,
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    /// Purge expired entries on every `interval`
    pub fn start_cleanup_task(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = self.purge_expired();
                if purged > 0 {
                    log::debug!("Result cache cleanup dropped {purged} expired entries");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchStrategy;
    use crate::pipeline::ScanStats;
    use std::collections::BTreeMap;

    fn result(id: &str) -> ScanResult {
        ScanResult {
            scan_id: id.to_string(),
            url: "https://example.com/".to_string(),
            // Fixed so every test value serializes to the same length
            timestamp: chrono::DateTime::from_timestamp(1_700_000_000, 0).expect("timestamp"),
            images: Vec::new(),
            stats: ScanStats {
                by_source: BTreeMap::new(),
                total_found: 0,
                unique_found: 0,
                valid_images: 0,
                elapsed_ms: 0,
                errors: Vec::new(),
                method: FetchStrategy::Static,
                page_fetched: true,
            },
        }
    }

    fn size_of(value: &ScanResult) -> u64 {
        serde_json::to_vec(value).expect("json").len() as u64
    }

    #[test]
    fn fingerprint_depends_on_url_and_options() {
        let opts = ScanOptions::default();
        let a = fingerprint("https://a.com/", &opts);
        assert_eq!(a, fingerprint("https://a.com/", &opts));
        assert_eq!(a.len(), 16);
        assert_ne!(a, fingerprint("https://b.com/", &opts));

        let concurrent = ScanOptions {
            concurrency: Some(2),
            ..ScanOptions::default()
        };
        assert_ne!(a, fingerprint("https://a.com/", &concurrent));
    }

    #[test]
    fn hit_and_miss_counters() {
        let cache = ResultCache::new(Duration::from_secs(60), 1024 * 1024);
        assert!(cache.get("k").is_none());
        cache.set("k", result("one"));
        assert_eq!(cache.get("k").expect("hit").scan_id, "one");

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn expired_get_misses_and_removes() {
        let cache = ResultCache::new(Duration::from_secs(60), 1024 * 1024);
        cache.set_with_ttl("k", result("one"), Duration::ZERO);

        assert!(cache.get("k").is_none());
        let stats = cache.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.bytes, 0);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn over_budget_insert_evicts_oldest_fifth() {
        let one = size_of(&result("r0"));
        // Room for exactly ten entries
        let cache = ResultCache::new(Duration::from_secs(60), one * 10);
        for i in 0..10 {
            cache.set(&format!("k{i}"), result(&format!("r{i}")));
        }
        assert_eq!(cache.stats().entries, 10);

        cache.set("k10", result("rX"));

        assert_eq!(cache.stats().entries, 9);
        assert!(cache.get("k0").is_none());
        assert!(cache.get("k1").is_none());
        assert!(cache.get("k2").is_some());
        assert!(cache.get("k10").is_some());
    }

    #[test]
    fn evict_and_clear() {
        let cache = ResultCache::new(Duration::from_secs(60), 1024 * 1024);
        cache.set("a", result("a"));
        cache.set("b", result("b"));

        assert!(cache.evict("a"));
        assert!(!cache.evict("a"));
        cache.clear();
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.stats().bytes, 0);
    }

    #[test]
    fn purge_drops_only_expired() {
        let cache = ResultCache::new(Duration::from_secs(60), 1024 * 1024);
        cache.set_with_ttl("old", result("old"), Duration::ZERO);
        cache.set("new", result("new"));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.stats().entries, 1);
    }
}
