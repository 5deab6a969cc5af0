//! Bounded, chunked image downloader
//!
//! Candidates are split into ordered chunks of K. Chunks run strictly one
//! after another; the downloads inside a chunk run together. A failed
//! download drops only its own candidate. Storage failures are not
//! per-asset problems and abort the batch.

pub mod probe;

use futures::StreamExt;
use futures::future::join_all;
use reqwest::Client;
use reqwest::header::{ACCEPT, REFERER, USER_AGENT};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::extractor::AssetCandidate;
use crate::pipeline::AssetRecord;
use crate::storage::DurableStore;
use crate::utils::{MAX_DOWNLOAD_CONCURRENCY, random_user_agent};

pub use probe::{ImageInfo, probe};

const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/apng,image/*,*/*;q=0.8";

/// Run `f` over `items` in sequential chunks of `k`
///
/// `f` receives the item's index in `items`. Results keep input order. At
/// most `k` futures are alive at any moment.
pub async fn run_chunked<'a, T, R, F, Fut>(items: &'a [T], k: usize, f: F) -> Vec<R>
where
    F: Fn(usize, &'a T) -> Fut,
    Fut: Future<Output = R>,
{
    let k = k.clamp(1, MAX_DOWNLOAD_CONCURRENCY);
    let mut results = Vec::with_capacity(items.len());

    for (chunk_index, chunk) in items.chunks(k).enumerate() {
        let base = chunk_index * k;
        let batch = chunk
            .iter()
            .enumerate()
            .map(|(offset, item)| f(base + offset, item));
        results.extend(join_all(batch).await);
    }

    results
}

/// Where one scan's images go
#[derive(Debug, Clone, Copy)]
pub struct DownloadTarget<'a> {
    pub scan_id: &'a str,
    /// Per-site storage namespace
    pub site: &'a str,
    /// Page the candidates were found on, sent as Referer
    pub referer: &'a Url,
}

/// Why one candidate produced no record
#[derive(Debug)]
enum Skip {
    /// Network, status or size problem
    Fetch(ScanError),
    /// Not a readable image
    Unprobeable,
    /// Readable but below the minimum dimensions
    TooSmall(u32, u32),
}

/// Downloads, probes and stores image candidates
#[derive(Clone)]
pub struct Downloader {
    client: Client,
    store: Arc<DurableStore>,
    timeout: Duration,
    max_bytes: u64,
    min_width: u32,
    min_height: u32,
}

impl Downloader {
    pub fn new(config: &ScanConfig, store: Arc<DurableStore>) -> Result<Self, ScanError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ScanError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            store,
            timeout: config.image_timeout(),
            max_bytes: config.max_image_bytes(),
            min_width: config.min_width(),
            min_height: config.min_height(),
        })
    }

    /// Download every candidate, K at a time
    ///
    /// Returns records for accepted images in candidate order.
    pub async fn download_all(
        &self,
        candidates: &[AssetCandidate],
        target: DownloadTarget<'_>,
        concurrency: usize,
    ) -> Result<Vec<AssetRecord>, ScanError> {
        let outcomes = run_chunked(candidates, concurrency, |index, candidate| {
            self.download_one(index, candidate, target)
        })
        .await;

        let mut records = Vec::new();
        for outcome in outcomes {
            if let Some(record) = outcome? {
                records.push(record);
            }
        }

        log::info!(
            "Kept {} of {} candidates for scan {}",
            records.len(),
            candidates.len(),
            target.scan_id
        );
        Ok(records)
    }

    async fn download_one(
        &self,
        index: usize,
        candidate: &AssetCandidate,
        target: DownloadTarget<'_>,
    ) -> Result<Option<AssetRecord>, ScanError> {
        let (bytes, info) = match self.fetch_and_probe(candidate, target.referer).await {
            Ok(ok) => ok,
            Err(Skip::Fetch(e)) => {
                log::debug!("Download failed for {}: {e}", candidate.url);
                return Ok(None);
            }
            Err(Skip::Unprobeable) => {
                log::debug!("Not a readable image: {}", candidate.url);
                return Ok(None);
            }
            Err(Skip::TooSmall(w, h)) => {
                log::debug!(
                    "Below minimum size ({w}x{h} < {}x{}): {}",
                    self.min_width,
                    self.min_height,
                    candidate.url
                );
                return Ok(None);
            }
        };

        let file_name = format!(
            "img_{index}_{}_{}.{}",
            chrono::Utc::now().timestamp_millis(),
            hex::encode(rand::random::<[u8; 4]>()),
            info.format
        );
        let path = format!("{}/{}/{file_name}", target.site, target.scan_id);
        self.store.store_file(&bytes, &path).await?;

        Ok(Some(AssetRecord {
            id: uuid::Uuid::new_v4().to_string(),
            url: candidate.url.clone(),
            source: candidate.source,
            size: bytes.len() as u64,
            width: info.width,
            height: info.height,
            format: info.format.to_string(),
            local_url: format!("/api/images/{}/{file_name}", target.scan_id),
            path,
            file_name,
        }))
    }

    async fn fetch_and_probe(
        &self,
        candidate: &AssetCandidate,
        referer: &Url,
    ) -> Result<(Vec<u8>, ImageInfo), Skip> {
        let bytes = self.fetch(&candidate.url, referer).await.map_err(Skip::Fetch)?;
        let info = probe(&bytes).ok_or(Skip::Unprobeable)?;
        if info.width < self.min_width || info.height < self.min_height {
            return Err(Skip::TooSmall(info.width, info.height));
        }
        Ok((bytes, info))
    }

    /// GET one image with a size ceiling enforced before and during the body
    pub async fn fetch(&self, url: &str, referer: &Url) -> Result<Vec<u8>, ScanError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .header(USER_AGENT, random_user_agent())
            .header(ACCEPT, IMAGE_ACCEPT)
            .header(REFERER, referer.as_str())
            .send()
            .await
            .map_err(|e| ScanError::from_reqwest(&e, "Image download failed"))?;

        if !response.status().is_success() {
            return Err(ScanError::ExternalService(format!(
                "Image download failed with status: {}",
                response.status()
            )));
        }

        let expected_size = response.content_length().unwrap_or(0);
        if expected_size > self.max_bytes {
            return Err(ScanError::ExternalService(format!(
                "Image too large: {expected_size} bytes exceeds limit of {} bytes",
                self.max_bytes
            )));
        }

        let mut buffer = Vec::with_capacity(expected_size as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ScanError::from_reqwest(&e, "Failed to read image chunk"))?;
            if (buffer.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(ScanError::ExternalService(format!(
                    "Image exceeded size limit during download (max: {})",
                    self.max_bytes
                )));
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn chunks_bound_in_flight_work() {
        let items: Vec<u32> = (0..23).collect();
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let results = run_chunked(&items, 4, |index, item| {
            let in_flight = &in_flight;
            let peak = &peak;
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                (index, *item)
            }
        })
        .await;

        assert_eq!(peak.load(Ordering::SeqCst), 4);
        assert_eq!(results.len(), 23);
        assert!(results.iter().all(|(index, item)| *index as u32 == *item));
    }

    #[tokio::test]
    async fn concurrency_is_clamped() {
        let items = [1, 2, 3];
        let out = run_chunked(&items, 0, |_, item| async move { item * 2 }).await;
        assert_eq!(out, vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn oversized_payload_is_refused() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/big.png")
            .with_status(200)
            .with_body(vec![0u8; 2048])
            .create_async()
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let config = ScanConfig::builder()
            .storage_dir(dir.path())
            .max_image_bytes(1024)
            .build()
            .expect("config");
        let store = DurableStore::open(dir.path(), config.file_ttl())
            .await
            .expect("store");
        let downloader = Downloader::new(&config, Arc::new(store)).expect("downloader");

        let referer = Url::parse(&server.url()).expect("url");
        let err = downloader
            .fetch(&format!("{}/big.png", server.url()), &referer)
            .await
            .expect_err("must refuse");
        assert!(matches!(err, ScanError::ExternalService(msg) if msg.contains("too large") || msg.contains("size limit")));
    }

    #[tokio::test]
    async fn sends_referer_and_image_accept() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/a.png")
            .match_header("referer", "https://shop.example/page")
            .match_header("accept", IMAGE_ACCEPT)
            .with_status(200)
            .with_body("x")
            .create_async()
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let config = ScanConfig::builder().storage_dir(dir.path()).build().expect("config");
        let store = DurableStore::open(dir.path(), config.file_ttl())
            .await
            .expect("store");
        let downloader = Downloader::new(&config, Arc::new(store)).expect("downloader");

        let referer = Url::parse("https://shop.example/page").expect("url");
        let body = downloader
            .fetch(&format!("{}/a.png", server.url()), &referer)
            .await
            .expect("body");
        assert_eq!(body, b"x");
        mock.assert_async().await;
    }
}
