//! Plain HTTP page fetcher
//!
//! One GET per call with browser-like headers. Redirects are followed up to
//! five hops and any final status below 400 is accepted; the page is not
//! executed, so iframe documents and computed styles are never collected.

use futures::StreamExt;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, HeaderMap, HeaderValue, REFERER};
use std::time::Duration;
use url::Url;

use super::{FetchFuture, PageContent, PageFetcher};
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::utils::{SEARCH_ENGINE_REFERER, random_user_agent};

/// Largest HTML document accepted: 15MB
const MAX_PAGE_BYTES: usize = 15 * 1024 * 1024;

const MAX_REDIRECTS: usize = 5;

/// HTTP-based page loader, no script execution
#[derive(Clone)]
pub struct StaticFetcher {
    client: Client,
    timeout: Duration,
}

impl StaticFetcher {
    pub fn new(config: &ScanConfig) -> Result<Self, ScanError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .default_headers(browser_headers())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ScanError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout: config.request_timeout(),
        })
    }

    async fn fetch(&self, url: &Url) -> Result<PageContent, ScanError> {
        let user_agent = random_user_agent();
        log::debug!("Static fetch {url} as '{user_agent}'");

        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .header(reqwest::header::USER_AGENT, user_agent)
            .send()
            .await
            .map_err(|e| ScanError::from_reqwest(&e, "Static fetch failed"))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(ScanError::ExternalService(format!(
                "Static fetch of {url} returned HTTP {status}"
            )));
        }

        let expected_size = response.content_length().unwrap_or(0);
        if expected_size > MAX_PAGE_BYTES as u64 {
            return Err(ScanError::ExternalService(format!(
                "Page too large: {expected_size} bytes exceeds limit of {MAX_PAGE_BYTES} bytes"
            )));
        }

        let mut buffer = Vec::with_capacity(expected_size as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ScanError::from_reqwest(&e, "Failed to read page body"))?;
            if buffer.len() + chunk.len() > MAX_PAGE_BYTES {
                return Err(ScanError::ExternalService(format!(
                    "Page exceeded size limit during download (max: {MAX_PAGE_BYTES})"
                )));
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(PageContent::from_html(String::from_utf8_lossy(&buffer).into_owned()))
    }
}

impl PageFetcher for StaticFetcher {
    fn fetch_page<'a>(&'a self, url: &'a Url) -> FetchFuture<'a> {
        Box::pin(self.fetch(url))
    }
}

/// Headers a desktop browser sends on a top-level navigation
fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(REFERER, HeaderValue::from_static(SEARCH_ENGINE_REFERER));
    headers.insert("dnt", HeaderValue::from_static("1"));
    headers.insert("upgrade-insecure-requests", HeaderValue::from_static("1"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("cross-site"));
    headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
    headers
}
