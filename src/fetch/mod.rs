//! Page fetching: strategy selection plus the static and render fetchers
//!
//! Selection is a pure function of host and configuration; execution is
//! behind the [`PageFetcher`] trait so the retry controller never knows which
//! engine it is driving.

pub mod page_timeout;
pub mod render_fetcher;
pub mod static_fetcher;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use url::Url;

use crate::config::ScanConfig;
use crate::error::ScanError;

pub use crate::extractor::{FrameDocument, PageContent};
pub use page_timeout::with_page_timeout;
pub use render_fetcher::RenderFetcher;
pub use static_fetcher::StaticFetcher;

/// Which engine loads the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchStrategy {
    /// Plain HTTP GET, no script execution
    #[serde(rename = "static")]
    Static,
    /// Headless browser with scrolling and iframe capture
    #[serde(rename = "rendering")]
    Render,
}

impl FetchStrategy {
    /// The strategy a fallback switches to
    #[must_use]
    pub const fn alternate(self) -> Self {
        match self {
            Self::Static => Self::Render,
            Self::Render => Self::Static,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Render => "rendering",
        }
    }
}

impl std::fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide how to fetch a page on `host`
///
/// Render when the global flag is set or when the host contains any
/// configured render-required domain; static otherwise.
#[must_use]
pub fn select_strategy(host: &str, config: &ScanConfig) -> FetchStrategy {
    if config.always_render() {
        return FetchStrategy::Render;
    }

    let host = host.to_ascii_lowercase();
    if config
        .render_domains()
        .iter()
        .any(|domain| host.contains(domain.as_str()))
    {
        FetchStrategy::Render
    } else {
        FetchStrategy::Static
    }
}

/// Boxed future returned by [`PageFetcher::fetch_page`]
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<PageContent, ScanError>> + Send + 'a>>;

/// One way of turning a URL into page content
///
/// Failures are returned, never swallowed, so the retry controller can
/// account for them.
pub trait PageFetcher: Send + Sync {
    fn fetch_page<'a>(&'a self, url: &'a Url) -> FetchFuture<'a>;
}

/// The pair of engines the retry controller switches between
pub struct FetcherSet<'a> {
    pub static_fetcher: &'a dyn PageFetcher,
    pub render_fetcher: &'a dyn PageFetcher,
}

impl<'a> FetcherSet<'a> {
    #[must_use]
    pub fn get(&self, strategy: FetchStrategy) -> &'a dyn PageFetcher {
        match strategy {
            FetchStrategy::Static => self.static_fetcher,
            FetchStrategy::Render => self.render_fetcher,
        }
    }
}
