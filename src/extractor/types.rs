//! Types flowing into and out of the content extractor

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serialized page state handed to the extractor by a page fetcher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContent {
    /// Serialized DOM of the target page
    pub html: String,
    /// Text of style blocks collected outside the serialized DOM
    pub styles: Vec<String>,
    /// Child documents of `<iframe>` elements, one level deep
    pub iframes: Vec<FrameDocument>,
}

impl PageContent {
    #[must_use]
    pub fn from_html(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            ..Self::default()
        }
    }
}

/// One iframe document and the URL it was loaded from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDocument {
    pub url: String,
    pub html: String,
}

/// Signal an asset URL was discovered through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalSource {
    /// `<img src>`, `<img srcset>`, `<picture><source srcset>`
    DomImage,
    /// Lazy-load data attributes
    LazyAttribute,
    /// `url(...)` in inline styles and stylesheets
    CssBackground,
    /// OpenGraph/Twitter meta tags and JSON-LD
    Metadata,
    /// Anything found inside an iframe document
    Iframe,
}

impl SignalSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DomImage => "dom-image",
            Self::LazyAttribute => "lazy-attribute",
            Self::CssBackground => "css-background",
            Self::Metadata => "metadata",
            Self::Iframe => "iframe",
        }
    }
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered, not yet downloaded, image URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetCandidate {
    /// Output of the URL normalizer
    pub url: String,
    /// First signal that produced this URL
    pub source: SignalSource,
    /// Position among unique candidates, in discovery order
    pub order: usize,
}

/// Result of running every signal over a page
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Deduplicated candidates in discovery order
    pub candidates: Vec<AssetCandidate>,
    /// Normalized finds before deduplication
    pub total_found: usize,
    /// Normalized finds per signal before deduplication
    pub by_source: BTreeMap<SignalSource, usize>,
}

impl Extraction {
    #[must_use]
    pub fn unique_found(&self) -> usize {
        self.candidates.len()
    }
}
