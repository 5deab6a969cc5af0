//! Asset candidate discovery
//!
//! Runs five independent signals over the page document, its style blocks and
//! each iframe document, normalizes every raw string and deduplicates the
//! results by normalized URL. The first signal to produce a URL keeps the
//! attribution.
//!
//! Signal order for a document: image elements, lazy attributes, CSS, then
//! metadata. Iframe documents are processed after the main page and attribute
//! every find to [`SignalSource::Iframe`].

pub mod css;
pub mod dom;
pub mod metadata;
pub mod types;

use scraper::Html;
use std::collections::HashSet;
use url::Url;

use crate::url_normalizer::normalize;

pub use dom::{LAZY_ATTRIBUTES, parse_srcset};
pub use types::{AssetCandidate, Extraction, FrameDocument, PageContent, SignalSource};

/// Accumulates normalized, deduplicated candidates for one page
pub(crate) struct CandidateCollector<'a> {
    base_url: &'a Url,
    seen: HashSet<String>,
    extraction: Extraction,
}

impl<'a> CandidateCollector<'a> {
    fn new(base_url: &'a Url) -> Self {
        Self {
            base_url,
            seen: HashSet::new(),
            extraction: Extraction::default(),
        }
    }

    /// Switch the base URL used to resolve relative references
    fn rebase(&mut self, base_url: &'a Url) {
        self.base_url = base_url;
    }

    pub(crate) fn push(&mut self, raw: &str, source: SignalSource) {
        let Some(url) = normalize(raw, self.base_url) else {
            return;
        };

        self.extraction.total_found += 1;
        *self.extraction.by_source.entry(source).or_insert(0) += 1;

        if self.seen.insert(url.clone()) {
            let order = self.extraction.candidates.len();
            self.extraction.candidates.push(AssetCandidate { url, source, order });
        }
    }

    fn finish(self) -> Extraction {
        self.extraction
    }
}

/// Discover every image candidate in `content` fetched from `page_url`
#[must_use]
pub fn extract(content: &PageContent, page_url: &Url) -> Extraction {
    // Resolved up front so the collector can borrow them while rebasing
    let frame_urls: Vec<Option<Url>> = content
        .iframes
        .iter()
        .map(|frame| page_url.join(&frame.url).ok())
        .collect();

    let mut collector = CandidateCollector::new(page_url);

    let document = Html::parse_document(&content.html);
    let in_document = scan_document(&document, &mut collector, None);

    // Style text already scanned as a `<style>` block of the DOM counts once
    for stylesheet in content
        .styles
        .iter()
        .filter(|sheet| !in_document.contains(sheet.trim()))
    {
        css::collect_stylesheet(stylesheet, &mut collector, SignalSource::CssBackground);
    }

    for (frame, frame_url) in content.iframes.iter().zip(&frame_urls) {
        collector.rebase(frame_url.as_ref().unwrap_or(page_url));
        let frame_document = Html::parse_document(&frame.html);
        let _ = scan_document(&frame_document, &mut collector, Some(SignalSource::Iframe));
    }

    let extraction = collector.finish();
    log::debug!(
        "Extracted {} candidates ({} unique) from {}",
        extraction.total_found,
        extraction.unique_found(),
        page_url
    );
    extraction
}

/// Run every signal over one parsed document
///
/// `forced` replaces each signal's own tag, used for iframe documents.
/// Returns the text of the `<style>` blocks that were scanned.
fn scan_document(
    document: &Html,
    collector: &mut CandidateCollector<'_>,
    forced: Option<SignalSource>,
) -> HashSet<String> {
    let tag = |own: SignalSource| forced.unwrap_or(own);

    dom::collect_image_elements(document, collector, tag(SignalSource::DomImage));
    dom::collect_lazy_attributes(document, collector, tag(SignalSource::LazyAttribute));
    let style_blocks =
        css::collect_document_styles(document, collector, tag(SignalSource::CssBackground));
    metadata::collect_metadata(document, collector, tag(SignalSource::Metadata));
    style_blocks
}
