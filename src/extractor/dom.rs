//! Image element and lazy-load attribute signals

use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

use super::CandidateCollector;
use super::types::SignalSource;

static IMAGE_ELEMENTS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("img, picture source").expect("BUG: hardcoded CSS selector is invalid")
});

/// Lazy-load attributes in priority order; the first non-empty one wins
pub const LAZY_ATTRIBUTES: &[&str] = &[
    "data-src",
    "data-lazy-src",
    "data-original",
    "data-srcset",
    "data-bg",
    "data-background",
    "data-background-image",
];

static LAZY_ELEMENTS: LazyLock<Selector> = LazyLock::new(|| {
    let selector = LAZY_ATTRIBUTES
        .iter()
        .map(|attr| format!("[{attr}]"))
        .collect::<Vec<_>>()
        .join(", ");
    Selector::parse(&selector).expect("BUG: hardcoded CSS selector is invalid")
});

/// `<img src>`, `<img srcset>` and `<picture><source srcset>`
pub(super) fn collect_image_elements(
    document: &Html,
    collector: &mut CandidateCollector<'_>,
    source: SignalSource,
) {
    for element in document.select(&IMAGE_ELEMENTS) {
        let is_img = element.value().name().eq_ignore_ascii_case("img");

        if is_img && let Some(src) = element.value().attr("src") {
            collector.push(src, source);
        }
        if let Some(srcset) = element.value().attr("srcset") {
            for url in parse_srcset(srcset) {
                collector.push(url, source);
            }
        }
    }
}

/// First non-empty lazy attribute per element
pub(super) fn collect_lazy_attributes(
    document: &Html,
    collector: &mut CandidateCollector<'_>,
    source: SignalSource,
) {
    for element in document.select(&LAZY_ELEMENTS) {
        let Some((attr, value)) = first_lazy_attribute(&element) else {
            continue;
        };

        if attr.ends_with("srcset") {
            for url in parse_srcset(value) {
                collector.push(url, source);
            }
        } else {
            collector.push(value, source);
        }
    }
}

fn first_lazy_attribute<'a>(element: &ElementRef<'a>) -> Option<(&'static str, &'a str)> {
    LAZY_ATTRIBUTES.iter().find_map(|attr| {
        element
            .value()
            .attr(attr)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| (*attr, v))
    })
}

/// Split a `srcset` descriptor list into its URLs
///
/// Follows the HTML candidate-string rules: a URL runs until whitespace,
/// trailing commas on a URL end the candidate, and commas inside a
/// parenthesised descriptor do not split.
#[must_use]
pub fn parse_srcset(srcset: &str) -> Vec<&str> {
    let mut urls = Vec::new();
    let bytes = srcset.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        // Skip separators
        while pos < bytes.len() && (bytes[pos].is_ascii_whitespace() || bytes[pos] == b',') {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }

        let start = pos;
        while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        let mut url = &srcset[start..pos];

        if url.ends_with(',') {
            url = url.trim_end_matches(',');
        } else {
            // Skip the descriptor up to the next top-level comma
            let mut depth = 0usize;
            while pos < bytes.len() {
                match bytes[pos] {
                    b'(' => depth += 1,
                    b')' => depth = depth.saturating_sub(1),
                    b',' if depth == 0 => break,
                    _ => {}
                }
                pos += 1;
            }
        }

        if !url.is_empty() {
            urls.push(url);
        }
    }

    urls
}
