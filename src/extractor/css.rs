//! `url(...)` and `@import` signals from inline styles and stylesheets

use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;

use super::CandidateCollector;
use super::types::SignalSource;

/// `url(x)`, `url('x')`, `url("x")` with optional inner whitespace
static URL_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*['"]?([^'"()]+?)['"]?\s*\)"#)
        .expect("BUG: hardcoded url() regex is invalid")
});

/// String form of `@import`; the `url()` form is already covered above
static IMPORT_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@import\s+['"]([^'"]+)['"]"#).expect("BUG: hardcoded @import regex is invalid")
});

static STYLED_ELEMENTS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[style]").expect("BUG: hardcoded CSS selector '[style]' is invalid")
});

static STYLE_BLOCKS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("style").expect("BUG: hardcoded CSS selector 'style' is invalid")
});

/// Every raw reference inside a chunk of CSS, in source order
///
/// `@import` targets that are not images are returned too; the normalizer
/// drops them for lacking an image extension.
#[must_use]
pub fn css_references(css: &str) -> Vec<&str> {
    let mut found: Vec<(usize, &str)> = URL_TOKEN
        .captures_iter(css)
        .filter_map(|caps| caps.get(1))
        .map(|m| (m.start(), m.as_str()))
        .collect();

    found.extend(
        IMPORT_STRING
            .captures_iter(css)
            .filter_map(|caps| caps.get(1))
            .map(|m| (m.start(), m.as_str())),
    );

    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, url)| url).collect()
}

/// Inline `style` attributes and in-document `<style>` blocks
///
/// Returns the trimmed text of every `<style>` block scanned.
pub(super) fn collect_document_styles(
    document: &Html,
    collector: &mut CandidateCollector<'_>,
    source: SignalSource,
) -> HashSet<String> {
    for element in document.select(&STYLED_ELEMENTS) {
        if let Some(style) = element.value().attr("style") {
            for url in css_references(style) {
                collector.push(url, source);
            }
        }
    }

    let mut blocks = HashSet::new();
    for block in document.select(&STYLE_BLOCKS) {
        let text: String = block.text().collect();
        collect_stylesheet(&text, collector, source);
        blocks.insert(text.trim().to_string());
    }
    blocks
}

/// A stylesheet collected outside the serialized DOM
pub(super) fn collect_stylesheet(
    css: &str,
    collector: &mut CandidateCollector<'_>,
    source: SignalSource,
) {
    for url in css_references(css) {
        collector.push(url, source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_all_url_forms_in_order() {
        let css = r#"
            @import "print.css";
            @import 'hero-sprite.png';
            .a { background-image: url(a.png); }
            .b { background: #fff url( 'b.jpg' ) no-repeat; }
            .c { background: url("c.webp"), url(d.gif); }
        "#;
        assert_eq!(
            css_references(css),
            vec!["print.css", "hero-sprite.png", "a.png", "b.jpg", "c.webp", "d.gif"]
        );
    }

    #[test]
    fn empty_and_malformed_tokens_are_skipped() {
        assert!(css_references("background: url()").is_empty());
        assert!(css_references("color: red").is_empty());
    }
}
