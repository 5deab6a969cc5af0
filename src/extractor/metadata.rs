//! Structured metadata signals: meta tags, `image_src` links and JSON-LD

use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;

use super::CandidateCollector;
use super::types::SignalSource;

static META_TAGS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("meta[content]").expect("BUG: hardcoded CSS selector 'meta[content]' is invalid")
});

static IMAGE_SRC_LINKS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("link[rel~='image_src'][href]")
        .expect("BUG: hardcoded CSS selector 'link[rel~=image_src]' is invalid")
});

static JSON_LD: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("script[type='application/ld+json']")
        .expect("BUG: hardcoded CSS selector 'script[type=ld+json]' is invalid")
});

/// Meta keys mentioning "image" that describe the image instead of locating it
const NON_LOCATION_SUFFIXES: &[&str] = &[":width", ":height", ":alt", ":type"];

pub(super) fn collect_metadata(
    document: &Html,
    collector: &mut CandidateCollector<'_>,
    source: SignalSource,
) {
    for meta in document.select(&META_TAGS) {
        let element = meta.value();
        let key = element
            .attr("property")
            .or_else(|| element.attr("name"))
            .or_else(|| element.attr("itemprop"))
            .unwrap_or_default()
            .to_ascii_lowercase();

        if !key.contains("image") || NON_LOCATION_SUFFIXES.iter().any(|s| key.ends_with(s)) {
            continue;
        }
        if let Some(content) = element.attr("content") {
            collector.push(content, source);
        }
    }

    for link in document.select(&IMAGE_SRC_LINKS) {
        if let Some(href) = link.value().attr("href") {
            collector.push(href, source);
        }
    }

    for script in document.select(&JSON_LD) {
        let text: String = script.text().collect();
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(value) => {
                for url in json_ld_images(&value) {
                    collector.push(url, source);
                }
            }
            Err(e) => {
                log::debug!("Skipping unparseable JSON-LD block: {e}");
            }
        }
    }
}

/// Every string reachable through a key whose name contains "image"
///
/// Matching is case-insensitive and applies at any depth. Once inside an
/// image-keyed value, every nested string is collected, so
/// `{"image": {"url": "a.jpg"}}` and `{"images": ["a.jpg", "b.jpg"]}` both
/// yield their URLs.
#[must_use]
pub fn json_ld_images(value: &Value) -> Vec<&str> {
    let mut out = Vec::new();
    walk(value, false, &mut out);
    out
}

fn walk<'a>(value: &'a Value, inside_image: bool, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) if inside_image => out.push(s),
        Value::Array(items) => {
            for item in items {
                walk(item, inside_image, out);
            }
        }
        Value::Object(map) => {
            for (key, child) in map {
                let image_key = inside_image || key.to_ascii_lowercase().contains("image");
                walk(child, image_key, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn walks_nested_objects_and_arrays() {
        let doc = json!({
            "@type": "Product",
            "name": "Chair",
            "logo": "logo.png",
            "image": ["a.jpg", {"@type": "ImageObject", "url": "b.jpg"}],
            "offers": {
                "seller": {"thumbnailImage": "c.png"},
                "primaryImageOfPage": {"contentUrl": "d.webp"}
            },
            "@graph": [{"ImageURL": "e.gif"}]
        });

        let mut found = json_ld_images(&doc);
        found.sort_unstable();
        assert_eq!(
            found,
            vec!["ImageObject", "a.jpg", "b.jpg", "c.png", "d.webp", "e.gif"]
        );
    }

    #[test]
    fn ignores_strings_outside_image_keys() {
        let doc = json!({"url": "page.png", "thumbnail": "t.png"});
        assert!(json_ld_images(&doc).is_empty());
    }
}
