//! Canonicalization and filtering of raw asset URLs.
//!
//! Every string pulled out of a page goes through [`normalize`] before it can
//! become an asset candidate. The checks run in a fixed order:
//!
//! 1. trim whitespace and control characters
//! 2. reject `data:`, `javascript:` and `about:` references
//! 3. resolve protocol-relative, root-relative and relative references
//! 4. reject anything that is not http or https
//! 5. strip the fragment
//! 6. keep only query parameters that change the rendered image
//! 7. require a recognized image extension on the path
//!
//! Extension-less CDN paths are rejected on purpose: precision over recall.

use url::Url;

/// Schemes that never point at a downloadable asset
const REJECTED_SCHEMES: &[&str] = &["data:", "javascript:", "about:"];

/// Query parameters that affect the rendered output and survive normalization
pub const ALLOWED_QUERY_PARAMS: &[&str] = &[
    "width", "w", "height", "h", "quality", "q", "format", "version", "v", "id", "size",
];

/// Path extensions accepted as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "avif", "svg", "bmp"];

/// Normalize a raw URL string found on `page_url`
///
/// Returns `None` for anything that is not an absolute http(s) image URL
/// after resolution. Rejections are not errors; callers drop them silently.
///
/// Applying `normalize` to its own output returns the same string.
#[must_use]
pub fn normalize(raw: &str, page_url: &Url) -> Option<String> {
    let trimmed = raw.trim_matches(|c: char| c.is_whitespace() || c.is_control());
    if trimmed.is_empty() {
        return None;
    }

    if has_rejected_scheme(trimmed) {
        return None;
    }

    let mut url = resolve(trimmed, page_url)?;

    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    if url.host_str().is_none_or(str::is_empty) {
        return None;
    }

    url.set_fragment(None);
    filter_query(&mut url);

    if !has_image_extension(&url) {
        return None;
    }

    Some(url.into())
}

/// Case-insensitive prefix check against the rejected schemes
fn has_rejected_scheme(value: &str) -> bool {
    REJECTED_SCHEMES.iter().any(|scheme| {
        value
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

fn resolve(reference: &str, page_url: &Url) -> Option<Url> {
    if let Some(rest) = reference.strip_prefix("//") {
        // Protocol-relative: borrow the page's scheme
        return Url::parse(&format!("{}://{rest}", page_url.scheme())).ok();
    }

    if reference.starts_with('/') {
        // Root-relative: resolve against the origin, never the page path
        let origin = page_url.join("/").ok()?;
        return origin.join(reference).ok();
    }

    page_url.join(reference).ok()
}

/// Drop every query pair that is not allow-listed, preserving order
fn filter_query(url: &mut Url) {
    if url.query().is_none() {
        return;
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| {
            ALLOWED_QUERY_PARAMS
                .iter()
                .any(|allowed| key.eq_ignore_ascii_case(allowed))
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
}

fn has_image_extension(url: &Url) -> bool {
    let Some(last_segment) = url.path_segments().and_then(|mut segments| segments.next_back())
    else {
        return false;
    };

    let Some((_, ext)) = last_segment.rsplit_once('.') else {
        return false;
    };

    IMAGE_EXTENSIONS
        .iter()
        .any(|allowed| ext.eq_ignore_ascii_case(allowed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn page() -> Url {
        Url::parse("https://shop.example.com/products/item.html?ref=home").expect("page url")
    }

    #[test]
    fn resolves_every_reference_form() {
        let page = page();
        assert_eq!(
            normalize("//cdn.example.com/a.png", &page).as_deref(),
            Some("https://cdn.example.com/a.png")
        );
        assert_eq!(
            normalize("/static/b.jpg", &page).as_deref(),
            Some("https://shop.example.com/static/b.jpg")
        );
        assert_eq!(
            normalize("thumbs/c.webp", &page).as_deref(),
            Some("https://shop.example.com/products/thumbs/c.webp")
        );
        assert_eq!(
            normalize("../d.gif", &page).as_deref(),
            Some("https://shop.example.com/d.gif")
        );
    }

    #[test]
    fn trims_whitespace_and_control_characters() {
        assert_eq!(
            normalize("\n\t  https://a.test/x.PNG \u{0}", &page()).as_deref(),
            Some("https://a.test/x.PNG")
        );
        assert_eq!(normalize("   ", &page()), None);
    }

    #[test]
    fn rejects_non_http_and_pseudo_schemes() {
        let page = page();
        assert_eq!(normalize("data:image/png;base64,AAAA", &page), None);
        assert_eq!(normalize("JavaScript:void(0)", &page), None);
        assert_eq!(normalize("about:blank", &page), None);
        assert_eq!(normalize("ftp://files.test/a.png", &page), None);
        assert_eq!(normalize("mailto:a@b.png", &page), None);
    }

    #[test]
    fn keeps_only_allow_listed_query_parameters() {
        let normalized = normalize(
            "https://cdn.test/img.jpg?utm_source=x&w=300&cb=123&format=webp#frag",
            &page(),
        );
        assert_eq!(
            normalized.as_deref(),
            Some("https://cdn.test/img.jpg?w=300&format=webp")
        );

        assert_eq!(
            normalize("https://cdn.test/img.jpg?cb=1", &page()).as_deref(),
            Some("https://cdn.test/img.jpg")
        );
    }

    #[test]
    fn requires_image_extension() {
        let page = page();
        assert_eq!(normalize("https://cdn.test/image/upload/abc123", &page), None);
        assert_eq!(normalize("https://cdn.test/photo.png.html", &page), None);
        assert_eq!(normalize("https://cdn.test/", &page), None);
        assert!(normalize("https://cdn.test/photo.AVIF", &page).is_some());
        assert!(normalize("https://cdn.test/logo.svg?v=2", &page).is_some());
    }

    #[test]
    fn garbage_yields_none() {
        assert_eq!(normalize("http://[::1", &page()), None);
        assert_eq!(normalize("https://", &page()), None);
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(
            raw in r"(https?://[a-z]{1,8}\.(com|test)|//[a-z]{1,6}\.net|/|\.\./)?[a-zA-Z0-9_/ -]{0,16}\.(png|jpg|JPEG|txt|webp)(\?[a-z]{1,6}=[a-z0-9 %]{0,5}(&[a-z]{1,6}=[a-z0-9]{0,4}){0,3})?(#[a-z]{0,5})?"
        ) {
            let page = page();
            if let Some(first) = normalize(&raw, &page) {
                prop_assert_eq!(normalize(&first, &page), Some(first.clone()));
            }
        }

        #[test]
        fn pseudo_schemes_never_normalize(
            scheme in prop_oneof![Just("data:"), Just("javascript:"), Just("about:"), Just("DATA:"), Just("JavaScript:")],
            rest in r"[ -~]{0,40}"
        ) {
            let raw = format!("{scheme}{rest}");
            prop_assert_eq!(normalize(&raw, &page()), None);
        }
    }
}
