//! Image metadata probing
//!
//! Raster formats go through the `image` crate's header decoders; only the
//! header is read, never the full bitmap. SVG has no intrinsic raster size,
//! so its root element's `width`/`height` attributes are used, falling
//! back to the `viewBox` extent.

use image::{ImageFormat, ImageReader};
use regex::Regex;
use std::io::Cursor;
use std::sync::LazyLock;

/// Dimensions and format of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    /// Lowercase format name, also used as the stored file extension
    pub format: &'static str,
}

static SVG_ROOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<svg\b([^>]*)>").expect("BUG: hardcoded SVG root regex is invalid")
});

static SVG_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(width|height|viewBox)\s*=\s*["']([^"']*)["']"#)
        .expect("BUG: hardcoded SVG attribute regex is invalid")
});

/// Probe a downloaded payload; `None` when it is not a readable image
#[must_use]
pub fn probe(bytes: &[u8]) -> Option<ImageInfo> {
    if looks_like_svg(bytes) {
        return probe_svg(bytes);
    }

    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format().ok()?;
    let format = format_name(reader.format()?)?;
    let (width, height) = reader.into_dimensions().ok()?;
    Some(ImageInfo {
        width,
        height,
        format,
    })
}

fn format_name(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("png"),
        ImageFormat::Jpeg => Some("jpg"),
        ImageFormat::Gif => Some("gif"),
        ImageFormat::WebP => Some("webp"),
        ImageFormat::Bmp => Some("bmp"),
        ImageFormat::Avif => Some("avif"),
        _ => None,
    }
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    let text = String::from_utf8_lossy(head);
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    (trimmed.starts_with("<?xml") || trimmed.starts_with("<svg") || trimmed.starts_with("<!--"))
        && text.to_ascii_lowercase().contains("<svg")
}

fn probe_svg(bytes: &[u8]) -> Option<ImageInfo> {
    let text = std::str::from_utf8(bytes).ok()?;
    let attributes = SVG_ROOT.captures(text)?.get(1)?.as_str();

    let mut width = None;
    let mut height = None;
    let mut view_box = None;
    for caps in SVG_ATTRIBUTE.captures_iter(attributes) {
        let value = caps.get(2).map_or("", |m| m.as_str());
        match caps.get(1).map(|m| m.as_str().to_ascii_lowercase()).as_deref() {
            Some("width") => width = svg_length(value),
            Some("height") => height = svg_length(value),
            Some("viewbox") => view_box = svg_view_box(value),
            _ => {}
        }
    }

    let (width, height) = match (width, height, view_box) {
        (Some(w), Some(h), _) => (w, h),
        (_, _, Some((w, h))) => (width.unwrap_or(w), height.unwrap_or(h)),
        _ => return None,
    };

    Some(ImageInfo {
        width,
        height,
        format: "svg",
    })
}

/// Absolute length in user units; percentages have no intrinsic size
fn svg_length(value: &str) -> Option<u32> {
    let value = value.trim();
    if value.ends_with('%') {
        return None;
    }
    let numeric = value.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let parsed: f64 = numeric.trim().parse().ok()?;
    (parsed.is_finite() && parsed > 0.0).then(|| parsed.round() as u32)
}

fn svg_view_box(value: &str) -> Option<(u32, u32)> {
    let parts: Vec<f64> = value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [_, _, w, h] if *w > 0.0 && *h > 0.0 => Some((w.round() as u32, h.round() as u32)),
        _ => None,
    }
}
