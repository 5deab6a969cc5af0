//! URL and path helpers shared by the service boundary and the store.

use anyhow::Result;
use std::path::Path;
use url::Url;

use crate::error::ScanError;

/// Validate a caller-supplied target URL
///
/// A bare host such as `example.com/shop` gets `https://` prepended. Only
/// http and https targets with a host are accepted.
pub fn validate_target_url(raw: &str) -> Result<Url, ScanError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ScanError::Validation("URL is required".to_string()));
    }

    // `localhost:8080/x` parses as scheme `localhost` with opaque path `8080/x`
    let host_with_port =
        |url: &Url| url.cannot_be_a_base() && url.path().starts_with(|c: char| c.is_ascii_digit());
    let url = match Url::parse(trimmed) {
        Ok(url) if !host_with_port(&url) => Ok(url),
        Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("https://{trimmed}"))
        }
        Err(e) => Err(e),
    }
    .map_err(|e| ScanError::Validation(format!("Invalid URL '{trimmed}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ScanError::Validation(format!(
            "Unsupported URL scheme '{}', only http and https are allowed",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ScanError::Validation(format!("URL '{trimmed}' has no host")));
    }

    Ok(url)
}

/// Directory name used to namespace a site's scans under the storage base
#[must_use]
pub fn site_namespace(url: &Url) -> String {
    let host = url.host_str().unwrap_or("unknown-host");
    let host = host.trim_start_matches("www.");
    let name = match url.port() {
        Some(port) => format!("{host}_{port}"),
        None => host.to_string(),
    };
    sanitize_filename::sanitize(name)
}

/// Ensure the `.gitignore` sentinel exists at the storage root
///
/// Written with `*` and `!.gitignore` so stored assets never end up in
/// version control while the directory itself stays visible.
pub async fn ensure_storage_sentinel(base_dir: &Path) -> Result<()> {
    let sentinel = base_dir.join(crate::utils::STORAGE_SENTINEL);

    tokio::fs::create_dir_all(base_dir)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create storage directory: {e}"))?;

    if tokio::fs::try_exists(&sentinel)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to check sentinel existence: {e}"))?
    {
        return Ok(());
    }

    tokio::fs::write(&sentinel, "*\n!.gitignore\n")
        .await
        .map_err(|e| anyhow::anyhow!("Failed to write sentinel: {e}"))?;

    log::debug!("Created storage sentinel in {}", base_dir.display());

    Ok(())
}

/// Content type for a stored asset, derived from its extension
#[must_use]
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("svg") => "image/svg+xml",
        Some("bmp") => "image/bmp",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}
