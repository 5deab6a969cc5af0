//! One-shot environment loader for `ScanConfig`
//!
//! Reads every `IMGSCAN_*` variable once at startup. Unparseable values are
//! reported as errors instead of silently falling back to defaults.

use anyhow::{Context, Result, anyhow};
use std::path::PathBuf;
use std::str::FromStr;

use super::types::ScanConfig;

pub const ENV_STORAGE_DIR: &str = "IMGSCAN_STORAGE_DIR";
pub const ENV_ALWAYS_RENDER: &str = "IMGSCAN_ALWAYS_RENDER";
pub const ENV_RENDER_DOMAINS: &str = "IMGSCAN_RENDER_DOMAINS";
pub const ENV_MIN_WIDTH: &str = "IMGSCAN_MIN_WIDTH";
pub const ENV_MIN_HEIGHT: &str = "IMGSCAN_MIN_HEIGHT";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "IMGSCAN_REQUEST_TIMEOUT_SECS";
pub const ENV_IMAGE_TIMEOUT_SECS: &str = "IMGSCAN_IMAGE_TIMEOUT_SECS";
pub const ENV_CACHE_TTL_SECS: &str = "IMGSCAN_CACHE_TTL_SECS";
pub const ENV_CACHE_MAX_BYTES: &str = "IMGSCAN_CACHE_MAX_BYTES";
pub const ENV_FILE_TTL_SECS: &str = "IMGSCAN_FILE_TTL_SECS";
pub const ENV_PURGE_INTERVAL_SECS: &str = "IMGSCAN_PURGE_INTERVAL_SECS";
pub const ENV_QUEUE_WORKERS: &str = "IMGSCAN_QUEUE_WORKERS";
pub const ENV_HEADLESS: &str = "IMGSCAN_HEADLESS";

impl ScanConfig {
    /// Build the process configuration from `IMGSCAN_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let storage_dir = get(ENV_STORAGE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(default_storage_dir);

        let mut builder = ScanConfig::builder().storage_dir(storage_dir);
        let defaults = ScanConfig::default();

        builder = builder.min_dimensions(
            parse_or(get(ENV_MIN_WIDTH), ENV_MIN_WIDTH, defaults.min_width)?,
            parse_or(get(ENV_MIN_HEIGHT), ENV_MIN_HEIGHT, defaults.min_height)?,
        );
        builder = builder
            .request_timeout_secs(parse_or(
                get(ENV_REQUEST_TIMEOUT_SECS),
                ENV_REQUEST_TIMEOUT_SECS,
                defaults.request_timeout_secs,
            )?)
            .image_timeout_secs(parse_or(
                get(ENV_IMAGE_TIMEOUT_SECS),
                ENV_IMAGE_TIMEOUT_SECS,
                defaults.image_timeout_secs,
            )?)
            .cache_ttl_secs(parse_or(
                get(ENV_CACHE_TTL_SECS),
                ENV_CACHE_TTL_SECS,
                defaults.cache_ttl_secs,
            )?)
            .cache_max_bytes(parse_or(
                get(ENV_CACHE_MAX_BYTES),
                ENV_CACHE_MAX_BYTES,
                defaults.cache_max_bytes,
            )?)
            .file_ttl_secs(parse_or(
                get(ENV_FILE_TTL_SECS),
                ENV_FILE_TTL_SECS,
                defaults.file_ttl_secs,
            )?)
            .purge_interval_secs(parse_or(
                get(ENV_PURGE_INTERVAL_SECS),
                ENV_PURGE_INTERVAL_SECS,
                defaults.purge_interval_secs,
            )?)
            .queue_workers(parse_or(
                get(ENV_QUEUE_WORKERS),
                ENV_QUEUE_WORKERS,
                defaults.queue_workers,
            )?)
            .always_render(parse_flag(get(ENV_ALWAYS_RENDER), ENV_ALWAYS_RENDER, false)?)
            .headless(parse_flag(get(ENV_HEADLESS), ENV_HEADLESS, true)?);

        if let Some(domains) = get(ENV_RENDER_DOMAINS) {
            builder = builder.render_domains(domains.split(','));
        }

        builder.build()
    }
}

/// `<data_local_dir>/kodegen/imgscan`, or the temp dir when no home exists
fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| {
            let fallback = std::env::temp_dir();
            tracing::warn!(
                "Could not determine local data directory, using temp directory fallback: {}",
                fallback.display()
            );
            fallback
        })
        .join("kodegen")
        .join("imgscan")
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Invalid value for {key}: '{raw}'")),
        None => Ok(default),
    }
}

fn parse_flag(value: Option<String>, key: &str, default: bool) -> Result<bool> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(anyhow!("Invalid boolean for {key}: '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = ScanConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(config.min_width(), 100);
        assert_eq!(config.min_height(), 100);
        assert!(!config.always_render());
        assert!(config.render_domains().iter().any(|d| d == "shopify.com"));
        assert!(config.storage_dir().ends_with("imgscan"));
    }

    #[test]
    fn overrides_are_applied() {
        let config = ScanConfig::from_lookup(lookup(&[
            (ENV_STORAGE_DIR, "/srv/scans"),
            (ENV_ALWAYS_RENDER, "TRUE"),
            (ENV_RENDER_DOMAINS, "example.com, shop.test ,"),
            (ENV_MIN_WIDTH, "64"),
            (ENV_CACHE_TTL_SECS, "10"),
        ]))
        .expect("config");

        assert_eq!(config.storage_dir(), &PathBuf::from("/srv/scans"));
        assert!(config.always_render());
        assert_eq!(config.render_domains(), ["example.com", "shop.test"]);
        assert_eq!(config.min_width(), 64);
        assert_eq!(config.cache_ttl().as_secs(), 10);
    }

    #[test]
    fn garbage_numbers_are_errors() {
        let result = ScanConfig::from_lookup(lookup(&[(ENV_MIN_HEIGHT, "tall")]));
        assert!(result.is_err());
        let result = ScanConfig::from_lookup(lookup(&[(ENV_HEADLESS, "maybe")]));
        assert!(result.is_err());
    }

    #[test]
    fn zero_purge_interval_from_environment_is_an_error() {
        let result = ScanConfig::from_lookup(lookup(&[(ENV_PURGE_INTERVAL_SECS, "0")]));
        assert!(result.is_err());
    }
}
