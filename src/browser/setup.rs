//! Chrome discovery and launch for the render fetcher

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use chromiumoxide::Handler;
use futures::StreamExt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::utils::constants::CHROME_USER_AGENT;

/// Environment override for the browser binary
pub const CHROME_PATH_ENV: &str = "CHROMIUM_PATH";

/// Render viewport; pages lay out lazy images against it
const VIEWPORT: (u32, u32) = (1920, 1080);

/// Binary names probed on `PATH` (Unix only)
const PATH_CANDIDATES: &[&str] = &["chromium", "chromium-browser", "google-chrome", "chrome"];

/// Flags every render browser is launched with
const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-features=TranslateUI",
    "--disable-notifications",
    "--no-first-run",
    "--no-default-browser-check",
    "--no-sandbox",
    "--hide-scrollbars",
    "--mute-audio",
];

/// Well-known install locations for the current platform
fn install_locations() -> Vec<PathBuf> {
    let fixed: &[&str] = if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        &[
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/snap/bin/chromium",
        ]
    };
    fixed.iter().map(PathBuf::from).collect()
}

/// Locate an installed Chrome/Chromium
///
/// Order: `CHROMIUM_PATH`, well-known locations, then `which` on Unix.
pub fn find_browser_executable() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CHROME_PATH_ENV).map(PathBuf::from) {
        if path.exists() {
            debug!("Using browser from {CHROME_PATH_ENV}: {}", path.display());
            return Some(path);
        }
        warn!("{CHROME_PATH_ENV} points to a missing file: {}", path.display());
    }

    if let Some(path) = install_locations().into_iter().find(|p| p.exists()) {
        debug!("Found browser at {}", path.display());
        return Some(path);
    }

    if cfg!(target_os = "windows") {
        return None;
    }
    PATH_CANDIDATES.iter().find_map(|name| {
        let output = Command::new("which").arg(name).output().ok()?;
        let found = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (output.status.success() && !found.is_empty()).then(|| PathBuf::from(found))
    })
}

/// Download a managed Chromium into the user cache and return its binary
pub async fn download_managed_browser() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("kodegen")
        .join("imgscan-chromium");
    tokio::fs::create_dir_all(&cache_dir)
        .await
        .with_context(|| format!("Failed to create {}", cache_dir.display()))?;

    info!("No local browser; downloading Chromium into {}", cache_dir.display());
    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .context("Failed to build fetcher options")?,
    );
    let revision = fetcher.fetch().await.context("Failed to download Chromium")?;

    Ok(revision.executable_path)
}

/// Fresh profile directory per launch
///
/// A relaunch after a crash would otherwise trip over the stale
/// `SingletonLock` of the dead instance.
fn unique_profile_dir() -> PathBuf {
    std::env::temp_dir().join(format!("kodegen_imgscan_chrome_{}", Uuid::new_v4()))
}

/// Launch the render browser
///
/// Returns the browser, its CDP event pump, and the profile directory that
/// MUST be removed once the process has exited.
pub async fn launch_browser(
    headless: bool,
    request_timeout: Duration,
) -> Result<(Browser, JoinHandle<()>, PathBuf)> {
    let executable = match find_browser_executable() {
        Some(path) => path,
        None => download_managed_browser().await?,
    };

    let profile_dir = unique_profile_dir();
    tokio::fs::create_dir_all(&profile_dir)
        .await
        .context("Failed to create browser profile directory")?;

    let mut builder = BrowserConfigBuilder::default()
        .chrome_executable(executable)
        .user_data_dir(profile_dir.clone())
        .request_timeout(request_timeout)
        .window_size(VIEWPORT.0, VIEWPORT.1)
        .arg(format!("--user-agent={CHROME_USER_AGENT}"));
    builder = if headless {
        builder.headless_mode(HeadlessMode::default())
    } else {
        builder.with_head()
    };
    for flag in LAUNCH_ARGS {
        builder = builder.arg(*flag);
    }

    let config = builder
        .build()
        .map_err(|e| anyhow::anyhow!("Invalid browser config: {e}"))?;

    info!("Launching render browser (headless: {headless})");
    let (browser, handler) = Browser::launch(config)
        .await
        .context("Failed to launch browser")?;

    Ok((browser, spawn_event_pump(handler), profile_dir))
}

/// Drive the CDP handler until the connection closes
fn spawn_event_pump(mut handler: Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            let Err(e) = event else { continue };
            let message = e.to_string();
            // chromiumoxide cannot decode every event newer Chrome emits
            if message.contains("did not match any variant of untagged enum Message")
                || message.contains("Failed to deserialize WS response")
            {
                trace!("Ignored undecodable CDP event: {message}");
            } else {
                warn!("Browser event handler error: {e}");
            }
        }
        debug!("Browser event pump finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_dirs_are_unique() {
        assert_ne!(unique_profile_dir(), unique_profile_dir());
    }

    #[test]
    fn launch_flags_disable_automation_banner() {
        assert!(LAUNCH_ARGS.contains(&"--disable-blink-features=AutomationControlled"));
        assert!(LAUNCH_ARGS.iter().all(|flag| flag.starts_with("--")));
    }
}
