//! Browser lifecycle manager for the render fetcher
//!
//! One chromiumoxide browser is shared by every render fetch in the process.
//! It is launched on first use, health-checked on every acquisition and
//! relaunched after a crash. Pages are never shared: each caller gets its own.

pub mod setup;
pub mod wrapper;

use anyhow::{Context, Result};
use chromiumoxide::Page;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

pub use setup::{download_managed_browser, find_browser_executable, launch_browser};
pub use wrapper::BrowserWrapper;

/// Owner of the shared browser instance
///
/// # Lifecycle
/// - Browser NOT launched on manager creation (lazy initialization)
/// - First `new_page()` call launches the browser
/// - Later calls reuse it while the `version()` health check passes
/// - A failed health check closes the crashed instance and relaunches
/// - `shutdown()` closes the browser explicitly
#[derive(Clone)]
pub struct BrowserManager {
    browser: Arc<Mutex<Option<BrowserWrapper>>>,
    headless: bool,
    request_timeout: Duration,
}

impl BrowserManager {
    /// Create a new browser manager; nothing is launched yet
    #[must_use]
    pub fn new(headless: bool, request_timeout: Duration) -> Self {
        Self {
            browser: Arc::new(Mutex::new(None)),
            headless,
            request_timeout,
        }
    }

    /// Open a fresh blank page on a healthy browser
    ///
    /// The lock is held while the page is created so a concurrent caller
    /// cannot observe a half-relaunched browser.
    pub async fn new_page(&self) -> Result<Page> {
        let mut guard = self.browser.lock().await;

        if let Some(wrapper) = guard.as_ref() {
            match wrapper.browser().version().await {
                Ok(_) => {
                    tracing::debug!("Browser health check passed, reusing existing browser");
                }
                Err(e) => {
                    tracing::warn!("Browser health check failed: {}. Triggering recovery...", e);
                    if let Some(mut crashed) = guard.take() {
                        crashed.close().await;
                    }
                    tracing::info!("Crashed browser cleaned up, launching new instance");
                }
            }
        }

        if guard.is_none() {
            tracing::info!("Launching browser (first time or after recovery)");
            let (browser, handler, user_data_dir) =
                launch_browser(self.headless, self.request_timeout).await?;
            *guard = Some(BrowserWrapper::new(browser, handler, user_data_dir));
        }

        let wrapper = guard
            .as_ref()
            .context("Browser missing right after launch")?;

        wrapper
            .browser()
            .new_page("about:blank")
            .await
            .context("Failed to create blank page")
    }

    /// Whether a browser process is currently held
    pub async fn is_running(&self) -> bool {
        self.browser.lock().await.is_some()
    }

    /// Shutdown the browser if running
    ///
    /// Safe to call multiple times (subsequent calls are no-ops).
    pub async fn shutdown(&self) -> Result<()> {
        let mut guard = self.browser.lock().await;

        if let Some(mut wrapper) = guard.take() {
            info!("Shutting down render browser");
            wrapper.close().await;
        }

        Ok(())
    }
}
