//! Owned browser process plus its CDP event handler task

use chromiumoxide::browser::Browser;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::info;

/// Wrapper for Browser and its event handler task
///
/// The handler MUST be aborted when the browser goes away, otherwise it
/// keeps polling a dead websocket.
pub struct BrowserWrapper {
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
}

impl BrowserWrapper {
    pub(crate) fn new(browser: Browser, handler: JoinHandle<()>, user_data_dir: PathBuf) -> Self {
        Self {
            browser,
            handler,
            user_data_dir: Some(user_data_dir),
        }
    }

    pub(crate) fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Close the process, wait for exit, then drop the profile directory
    ///
    /// Best effort: a crashed process fails `close()` and that is fine.
    pub(crate) async fn close(&mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!("Browser close failed (process may already be gone): {e}");
        }
        if let Err(e) = self.browser.wait().await {
            tracing::debug!("Browser wait failed: {e}");
        }
        self.cleanup_temp_dir();
    }

    /// Remove the profile directory
    ///
    /// MUST run after `browser.wait()` so Chrome has released its file
    /// handles. Blocking because it also runs from `Drop`.
    pub fn cleanup_temp_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            info!("Cleaning up temp directory: {}", path.display());
            if let Err(e) = std::fs::remove_dir_all(&path) {
                tracing::warn!(
                    "Failed to clean up temp directory {}: {}. Manual cleanup may be required.",
                    path.display(),
                    e
                );
            }
        }
    }
}

impl Drop for BrowserWrapper {
    fn drop(&mut self) {
        self.handler.abort();

        if self.user_data_dir.is_some() {
            tracing::warn!(
                "BrowserWrapper dropped without explicit cleanup - removing temp dir in Drop"
            );
            self.cleanup_temp_dir();
        }
    }
}
