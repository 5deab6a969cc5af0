//! Headless-browser page fetcher
//!
//! Drives the shared browser through one page per call:
//!
//! 1. open a blank page, override user agent and viewport
//! 2. block fonts, media and stylesheets
//! 3. navigate with a bounded timeout, then wait for network idleness
//! 4. scroll the full height in fixed steps to trigger lazy content
//! 5. settle, then collect the DOM, shadow-root and constructed style text,
//!    and iframe documents
//!
//! Iframes are loaded one level deep, each through its own nested page.
//! Every page is closed on every exit path.

use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    SetBlockedUrLsParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use std::time::{Duration, Instant};
use url::Url;

use super::page_timeout::with_page_timeout;
use super::{FetchFuture, FrameDocument, PageContent, PageFetcher};
use crate::browser::BrowserManager;
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::utils::random_user_agent;

/// URL patterns for resource classes that never carry image references
const BLOCKED_RESOURCE_PATTERNS: &[&str] = &[
    "*.css", "*.woff", "*.woff2", "*.ttf", "*.otf", "*.eot", "*.mp4", "*.webm", "*.ogg",
    "*.mp3", "*.wav", "*.m4a", "*.mov",
];

/// Pixels per synthetic scroll step
const SCROLL_STEP_PX: u32 = 100;
/// Delay between scroll steps
const SCROLL_INTERVAL_MS: u32 = 100;
/// Hard cap on scroll steps so endless feeds terminate
const MAX_SCROLL_STEPS: u32 = 300;
/// Wait after scrolling for late lazy loads
const SETTLE_DELAY: Duration = Duration::from_millis(1000);
/// Iframe documents loaded per page
const MAX_IFRAMES: usize = 10;

/// Quiet period with no new resource loads that counts as network idle
const NETWORK_IDLE_WINDOW: Duration = Duration::from_millis(500);
/// Upper bound on the idle wait; rendering proceeds when it elapses
const NETWORK_IDLE_MAX_WAIT: Duration = Duration::from_secs(10);
const NETWORK_IDLE_POLL: Duration = Duration::from_millis(100);

const LOAD_STATE_SCRIPT: &str = r"(() => ({
    readyState: document.readyState,
    resources: performance.getEntriesByType('resource').length
}))()";

/// Style text the serialized DOM does not carry: shadow roots and
/// constructed stylesheets. Document `<style>` blocks are read from the HTML.
const OUT_OF_DOM_STYLES_SCRIPT: &str = r"(() => {
    const rules = (sheet) => {
        try { return Array.from(sheet.cssRules).map(r => r.cssText).join('\n'); }
        catch (e) { return ''; }
    };
    const out = (document.adoptedStyleSheets || []).map(rules);
    for (const el of document.querySelectorAll('*')) {
        const root = el.shadowRoot;
        if (!root) continue;
        root.querySelectorAll('style').forEach(s => out.push(s.textContent || ''));
        (root.adoptedStyleSheets || []).forEach(s => out.push(rules(s)));
    }
    return out.filter(text => text.length > 0);
})()";

const IFRAME_SOURCES_SCRIPT: &str =
    "Array.from(document.querySelectorAll('iframe[src]')).map(f => f.src)";

/// Headless-browser-based page loader
#[derive(Clone)]
pub struct RenderFetcher {
    browser: BrowserManager,
    timeout: Duration,
}

impl RenderFetcher {
    #[must_use]
    pub fn new(browser: BrowserManager, config: &ScanConfig) -> Self {
        Self {
            browser,
            timeout: config.request_timeout(),
        }
    }

    async fn fetch(&self, url: &Url) -> Result<PageContent, ScanError> {
        let page = PageGuard::new(self.open_page().await?);
        let outcome = self.render_main(page.page(), url).await;
        page.close().await;

        let (html, styles, iframe_urls) = outcome?;

        let mut iframes = Vec::new();
        for frame_url in iframe_urls.into_iter().take(MAX_IFRAMES) {
            match self.fetch_frame(&frame_url).await {
                Ok(html) => iframes.push(FrameDocument {
                    url: frame_url.to_string(),
                    html,
                }),
                Err(e) => {
                    log::debug!("Skipping iframe {frame_url}: {e}");
                }
            }
        }

        Ok(PageContent {
            html,
            styles,
            iframes,
        })
    }

    async fn open_page(&self) -> Result<Page, ScanError> {
        let page = with_page_timeout(
            async {
                self.browser
                    .new_page()
                    .await
                    .map_err(|e| ScanError::ExternalService(format!("Browser unavailable: {e:#}")))
            },
            self.timeout,
            "Browser page creation",
        )
        .await?;

        if let Err(e) = prepare_page(&page).await {
            let _ = page.close().await;
            return Err(e);
        }
        Ok(page)
    }

    /// Navigate, scroll, settle and serialize the target page
    async fn render_main(
        &self,
        page: &Page,
        url: &Url,
    ) -> Result<(String, Vec<String>, Vec<Url>), ScanError> {
        self.navigate(page, url).await?;

        with_page_timeout(
            async {
                let params = EvaluateParams::builder()
                    .expression(scroll_script())
                    .await_promise(true)
                    .return_by_value(true)
                    .build()
                    .map_err(|e| ScanError::Internal(format!("Invalid scroll script params: {e}")))?;
                page.evaluate_expression(params)
                    .await
                    .map(|_| ())
                    .map_err(cdp_error("Scroll"))
            },
            self.timeout + scroll_budget(),
            "Page scroll",
        )
        .await?;

        tokio::time::sleep(SETTLE_DELAY).await;

        let html = self.content(page).await?;

        let styles: Vec<String> = self
            .evaluate_json(page, OUT_OF_DOM_STYLES_SCRIPT)
            .await
            .unwrap_or_else(|e| {
                log::debug!("Style block collection failed for {url}: {e}");
                Vec::new()
            });

        let iframe_srcs: Vec<String> = self
            .evaluate_json(page, IFRAME_SOURCES_SCRIPT)
            .await
            .unwrap_or_else(|e| {
                log::debug!("Iframe discovery failed for {url}: {e}");
                Vec::new()
            });

        let iframe_urls = iframe_srcs
            .iter()
            .filter_map(|src| Url::parse(src).ok())
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .collect();

        Ok((html, styles, iframe_urls))
    }

    /// Child document of one iframe through a nested page
    async fn fetch_frame(&self, frame_url: &Url) -> Result<String, ScanError> {
        let page = PageGuard::new(self.open_page().await?);
        let outcome = async {
            self.navigate(page.page(), frame_url).await?;
            self.content(page.page()).await
        }
        .await;
        page.close().await;
        outcome
    }

    /// Load `url`, then wait for the network to go idle
    async fn navigate(&self, page: &Page, url: &Url) -> Result<(), ScanError> {
        with_page_timeout(
            async {
                page.goto(url.as_str())
                    .await
                    .map(|_| ())
                    .map_err(cdp_error("Navigation"))
            },
            self.timeout,
            "Page navigation",
        )
        .await?;

        wait_for_network_idle(page, url).await;
        Ok(())
    }

    async fn content(&self, page: &Page) -> Result<String, ScanError> {
        with_page_timeout(
            async { page.content().await.map_err(cdp_error("DOM serialization")) },
            self.timeout,
            "Page content",
        )
        .await
    }

    async fn evaluate_json<T: serde::de::DeserializeOwned>(
        &self,
        page: &Page,
        script: &str,
    ) -> Result<T, ScanError> {
        with_page_timeout(
            async {
                let result = page
                    .evaluate(script)
                    .await
                    .map_err(cdp_error("Script evaluation"))?;
                result
                    .into_value::<T>()
                    .map_err(|e| ScanError::ExternalService(format!("Unexpected script result: {e}")))
            },
            self.timeout,
            "Script evaluation",
        )
        .await
    }
}

impl PageFetcher for RenderFetcher {
    fn fetch_page<'a>(&'a self, url: &'a Url) -> FetchFuture<'a> {
        Box::pin(self.fetch(url))
    }
}

/// User agent, desktop viewport and resource blocking for a fresh page
async fn prepare_page(page: &Page) -> Result<(), ScanError> {
    page.execute(
        SetUserAgentOverrideParams::builder()
            .user_agent(random_user_agent())
            .accept_language("en-US,en;q=0.9")
            .build()
            .map_err(|e| ScanError::Internal(format!("Invalid user agent params: {e}")))?,
    )
    .await
    .map_err(cdp_error("User agent override"))?;

    page.execute(
        SetDeviceMetricsOverrideParams::builder()
            .width(1920)
            .height(1080)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| ScanError::Internal(format!("Invalid viewport params: {e}")))?,
    )
    .await
    .map_err(cdp_error("Viewport override"))?;

    page.execute(SetBlockedUrLsParams::new(
        BLOCKED_RESOURCE_PATTERNS
            .iter()
            .map(|p| (*p).to_string())
            .collect::<Vec<_>>(),
    ))
    .await
    .map_err(cdp_error("Resource blocking"))?;

    Ok(())
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadState {
    ready_state: String,
    resources: u64,
}

/// Tracks resource-count changes until a quiet window has passed
struct IdleTracker {
    resources: Option<u64>,
    quiet_since: Instant,
}

impl IdleTracker {
    fn new(now: Instant) -> Self {
        Self {
            resources: None,
            quiet_since: now,
        }
    }

    /// Record one observation; true once the document is complete and no
    /// resource load has started for a full idle window
    fn observe(&mut self, ready_state: &str, resources: u64, now: Instant) -> bool {
        if self.resources != Some(resources) {
            self.resources = Some(resources);
            self.quiet_since = now;
        }
        ready_state == "complete" && now.duration_since(self.quiet_since) >= NETWORK_IDLE_WINDOW
    }
}

/// Poll load state until the network is idle or the bound elapses
///
/// Never fails: a page that keeps loading is rendered as it stands.
async fn wait_for_network_idle(page: &Page, url: &Url) {
    let start = Instant::now();
    let mut tracker = IdleTracker::new(start);

    while start.elapsed() < NETWORK_IDLE_MAX_WAIT {
        match page.evaluate(LOAD_STATE_SCRIPT).await {
            Ok(result) => match result.into_value::<LoadState>() {
                Ok(state) => {
                    if tracker.observe(&state.ready_state, state.resources, Instant::now()) {
                        log::debug!(
                            "Network idle for {url} after {:.2}s",
                            start.elapsed().as_secs_f64()
                        );
                        return;
                    }
                }
                Err(e) => log::debug!("Unreadable load state for {url}: {e}"),
            },
            Err(e) => log::debug!("Load state check failed for {url}: {e}, retrying"),
        }
        tokio::time::sleep(NETWORK_IDLE_POLL).await;
    }

    log::warn!(
        "Network still busy on {url} after {}s, proceeding anyway",
        NETWORK_IDLE_MAX_WAIT.as_secs()
    );
}

/// Longest the scroll script can run on its own
fn scroll_budget() -> Duration {
    Duration::from_millis(u64::from(MAX_SCROLL_STEPS * SCROLL_INTERVAL_MS))
}

/// Fixed-step scroll to the bottom of the document, resolving when done
fn scroll_script() -> String {
    format!(
        r"new Promise((resolve) => {{
    let scrolled = 0;
    let steps = 0;
    const timer = setInterval(() => {{
        window.scrollBy(0, {SCROLL_STEP_PX});
        scrolled += {SCROLL_STEP_PX};
        steps += 1;
        const height = document.body ? document.body.scrollHeight : 0;
        if (scrolled >= height || steps >= {MAX_SCROLL_STEPS}) {{
            clearInterval(timer);
            resolve(true);
        }}
    }}, {SCROLL_INTERVAL_MS});
}})"
    )
}

fn cdp_error(operation: &'static str) -> impl Fn(chromiumoxide::error::CdpError) -> ScanError {
    move |e| match e {
        chromiumoxide::error::CdpError::Timeout => {
            ScanError::Timeout(format!("{operation} timed out in the browser"))
        }
        other => ScanError::ExternalService(format!("{operation} failed: {other}")),
    }
}

/// Closes its page when dropped without an explicit `close()`
///
/// Covers cancellation: if the enclosing future is dropped mid-render the
/// page is still released on the runtime.
struct PageGuard {
    page: Option<Page>,
}

impl PageGuard {
    fn new(page: Page) -> Self {
        Self { page: Some(page) }
    }

    fn page(&self) -> &Page {
        // Only `close` and `drop` take the page out
        self.page.as_ref().unwrap_or_else(|| unreachable!("page used after close"))
    }

    async fn close(mut self) {
        if let Some(page) = self.page.take()
            && let Err(e) = page.close().await
        {
            log::debug!("Page close error (tab leak): {e}");
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(page) = self.page.take()
            && let Ok(handle) = tokio::runtime::Handle::try_current()
        {
            handle.spawn(async move {
                let _ = page.close().await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scroll_script_is_bounded() {
        let script = scroll_script();
        assert!(script.contains("window.scrollBy(0, 100)"));
        assert!(script.contains("steps >= 300"));
        assert!(script.contains("}, 100);"));
    }

    #[test]
    fn idle_needs_complete_document_and_quiet_window() {
        let start = Instant::now();
        let mut tracker = IdleTracker::new(start);
        let at = |ms: u64| start + Duration::from_millis(ms);

        assert!(!tracker.observe("loading", 3, at(0)));
        assert!(!tracker.observe("complete", 3, at(300)));
        // A new resource restarts the quiet window
        assert!(!tracker.observe("complete", 4, at(600)));
        assert!(!tracker.observe("complete", 4, at(1000)));
        assert!(tracker.observe("complete", 4, at(1100)));
    }

    #[test]
    fn busy_document_is_never_idle() {
        let start = Instant::now();
        let mut tracker = IdleTracker::new(start);
        for step in 0..20u64 {
            assert!(!tracker.observe("complete", step, start + Duration::from_millis(step * 600)));
        }
    }

    #[test]
    fn document_style_blocks_are_left_to_the_html() {
        assert!(OUT_OF_DOM_STYLES_SCRIPT.contains("shadowRoot"));
        assert!(OUT_OF_DOM_STYLES_SCRIPT.contains("adoptedStyleSheets"));
        assert!(!OUT_OF_DOM_STYLES_SCRIPT.contains("document.querySelectorAll('style')"));
    }

    #[test]
    fn stylesheets_fonts_and_media_are_blocked() {
        for pattern in ["*.css", "*.woff2", "*.mp4"] {
            assert!(BLOCKED_RESOURCE_PATTERNS.contains(&pattern));
        }
        assert!(!BLOCKED_RESOURCE_PATTERNS.iter().any(|p| p.ends_with("png")));
    }
}
