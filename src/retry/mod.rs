//! Retry and fallback controller for page fetches
//!
//! An explicit state machine over `Attempt(strategy, n)`. Each failed
//! attempt moves to one of three states:
//!
//! - `Retry`: same strategy, next attempt, after a jittered delay
//! - `Fallback`: primary chain exhausted, switch once to the alternate
//! - `Fail`: both chains exhausted
//!
//! Every failed attempt leaves one line in the error list; the switch
//! itself is only logged.

use rand::Rng;
use std::time::Duration;
use url::Url;

use crate::config::ScanConfig;
use crate::extractor::PageContent;
use crate::fetch::{FetchStrategy, FetcherSet};

/// Next state after an attempt settles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Success,
    Retry,
    Fallback,
    Fail,
}

/// Decide where a failed attempt leads
///
/// Non-retryable errors end the current chain immediately.
#[must_use]
pub fn after_failure(attempt: u32, max_attempts: u32, fell_back: bool, retryable: bool) -> Transition {
    if retryable && attempt < max_attempts {
        Transition::Retry
    } else if fell_back {
        Transition::Fail
    } else {
        Transition::Fallback
    }
}

/// Terminal result of a controlled fetch
#[derive(Debug)]
pub enum RetryOutcome {
    Fetched {
        strategy: FetchStrategy,
        content: PageContent,
        errors: Vec<String>,
    },
    Exhausted {
        /// Strategy of the last chain that ran
        strategy: FetchStrategy,
        errors: Vec<String>,
    },
}

impl RetryOutcome {
    #[must_use]
    pub fn strategy(&self) -> FetchStrategy {
        match self {
            Self::Fetched { strategy, .. } | Self::Exhausted { strategy, .. } => *strategy,
        }
    }

    #[must_use]
    pub fn errors(&self) -> &[String] {
        match self {
            Self::Fetched { errors, .. } | Self::Exhausted { errors, .. } => errors,
        }
    }
}

/// Drives fetch attempts across both strategies
#[derive(Debug, Clone)]
pub struct RetryController {
    static_attempts: u32,
    render_attempts: u32,
    jitter_min_ms: u64,
    jitter_max_ms: u64,
}

impl RetryController {
    #[must_use]
    pub fn new(config: &ScanConfig) -> Self {
        let (jitter_min_ms, jitter_max_ms) = config.retry_jitter_ms();
        Self {
            static_attempts: config.static_attempts(),
            render_attempts: config.render_attempts(),
            jitter_min_ms,
            jitter_max_ms,
        }
    }

    #[must_use]
    pub const fn max_attempts(&self, strategy: FetchStrategy) -> u32 {
        match strategy {
            FetchStrategy::Static => self.static_attempts,
            FetchStrategy::Render => self.render_attempts,
        }
    }

    fn jitter(&self) -> Duration {
        if self.jitter_max_ms == 0 {
            return Duration::ZERO;
        }
        let ms = rand::rng().random_range(self.jitter_min_ms..=self.jitter_max_ms);
        Duration::from_millis(ms)
    }

    /// Fetch `url` starting with `primary`, falling back once
    pub async fn run(
        &self,
        url: &Url,
        primary: FetchStrategy,
        fetchers: &FetcherSet<'_>,
    ) -> RetryOutcome {
        let mut errors = Vec::new();
        let mut strategy = primary;
        let mut attempt = 1;
        let mut fell_back = false;

        loop {
            let max_attempts = self.max_attempts(strategy);
            log::debug!("{strategy} attempt {attempt}/{max_attempts} for {url}");

            let error = match fetchers.get(strategy).fetch_page(url).await {
                Ok(content) => {
                    log::info!("Fetched {url} with {strategy} on attempt {attempt}/{max_attempts}");
                    return RetryOutcome::Fetched {
                        strategy,
                        content,
                        errors,
                    };
                }
                Err(e) => e,
            };

            log::warn!("{strategy} attempt {attempt}/{max_attempts} failed for {url}: {error}");
            errors.push(format!("{strategy} attempt {attempt}/{max_attempts} failed: {error}"));

            match after_failure(attempt, max_attempts, fell_back, error.is_retryable()) {
                Transition::Retry => {
                    tokio::time::sleep(self.jitter()).await;
                    attempt += 1;
                }
                Transition::Fallback => {
                    let next = strategy.alternate();
                    log::info!("{strategy} exhausted for {url}, falling back to {next}");
                    strategy = next;
                    attempt = 1;
                    fell_back = true;
                }
                Transition::Fail | Transition::Success => {
                    log::warn!("All fetch strategies exhausted for {url}");
                    return RetryOutcome::Exhausted { strategy, errors };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use crate::fetch::{FetchFuture, PageFetcher};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Scripted {
        calls: AtomicU32,
        fail_first: u32,
        error: ScanError,
    }

    impl Scripted {
        fn new(fail_first: u32, error: ScanError) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_first,
                error,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PageFetcher for Scripted {
        fn fetch_page<'a>(&'a self, _url: &'a Url) -> FetchFuture<'a> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= self.fail_first {
                    Err(self.error.clone())
                } else {
                    Ok(PageContent::from_html("<html></html>".to_string()))
                }
            })
        }
    }

    fn controller() -> RetryController {
        let config = ScanConfig::builder()
            .storage_dir("/tmp/imgscan-test")
            .retry_jitter_ms(0, 0)
            .build()
            .expect("config");
        RetryController::new(&config)
    }

    fn url() -> Url {
        Url::parse("https://example.com/").expect("url")
    }

    #[test]
    fn transitions() {
        assert_eq!(after_failure(1, 3, false, true), Transition::Retry);
        assert_eq!(after_failure(3, 3, false, true), Transition::Fallback);
        assert_eq!(after_failure(1, 3, false, false), Transition::Fallback);
        assert_eq!(after_failure(2, 2, true, true), Transition::Fail);
    }

    #[tokio::test]
    async fn falls_back_after_primary_exhaustion() {
        let static_fetcher = Scripted::new(u32::MAX, ScanError::Timeout("slow".into()));
        let render_fetcher = Scripted::new(0, ScanError::Timeout("unused".into()));
        let fetchers = FetcherSet {
            static_fetcher: &static_fetcher,
            render_fetcher: &render_fetcher,
        };

        let outcome = controller().run(&url(), FetchStrategy::Static, &fetchers).await;

        assert_eq!(outcome.strategy(), FetchStrategy::Render);
        assert_eq!(outcome.errors().len(), 3);
        assert!(outcome.errors()[0].starts_with("static attempt 1/3 failed"));
        assert!(outcome.errors()[2].starts_with("static attempt 3/3 failed"));
        assert_eq!(static_fetcher.calls(), 3);
        assert_eq!(render_fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn exhausts_both_chains_once() {
        let static_fetcher = Scripted::new(u32::MAX, ScanError::ExternalService("503".into()));
        let render_fetcher = Scripted::new(u32::MAX, ScanError::ExternalService("crash".into()));
        let fetchers = FetcherSet {
            static_fetcher: &static_fetcher,
            render_fetcher: &render_fetcher,
        };

        let outcome = controller().run(&url(), FetchStrategy::Render, &fetchers).await;

        assert!(matches!(outcome, RetryOutcome::Exhausted { .. }));
        assert_eq!(outcome.errors().len(), 5);
        assert_eq!(render_fetcher.calls(), 2);
        assert_eq!(static_fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn first_success_records_no_errors() {
        let static_fetcher = Scripted::new(0, ScanError::Timeout("unused".into()));
        let render_fetcher = Scripted::new(0, ScanError::Timeout("unused".into()));
        let fetchers = FetcherSet {
            static_fetcher: &static_fetcher,
            render_fetcher: &render_fetcher,
        };

        let outcome = controller().run(&url(), FetchStrategy::Static, &fetchers).await;
        assert_eq!(outcome.strategy(), FetchStrategy::Static);
        assert!(outcome.errors().is_empty());
        assert_eq!(render_fetcher.calls(), 0);
    }
}
