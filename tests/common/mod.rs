//! Test utilities shared by the image scan integration tests

use image::{ImageBuffer, ImageFormat, Rgb};
use kodegen_tools_imgscan::{
    FetchFuture, ImageScanService, JobState, JobStatus, PageContent, PageFetcher, ScanConfig,
    ScanError,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

/// Encodes a solid PNG of the given size
#[allow(dead_code)]
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = ImageBuffer::from_pixel(width, height, Rgb([200u8, 40, 40]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode png");
    bytes
}

/// Wraps `body` in a minimal HTML document
#[allow(dead_code)]
pub fn html_page(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>Fixture</title></head>
<body>
{body}
</body>
</html>"#
    )
}

/// Configuration rooted in `dir` with retry jitter disabled
#[allow(dead_code)]
pub fn test_config(dir: &Path) -> ScanConfig {
    ScanConfig::builder()
        .storage_dir(dir)
        .retry_jitter_ms(0, 0)
        .request_timeout_secs(5)
        .image_timeout_secs(5)
        .job_retry(1, 10)
        .build()
        .expect("test config")
}

/// Page fetcher that replays a script of results, then repeats the last one
#[allow(dead_code)]
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<PageContent, ScanError>>>,
    last: Mutex<Option<Result<PageContent, ScanError>>>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedFetcher {
    pub fn new(script: Vec<Result<PageContent, ScanError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    /// Always fails with `error`
    pub fn failing(error: ScanError) -> Arc<Self> {
        Self::new(vec![Err(error)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PageFetcher for ScriptedFetcher {
    fn fetch_page<'a>(&'a self, _url: &'a Url) -> FetchFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = match self.script.lock().pop_front() {
            Some(result) => {
                *self.last.lock() = Some(result.clone());
                result
            }
            None => self
                .last
                .lock()
                .clone()
                .unwrap_or_else(|| Err(ScanError::Internal("empty script".to_string()))),
        };
        Box::pin(async move { next })
    }
}

/// Starts a service whose page fetchers are `static_fetcher` and `render_fetcher`
#[allow(dead_code)]
pub async fn service_with(
    config: ScanConfig,
    static_fetcher: Arc<dyn PageFetcher>,
    render_fetcher: Arc<dyn PageFetcher>,
) -> ImageScanService {
    ImageScanService::start_with_fetchers(config, static_fetcher, render_fetcher)
        .await
        .expect("service start")
}

/// Polls `job_id` until it reaches a terminal state
#[allow(dead_code)]
pub async fn wait_for_job(service: &ImageScanService, job_id: &str) -> JobStatus {
    for _ in 0..400 {
        let status = service.poll(job_id);
        if matches!(status.state, JobState::Completed | JobState::Failed) {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {job_id} did not finish in time");
}
