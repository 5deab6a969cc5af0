//! End-to-end scans through `ImageScanService`
//!
//! Pages and images are served by a local mockito server; the static
//! fetcher is the real HTTP one unless a test swaps in a scripted fetcher.

mod common;

use common::{
    ScriptedFetcher, html_page, png_bytes, service_with, test_config, wait_for_job,
};
use kodegen_tools_imgscan::{
    FetchStrategy, JobState, PageContent, ScanError, ScanOptions, StaticFetcher, Submission,
};
use std::sync::Arc;

fn queued(submission: Submission) -> String {
    match submission {
        Submission::Queued(id) => id,
        Submission::Cached(result) => panic!("unexpected cache hit for {}", result.url),
    }
}

/// Duplicates collapse, small images are dropped, and counts reflect both
#[tokio::test]
async fn test_scan_dedups_and_filters_small_images() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    let page = html_page(&format!(
        r#"<img src="{base}/small.png">
<img src="{base}/large.png">
<img src="/large.png#hero">"#
    ));
    let _page = server
        .mock("GET", "/gallery")
        .with_header("content-type", "text/html")
        .with_body(page)
        .create_async()
        .await;
    let _small = server
        .mock("GET", "/small.png")
        .with_header("content-type", "image/png")
        .with_body(png_bytes(50, 50))
        .create_async()
        .await;
    let large = server
        .mock("GET", "/large.png")
        .with_header("content-type", "image/png")
        .with_body(png_bytes(300, 200))
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path());
    let static_fetcher = Arc::new(StaticFetcher::new(&config).expect("static fetcher"));
    let render = ScriptedFetcher::failing(ScanError::ExternalService("no browser".to_string()));
    let service = service_with(config, static_fetcher, render.clone()).await;

    let options = ScanOptions {
        concurrency: Some(2),
        ..ScanOptions::default()
    };
    let job_id = queued(
        service
            .submit(&format!("{base}/gallery"), options)
            .expect("submit"),
    );
    let status = wait_for_job(&service, &job_id).await;
    assert_eq!(status.state, JobState::Completed, "error: {:?}", status.error);
    assert_eq!(status.progress, 100);

    let result = status.result.expect("result");
    assert_eq!(result.stats.total_found, 3, "every sighting counts");
    assert_eq!(result.stats.unique_found, 2, "fragment variant collapses");
    assert_eq!(result.stats.valid_images, 1, "50x50 is below the minimum");
    assert_eq!(result.stats.method, FetchStrategy::Static);
    assert!(result.stats.errors.is_empty());
    assert_eq!(render.calls(), 0, "render fetcher must not run");

    let image = &result.images[0];
    assert_eq!(image.url, format!("{base}/large.png"));
    assert_eq!((image.width, image.height), (300, 200));
    assert_eq!(image.format, "png");
    assert_eq!(
        image.local_url,
        format!("/api/images/{}/{}", result.scan_id, image.file_name)
    );
    large.assert_async().await;

    let asset = service
        .retrieve_asset(&result.scan_id, &image.file_name)
        .await
        .expect("stored asset");
    assert_eq!(asset.content_type, "image/png");
    assert_eq!(asset.bytes.len() as u64, image.size);

    service.shutdown().await;
}

/// Three static timeouts fall back to rendering, which succeeds
#[tokio::test]
async fn test_static_timeouts_fall_back_to_render() {
    let dir = tempfile::tempdir().expect("tempdir");
    let static_fetcher =
        ScriptedFetcher::failing(ScanError::Timeout("Static fetch timed out".to_string()));
    let render = ScriptedFetcher::new(vec![Ok(PageContent::from_html(html_page("<p>empty</p>")))]);
    let service = service_with(
        test_config(dir.path()),
        static_fetcher.clone(),
        render.clone(),
    )
    .await;

    let job_id = queued(
        service
            .submit("https://example.org/page", ScanOptions::default())
            .expect("submit"),
    );
    let status = wait_for_job(&service, &job_id).await;
    let result = status.result.expect("result");

    assert_eq!(result.stats.method, FetchStrategy::Render);
    assert_eq!(result.stats.errors.len(), 3);
    assert!(result.stats.errors.iter().all(|e| e.starts_with("static attempt")));
    assert!(result.stats.page_fetched);
    assert_eq!(static_fetcher.calls(), 3);
    assert_eq!(render.calls(), 1);

    let json = serde_json::to_value(&result).expect("json");
    assert_eq!(json["stats"]["method"], "rendering");

    service.shutdown().await;
}

/// A second identical submission is answered from cache without new downloads
#[tokio::test]
async fn test_second_submission_hits_cache() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let image = server
        .mock("GET", "/hero.png")
        .with_body(png_bytes(400, 400))
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let page = PageContent::from_html(html_page(&format!(r#"<img src="{base}/hero.png">"#)));
    let static_fetcher = ScriptedFetcher::new(vec![Ok(page)]);
    let render = ScriptedFetcher::failing(ScanError::ExternalService("unused".to_string()));
    let service = service_with(test_config(dir.path()), static_fetcher, render).await;

    let url = "https://shop.example.net/";
    let job_id = queued(service.submit(url, ScanOptions::default()).expect("submit"));
    let first = wait_for_job(&service, &job_id).await.result.expect("result");
    assert_eq!(first.images.len(), 1);

    match service.submit(url, ScanOptions::default()).expect("submit") {
        Submission::Cached(cached) => assert_eq!(cached.scan_id, first.scan_id),
        Submission::Queued(id) => panic!("expected cache hit, got job {id}"),
    }
    assert_eq!(service.cache().stats().hits, 1);
    image.assert_async().await;

    service.shutdown().await;
}

/// Different options are a different cache key
#[tokio::test]
async fn test_options_change_cache_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    let page = PageContent::from_html(html_page("<p>nothing</p>"));
    let service = service_with(
        test_config(dir.path()),
        ScriptedFetcher::new(vec![Ok(page)]),
        ScriptedFetcher::failing(ScanError::ExternalService("unused".to_string())),
    )
    .await;

    let url = "https://example.com/";
    let job_id = queued(service.submit(url, ScanOptions::default()).expect("submit"));
    wait_for_job(&service, &job_id).await;

    let other = ScanOptions {
        concurrency: Some(3),
        ..ScanOptions::default()
    };
    assert!(matches!(
        service.submit(url, other).expect("submit"),
        Submission::Queued(_)
    ));

    service.shutdown().await;
}

/// Pages nobody could fetch produce a result but are never cached
#[tokio::test]
async fn test_unfetchable_page_is_not_cached() {
    let dir = tempfile::tempdir().expect("tempdir");
    let down = || ScriptedFetcher::failing(ScanError::ExternalService("refused".to_string()));
    let service = service_with(test_config(dir.path()), down(), down()).await;

    let url = "https://offline.example.com/";
    let job_id = queued(service.submit(url, ScanOptions::default()).expect("submit"));
    let status = wait_for_job(&service, &job_id).await;
    assert_eq!(status.state, JobState::Completed);

    let result = status.result.expect("result");
    assert!(result.images.is_empty());
    assert_eq!(result.stats.errors.len(), 5);
    assert!(!result.stats.page_fetched);

    assert!(matches!(
        service.submit(url, ScanOptions::default()).expect("submit"),
        Submission::Queued(_)
    ));

    service.shutdown().await;
}

/// Invalid targets are rejected before anything is queued
#[tokio::test]
async fn test_submit_rejects_invalid_urls() {
    let dir = tempfile::tempdir().expect("tempdir");
    let down = || ScriptedFetcher::failing(ScanError::ExternalService("unused".to_string()));
    let service = service_with(test_config(dir.path()), down(), down()).await;

    for bad in ["", "ftp://example.com/file", "http://"] {
        let err = service
            .submit(bad, ScanOptions::default())
            .expect_err("must be rejected");
        assert_eq!(err.status_code(), 400, "input {bad:?}");
    }
    assert_eq!(service.poll("no-such-job").state, JobState::NotFound);

    service.shutdown().await;
}
