//! Stored assets: retrieval, expiry and forced purge

mod common;

use common::{ScriptedFetcher, html_page, png_bytes, service_with, test_config, wait_for_job};
use kodegen_tools_imgscan::{
    DurableStore, PageContent, ScanError, ScanOptions, Submission,
};
use std::time::Duration;

/// Forced purge removes everything a scan stored, after which retrieval is 404
#[tokio::test]
async fn test_forced_purge_then_retrieve_is_not_found() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _image = server
        .mock("GET", "/photo.png")
        .with_body(png_bytes(320, 240))
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let page = PageContent::from_html(html_page(&format!(r#"<img src="{base}/photo.png">"#)));
    let service = service_with(
        test_config(dir.path()),
        ScriptedFetcher::new(vec![Ok(page)]),
        ScriptedFetcher::failing(ScanError::ExternalService("unused".to_string())),
    )
    .await;

    let Submission::Queued(job_id) = service
        .submit("https://photos.example.com/", ScanOptions::default())
        .expect("submit")
    else {
        panic!("fresh service cannot have a cached result");
    };
    let result = wait_for_job(&service, &job_id).await.result.expect("result");
    let file_name = result.images[0].file_name.clone();

    service
        .retrieve_asset(&result.scan_id, &file_name)
        .await
        .expect("asset is stored");

    let report = service
        .purge(true)
        .await
        .expect("purge")
        .expect("no concurrent sweep");
    assert!(report.forced);
    assert!(report.files_removed >= 2, "image and summary: {report:?}");

    let err = service
        .retrieve_asset(&result.scan_id, &file_name)
        .await
        .expect_err("purged");
    assert_eq!(err.status_code(), 404);

    assert!(
        dir.path().join(".gitignore").exists(),
        "sentinel survives a forced purge"
    );

    service.shutdown().await;
}

/// Retrieval paths cannot leave the scan directory
#[tokio::test]
async fn test_retrieve_rejects_traversal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let down = || ScriptedFetcher::failing(ScanError::ExternalService("unused".to_string()));
    let service = service_with(test_config(dir.path()), down(), down()).await;

    for (scan_id, file) in [("..", "secret.png"), ("scan", "../x.png"), ("scan", "")] {
        let err = service
            .retrieve_asset(scan_id, file)
            .await
            .expect_err("must be rejected");
        assert_eq!(err.status_code(), 400, "{scan_id}/{file}");
    }

    service.shutdown().await;
}

/// Files past their TTL are swept, fresh ones are retained
#[tokio::test]
async fn test_sweep_honours_ttl() {
    let dir = tempfile::tempdir().expect("tempdir");

    let store = DurableStore::open(dir.path(), Duration::from_secs(3600))
        .await
        .expect("store");
    store
        .store_file(b"fresh", "site/scan-a/img_1.png")
        .await
        .expect("store fresh");

    let report = store.sweep(false).await.expect("sweep").expect("ran");
    assert_eq!(report.files_removed, 0);
    assert_eq!(store.file_count().await.expect("count"), 1);

    let short = DurableStore::open(dir.path(), Duration::ZERO)
        .await
        .expect("store");
    short
        .store_file(b"stale", "site/scan-b/img_1.png")
        .await
        .expect("store stale");
    tokio::time::sleep(Duration::from_millis(20)).await;

    let report = short.sweep(false).await.expect("sweep").expect("ran");
    assert_eq!(report.files_removed, 1, "{report:?}");
    assert!(short.get_file("site/scan-a/img_1.png").await.is_ok());
    assert!(short.get_file("site/scan-b/img_1.png").await.is_err());
}
