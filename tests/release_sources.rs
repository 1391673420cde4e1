//! Release source tests against a mock HTTP server.
//!
//! Covers the managed feed (conditional requests, status mapping) and the
//! public release index (tag mapping, timeouts).

use std::time::Duration;
use updraft::FetchError;
use updraft::source::{FeedSource, GithubReleaseSource, ReleaseSource};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn feed(server: &MockServer) -> FeedSource {
    FeedSource::new(
        &format!("{}/app/latest.json", server.uri()),
        "updraft-test",
        TIMEOUT,
    )
    .expect("feed source builds")
}

fn github(server: &MockServer, timeout: Duration) -> GithubReleaseSource {
    GithubReleaseSource::new(
        &format!("{}/repos/acme/app/releases/latest", server.uri()),
        "updraft-test",
        timeout,
    )
    .expect("github source builds")
}

// ---------------------------------------------------------------------------
// Managed feed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn feed_serves_cached_manifest_on_not_modified() {
    let server = MockServer::start().await;

    // Conditional request wins when the client sends the cached ETag.
    Mock::given(method("GET"))
        .and(path("/app/latest.json"))
        .and(header("If-None-Match", "\"m1\""))
        .respond_with(ResponseTemplate::new(304))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/app/latest.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"m1\"")
                .set_body_json(serde_json::json!({
                    "version": "v2.1.0",
                    "releaseName": "Spring",
                    "releaseDate": "2025-03-01T12:00:00Z",
                    "path": "App-2.1.0.zip",
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let source = feed(&server);
    let first = source.fetch_latest().await.expect("first fetch");
    assert_eq!(first.version, "2.1.0");
    assert_eq!(first.release_name.as_deref(), Some("Spring"));
    assert_eq!(
        first.download_url,
        Some(format!("{}/app/App-2.1.0.zip", server.uri()))
    );
    assert_eq!(source.cached_etag().as_deref(), Some("\"m1\""));

    let second = source.fetch_latest().await.expect("cached fetch");
    assert_eq!(second, first);
}

#[tokio::test]
async fn feed_maps_missing_manifest_to_no_releases() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = feed(&server).fetch_latest().await;
    assert!(matches!(result, Err(FetchError::NoReleases)));
}

#[tokio::test]
async fn feed_maps_server_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = feed(&server).fetch_latest().await;
    assert!(matches!(result, Err(FetchError::ServiceError(500))));
}

#[tokio::test]
async fn feed_rejects_malformed_manifest() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let result = feed(&server).fetch_latest().await;
    assert!(matches!(result, Err(FetchError::InvalidResponse(_))));
}

#[tokio::test]
async fn feed_without_etag_does_not_send_conditional_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"version": "1.0.1"})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let source = feed(&server);
    source.fetch_latest().await.expect("first fetch");
    assert!(source.cached_etag().is_none());
    let again = source.fetch_latest().await.expect("second fetch");
    assert_eq!(again.version, "1.0.1");

    let requests = server.received_requests().await.expect("recording enabled");
    assert!(
        requests
            .iter()
            .all(|r| !r.headers.contains_key("if-none-match"))
    );
}

// ---------------------------------------------------------------------------
// Public release index
// ---------------------------------------------------------------------------

#[tokio::test]
async fn github_maps_latest_release() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/app/releases/latest"))
        .and(header("Accept", "application/vnd.github+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tag_name": "v3.0.0",
            "published_at": "2025-06-10T09:00:00Z",
            "name": "Summer",
            "body": "* New sync engine",
            "assets": [
                {"name": "App-3.0.0-linux-x64", "browser_download_url": "https://dl.example.com/App-3.0.0-linux-x64"},
                {"name": "App-3.0.0-arm64.dmg", "browser_download_url": "https://dl.example.com/App-3.0.0-arm64.dmg"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let release = github(&server, TIMEOUT)
        .with_asset_suffix("-arm64.dmg")
        .fetch_latest()
        .await
        .expect("fetch succeeds");

    assert_eq!(release.version, "3.0.0");
    assert_eq!(release.release_name.as_deref(), Some("Summer"));
    assert_eq!(
        release.release_notes.map(|n| n.to_string()).as_deref(),
        Some("* New sync engine")
    );
    assert_eq!(
        release.download_url.as_deref(),
        Some("https://dl.example.com/App-3.0.0-arm64.dmg")
    );
}

#[tokio::test]
async fn github_without_releases_reports_no_releases() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = github(&server, TIMEOUT).fetch_latest().await;
    assert!(matches!(result, Err(FetchError::NoReleases)));
}

#[tokio::test]
async fn github_rate_limit_is_a_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let result = github(&server, TIMEOUT).fetch_latest().await;
    assert!(matches!(result, Err(FetchError::ServiceError(403))));
}

#[tokio::test]
async fn github_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "tag_name": "v9.0.0",
                    "published_at": "2025-06-10T09:00:00Z"
                }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let started = std::time::Instant::now();
    let result = github(&server, Duration::from_millis(200))
        .fetch_latest()
        .await;

    assert!(matches!(result, Err(FetchError::Timeout { .. })));
    assert!(started.elapsed() < Duration::from_secs(4));
}
