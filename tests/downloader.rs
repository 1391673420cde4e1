//! Artifact downloader tests against a mock HTTP server.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use updraft::download::{DEFAULT_MAX_REDIRECTS, Downloader};
use updraft::{DownloadError, DownloadProgress};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn downloader() -> Downloader {
    Downloader::new("updraft-test", DEFAULT_MAX_REDIRECTS).expect("client builds")
}

/// Serves one response that announces `declared` bytes but only sends
/// `sent`, then either hangs up or keeps the connection open.
async fn short_body_server(declared: usize, sent: usize, hang_up: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;
        let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {declared}\r\n\r\n");
        socket.write_all(head.as_bytes()).await.expect("write head");
        socket.write_all(&body(sent)).await.expect("write body");
        socket.flush().await.expect("flush");
        if hang_up {
            drop(socket);
        } else {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    });
    format!("http://{addr}/app.bin")
}

fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn follows_redirect_and_reports_one_progress_sequence() {
    let server = MockServer::start().await;
    let payload = body(64 * 1024);

    Mock::given(method("GET"))
        .and(path("/latest/app.bin"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/cdn/app-2.0.0.bin"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/app-2.0.0.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("app.bin");
    let seen: Arc<Mutex<Vec<DownloadProgress>>> = Arc::default();
    let sink = Arc::clone(&seen);

    let written = downloader()
        .download(
            &format!("{}/latest/app.bin", server.uri()),
            &dest,
            &move |p| sink.lock().expect("lock").push(p),
            &CancellationToken::new(),
        )
        .await
        .expect("download succeeds");

    assert_eq!(written, payload.len() as u64);
    assert_eq!(std::fs::read(&dest).expect("read artifact"), payload);

    let seen = seen.lock().expect("lock");
    assert!(!seen.is_empty());
    assert!(
        seen.iter().all(|p| p.total == payload.len() as u64),
        "only the terminal response reports progress"
    );
    assert!(seen.windows(2).all(|w| w[0].transferred <= w[1].transferred));
    let last = seen.last().expect("at least one snapshot");
    assert_eq!(last.transferred, last.total);
    assert!((last.percent - 100.0).abs() < f64::EPSILON);
    assert!(last.bytes_per_second >= 0.0);
}

#[tokio::test]
async fn http_error_leaves_no_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("app.bin");
    let result = downloader()
        .download(
            &format!("{}/missing.bin", server.uri()),
            &dest,
            &|_| {},
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(DownloadError::HttpStatus(404))));
    assert!(!dest.exists());
}

#[tokio::test]
async fn redirect_loop_is_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(307).insert_header("Location", "/loop"))
        .expect(4)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("app.bin");
    let downloader = Downloader::new("updraft-test", 3).expect("client builds");
    let result = downloader
        .download(
            &format!("{}/loop", server.uri()),
            &dest,
            &|_| {},
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(DownloadError::RedirectLoop { hops: 3 })));
    assert!(!dest.exists());
}

#[tokio::test]
async fn redirect_without_location_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(301))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let result = downloader()
        .download(
            &format!("{}/moved", server.uri()),
            &dir.path().join("app.bin"),
            &|_| {},
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(DownloadError::MissingLocation)));
}

#[tokio::test]
async fn cancellation_during_request_removes_destination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body(1024))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("app.bin");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = downloader()
        .download(&format!("{}/slow.bin", server.uri()), &dest, &|_| {}, &cancel)
        .await;

    assert!(matches!(result, Err(DownloadError::Cancelled)));
    assert!(!dest.exists());
}

#[tokio::test]
async fn creates_missing_parent_directories() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body(10)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("nested").join("updates").join("app.bin");
    downloader()
        .download(
            &format!("{}/app.bin", server.uri()),
            &dest,
            &|_| {},
            &CancellationToken::new(),
        )
        .await
        .expect("download succeeds");

    assert_eq!(std::fs::metadata(&dest).expect("stat").len(), 10);
}

#[tokio::test]
async fn connection_closed_mid_body_leaves_no_file() {
    let url = short_body_server(4096, 1000, true).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("app.bin");

    let result = downloader()
        .download(&url, &dest, &|_| {}, &CancellationToken::new())
        .await;

    assert!(
        matches!(
            result,
            Err(DownloadError::Truncated { .. } | DownloadError::Network(_) | DownloadError::Io(_))
        ),
        "unexpected result {result:?}"
    );
    assert!(!dest.exists());
}

#[tokio::test]
async fn cancellation_after_first_chunk_removes_partial_file() {
    let url = short_body_server(4096, 1000, false).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("app.bin");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let chunks = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&chunks);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        downloader().download(
            &url,
            &dest,
            &move |_| {
                *counter.lock().expect("lock") += 1;
                trigger.cancel();
            },
            &cancel,
        ),
    )
    .await
    .expect("cancel observed in time");

    assert!(matches!(result, Err(DownloadError::Cancelled)));
    assert!(*chunks.lock().expect("lock") >= 1, "body started before cancel");
    assert!(!dest.exists());
}

#[tokio::test]
async fn dropped_download_removes_partial_file() {
    let url = short_body_server(4096, 1000, false).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("app.bin");

    let task = {
        let dest = dest.clone();
        tokio::spawn(async move {
            downloader()
                .download(&url, &dest, &|_| {}, &CancellationToken::new())
                .await
        })
    };
    tokio::time::timeout(Duration::from_secs(5), async {
        while std::fs::metadata(&dest).map(|m| m.len()).unwrap_or(0) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("partial body written");

    task.abort();
    assert!(task.await.expect_err("aborted").is_cancelled());
    assert!(!dest.exists());
}
