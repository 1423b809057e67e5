//! End-to-end upload tests
//!
//! A real `UploadServer` bound to an ephemeral port on 127.0.0.1, a real
//! `TransferClient`, and a temporary output directory per test.
//!
//! Tests cover:
//! - Byte-exact round trips for every strategy
//! - Concurrent uploads of all strategies at once
//! - Dispatch by path regardless of body content
//! - Unknown paths and malformed bodies
//! - Shutdown letting in-flight uploads finish
//! - Connection failures on the client side

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use courier_core::server::upload_file_name;
use courier_core::{
    CourierConfig, PreparedUpload, Strategy, TransferClient, TransferError, UploadServer,
};

// =============================================================================
// Harness
// =============================================================================

struct TestServer {
    addr: SocketAddr,
    output: TempDir,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let output = TempDir::new().unwrap();
        let config = CourierConfig {
            host: "127.0.0.1".into(),
            port: 0,
            output_dir: output.path().to_path_buf(),
            max_body_bytes: 1024 * 1024,
        };

        let server = UploadServer::bind(&config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));

        Self {
            addr,
            output,
            shutdown: Some(tx),
            task,
        }
    }

    fn client(&self) -> TransferClient {
        TransferClient::new(self.addr.ip().to_string(), self.addr.port())
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    fn output_file(&self, strategy: Strategy, content_length: usize) -> PathBuf {
        self.output
            .path()
            .join(upload_file_name(strategy, &content_length.to_string()))
    }

    fn stored_files(&self) -> usize {
        std::fs::read_dir(self.output.path()).unwrap().count()
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.await.unwrap().unwrap();
    }
}

/// A small JPEG-like payload covering every byte value
fn sample_image() -> Vec<u8> {
    let mut image = vec![0xFF, 0xD8, 0xFF, 0xE0];
    image.extend((0..=255u8).cycle().take(10_000));
    image.extend([0xFF, 0xD9]);
    image
}

fn write_source(dir: &Path, bytes: &[u8]) -> PathBuf {
    let path = dir.join("gh-woman_200x250.jpeg");
    std::fs::write(&path, bytes).unwrap();
    path
}

// =============================================================================
// Round trips
// =============================================================================

#[tokio::test]
async fn test_each_strategy_round_trips_through_server() {
    let server = TestServer::start().await;
    let source_dir = TempDir::new().unwrap();
    let image = sample_image();
    let source = write_source(source_dir.path(), &image);
    let client = server.client();

    for strategy in Strategy::ALL {
        let receipt = client.send(strategy, &source).await.unwrap();
        assert_eq!(receipt.status, StatusCode::OK);
        assert_eq!(receipt.response_len, 0);

        let expected_len = strategy.encode(&image).unwrap().len();
        assert_eq!(receipt.body_len, expected_len);

        let stored = std::fs::read(server.output_file(strategy, expected_len)).unwrap();
        assert_eq!(stored, image, "{strategy} upload was not byte-exact");
    }

    assert_eq!(server.stored_files(), 3);
    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_uploads_of_all_strategies() {
    let server = TestServer::start().await;
    let source_dir = TempDir::new().unwrap();
    let image = sample_image();
    let source = write_source(source_dir.path(), &image);

    let handles: Vec<_> = Strategy::ALL
        .into_iter()
        .map(|strategy| {
            let client = server.client();
            let source = source.clone();
            tokio::spawn(async move { client.send(strategy, &source).await })
        })
        .collect();

    for handle in handles {
        let receipt = handle.await.unwrap().unwrap();
        assert_eq!(receipt.status, StatusCode::OK);
        let stored =
            std::fs::read(server.output_file(receipt.strategy, receipt.body_len)).unwrap();
        assert_eq!(stored, image);
    }

    server.stop().await;
}

#[tokio::test]
async fn test_empty_payload() {
    let server = TestServer::start().await;
    let source_dir = TempDir::new().unwrap();
    let source = write_source(source_dir.path(), &[]);
    let client = server.client();

    for strategy in Strategy::ALL {
        let receipt = client.send(strategy, &source).await.unwrap();
        assert_eq!(receipt.status, StatusCode::OK);

        let stored = std::fs::read(server.output_file(strategy, receipt.body_len)).unwrap();
        assert!(stored.is_empty());
    }

    // "[]" for json-array is two bytes, the others are empty
    assert!(server.output_file(Strategy::JsonArray, 2).exists());
    assert!(server.output_file(Strategy::Raw, 0).exists());
    server.stop().await;
}

// =============================================================================
// Dispatch and rejection
// =============================================================================

#[tokio::test]
async fn test_base64_text_posted_to_binary_is_stored_verbatim() {
    let server = TestServer::start().await;
    let mut upload = PreparedUpload::encode(Strategy::Base64, &[1, 2, 255]).unwrap();
    // Same body, raw route
    upload.strategy = Strategy::Raw;

    let receipt = server.client().send_prepared(upload).await.unwrap();
    assert_eq!(receipt.status, StatusCode::OK);

    let stored = std::fs::read(server.output_file(Strategy::Raw, 4)).unwrap();
    assert_eq!(stored, b"AQL/");
    server.stop().await;
}

#[tokio::test]
async fn test_unknown_path_is_404_without_file() {
    let server = TestServer::start().await;

    let response = reqwest::Client::new()
        .post(server.url("/unknown"))
        .body(vec![1, 2, 3])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(server.stored_files(), 0);
    server.stop().await;
}

#[tokio::test]
async fn test_malformed_bodies_are_400_and_server_keeps_serving() {
    let server = TestServer::start().await;
    let http = reqwest::Client::new();

    for (path, body) in [
        ("/base64", b"@@@ definitely not base64 @@@".to_vec()),
        ("/buffer", b"[1,2,300]".to_vec()),
        ("/buffer", b"[1,\"two\",3]".to_vec()),
    ] {
        let response = http
            .post(server.url(path))
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{path}");
    }
    assert_eq!(server.stored_files(), 0);

    // Still alive after the bad requests
    let upload = PreparedUpload::encode(Strategy::JsonArray, &[1, 2, 255]).unwrap();
    let receipt = server.client().send_prepared(upload).await.unwrap();
    assert_eq!(receipt.status, StatusCode::OK);
    assert_eq!(
        std::fs::read(server.output_file(Strategy::JsonArray, 9)).unwrap(),
        [1, 2, 255]
    );

    server.stop().await;
}

#[tokio::test]
async fn test_get_on_known_path_is_405() {
    let server = TestServer::start().await;

    let response = reqwest::get(server.url("/binary")).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        response.headers().get("allow").and_then(|v| v.to_str().ok()),
        Some("POST")
    );
    server.stop().await;
}

#[tokio::test]
async fn test_repeat_upload_overwrites_same_file() {
    let server = TestServer::start().await;
    let client = server.client();

    for payload in [[1u8, 2, 3], [4, 5, 6]] {
        let upload = PreparedUpload::encode(Strategy::Raw, &payload).unwrap();
        client.send_prepared(upload).await.unwrap();
    }

    assert_eq!(server.stored_files(), 1);
    assert_eq!(
        std::fs::read(server.output_file(Strategy::Raw, 3)).unwrap(),
        [4, 5, 6]
    );
    server.stop().await;
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_shutdown_waits_for_upload_in_flight() {
    let mut server = TestServer::start().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    stream
        .write_all(
            b"POST /binary HTTP/1.1\r\nhost: localhost\r\n\
              expect: 100-continue\r\ncontent-length: 6\r\n\r\n",
        )
        .await
        .unwrap();

    // The interim response means the connection is already being handled
    let mut interim = [0u8; 25];
    stream.read_exact(&mut interim).await.unwrap();
    assert_eq!(&interim, b"HTTP/1.1 100 Continue\r\n\r\n");

    stream.write_all(b"abc").await.unwrap();
    server.shutdown.take().unwrap().send(()).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        !server.task.is_finished(),
        "server stopped with an upload in flight"
    );

    stream.write_all(b"def").await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));
    assert_eq!(
        std::fs::read(server.output_file(Strategy::Raw, 6)).unwrap(),
        b"abcdef"
    );

    drop(stream);
    server.stop().await;
}

// =============================================================================
// Client failures
// =============================================================================

#[tokio::test]
async fn test_connection_refused_is_reported() {
    // Bind and drop to find a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let source_dir = TempDir::new().unwrap();
    let source = write_source(source_dir.path(), &[1, 2, 3]);

    let client = TransferClient::new("127.0.0.1", port);
    let err = client.send(Strategy::Raw, &source).await.unwrap_err();
    assert!(matches!(err, TransferError::Connection { .. }), "{err}");
}
