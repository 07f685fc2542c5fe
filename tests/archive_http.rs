//! `HttpArchiveFetcher` against a throwaway local HTTP server.

use docs_harness::archive::{ArchiveFetcher, HttpArchiveFetcher};
use docs_harness::error::{ArchiveError, FailureKind};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use tempfile::TempDir;

fn tarball(wrapper: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, body) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}/{}", wrapper, path), body.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Serve a single request with `status` and `body`; returns the base URL
/// and a slot that receives the request path.
fn serve_once(status: &'static str, body: Vec<u8>) -> (String, Arc<Mutex<Option<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(None));
    let seen_in_thread = seen.clone();

    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        let path = request_line.split_whitespace().nth(1).unwrap_or("").to_string();
        *seen_in_thread.lock().unwrap() = Some(path);

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                break;
            }
        }

        let mut stream = stream;
        write!(
            stream,
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: application/x-gzip\r\nConnection: close\r\n\r\n",
            status,
            body.len()
        )
        .unwrap();
        stream.write_all(&body).unwrap();
        stream.flush().unwrap();
    });

    (format!("http://{}", addr), seen)
}

#[tokio::test]
async fn downloads_and_strips_wrapper() {
    let body = tarball(
        "docs-main",
        &[("README.md", "# Docs"), ("guide/setup.md", "Setup")],
    );
    let (base, seen) = serve_once("200 OK", body);
    let tmp = TempDir::new().unwrap();

    HttpArchiveFetcher::new()
        .fetch_archive(&format!("{}/acme/docs", base), "main", tmp.path())
        .await
        .unwrap();

    assert_eq!(
        seen.lock().unwrap().as_deref(),
        Some("/acme/docs/archive/main.tar.gz")
    );
    assert_eq!(fs::read_to_string(tmp.path().join("README.md")).unwrap(), "# Docs");
    assert_eq!(
        fs::read_to_string(tmp.path().join("guide/setup.md")).unwrap(),
        "Setup"
    );
    assert!(!tmp.path().join("docs-main").exists());
}

#[tokio::test]
async fn not_found_is_transient() {
    let (base, _seen) = serve_once("404 Not Found", b"missing".to_vec());
    let tmp = TempDir::new().unwrap();

    let err = HttpArchiveFetcher::new()
        .fetch_archive(&format!("{}/acme/docs.git", base), "main", tmp.path())
        .await
        .unwrap_err();

    assert!(matches!(err, ArchiveError::Status { status: 404, .. }));
    assert_eq!(err.kind(), FailureKind::Transient);
}

#[tokio::test]
async fn corrupt_payload_is_transient() {
    let (base, _seen) = serve_once("200 OK", b"this is not gzip".to_vec());
    let tmp = TempDir::new().unwrap();

    let err = HttpArchiveFetcher::new()
        .fetch_archive(&format!("{}/acme/docs", base), "main", tmp.path())
        .await
        .unwrap_err();

    assert!(matches!(err, ArchiveError::Extract(_)));
    assert_eq!(err.kind(), FailureKind::Transient);
}

#[tokio::test]
async fn unreachable_host_is_transient() {
    // Bind then drop to get a port nothing is listening on.
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let tmp = TempDir::new().unwrap();

    let err = HttpArchiveFetcher::new()
        .fetch_archive(&format!("http://127.0.0.1:{}/acme/docs", port), "main", tmp.path())
        .await
        .unwrap_err();

    assert!(matches!(err, ArchiveError::Http { .. }));
    assert_eq!(err.kind(), FailureKind::Transient);
}

#[tokio::test]
async fn unsupported_url_is_permanent_and_makes_no_request() {
    let tmp = TempDir::new().unwrap();
    let err = HttpArchiveFetcher::new()
        .fetch_archive("/srv/git/docs.git", "main", tmp.path())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Permanent);
    assert!(fs::read_dir(tmp.path()).unwrap().next().is_none());
}
