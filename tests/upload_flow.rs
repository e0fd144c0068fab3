//! Resumable upload loop tests against a loopback HTTP server.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;

use tempfile::TempDir;
use tokio::sync::mpsc::unbounded_channel;

use tubeporter::UploadError;
use tubeporter::model::{UploadRequest, Visibility};
use tubeporter::progress::ProgressSink;
use tubeporter::uploader::Uploader;

struct ReceivedRequest {
    request_line: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> ReceivedRequest {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();
    let request_line = request_line.trim_end().to_string();

    let mut headers = HashMap::new();
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).unwrap();
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((key, value)) = header.split_once(':') {
            headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let length = headers
        .get("content-length")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0_u8; length];
    reader.read_exact(&mut body).unwrap();

    ReceivedRequest {
        request_line,
        headers,
        body,
    }
}

fn upload_request(file: std::path::PathBuf) -> UploadRequest {
    UploadRequest {
        file_path: file,
        title: "My upload".to_string(),
        description: "A description".to_string(),
        tags: vec!["first".to_string(), "second".to_string()],
        category_id: "22".to_string(),
        visibility: Visibility::Unlisted,
    }
}

#[test]
fn chunked_transfer_resumes_at_the_acknowledged_offset() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("clip.mp4");
    std::fs::write(&file, b"abcd").unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (events_tx, events_rx) = mpsc::channel::<ReceivedRequest>();

    let server = thread::spawn(move || {
        // 1) initiation: metadata POST answered with the session URI.
        let (mut stream, _) = listener.accept().unwrap();
        let request = read_request(&mut stream);
        events_tx.send(request).unwrap();
        stream
            .write_all(
                format!(
                    "HTTP/1.1 200 OK\r\nLocation: http://127.0.0.1:{port}/session\r\n\
                     Content-Length: 0\r\nConnection: close\r\n\r\n"
                )
                .as_bytes(),
            )
            .unwrap();
        drop(stream);

        // 2) first chunk: acknowledge only the first two bytes. No
        //    Location header, so the client must not treat 308 as a
        //    redirect.
        let (mut stream, _) = listener.accept().unwrap();
        let request = read_request(&mut stream);
        events_tx.send(request).unwrap();
        stream
            .write_all(
                b"HTTP/1.1 308 Resume Incomplete\r\nRange: bytes=0-1\r\n\
                  Content-Length: 0\r\nConnection: close\r\n\r\n",
            )
            .unwrap();
        drop(stream);

        // 3) remainder: final resource with the video id.
        let (mut stream, _) = listener.accept().unwrap();
        let request = read_request(&mut stream);
        events_tx.send(request).unwrap();
        let body = r#"{"id":"vid-123","kind":"youtube#video"}"#;
        stream
            .write_all(
                format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                )
                .as_bytes(),
            )
            .unwrap();
    });

    let uploader = Uploader::with_endpoint(format!(
        "http://127.0.0.1:{port}/videos?uploadType=resumable&part=snippet,status"
    ));
    let (tx, mut rx) = unbounded_channel();
    let sink = ProgressSink::new(tx);
    let request = upload_request(file);

    let receipt = uploader.upload(&request, "test-token", &sink).unwrap();
    assert_eq!(receipt.video_id, "vid-123");
    assert_eq!(
        receipt.watch_url(),
        "https://www.youtube.com/watch?v=vid-123"
    );
    server.join().unwrap();

    // Initiation carried the metadata and the upload sizing headers.
    let initiate = events_rx.recv().unwrap();
    assert!(initiate.request_line.starts_with("POST /videos"));
    assert_eq!(
        initiate.headers.get("x-upload-content-length").unwrap(),
        "4"
    );
    assert_eq!(
        initiate.headers.get("x-upload-content-type").unwrap(),
        "video/mp4"
    );
    assert!(
        initiate
            .headers
            .get("authorization")
            .unwrap()
            .starts_with("Bearer test-token")
    );
    let metadata: serde_json::Value = serde_json::from_slice(&initiate.body).unwrap();
    assert_eq!(metadata["snippet"]["title"], "My upload");
    assert_eq!(metadata["snippet"]["tags"][1], "second");
    assert_eq!(metadata["status"]["privacyStatus"], "unlisted");

    // First chunk covered the whole file; the retry started at the
    // acknowledged offset and carried only the remainder.
    let first = events_rx.recv().unwrap();
    assert!(first.request_line.starts_with("PUT /session"));
    assert_eq!(first.headers.get("content-range").unwrap(), "bytes 0-3/4");
    assert_eq!(first.body, b"abcd");

    let second = events_rx.recv().unwrap();
    assert_eq!(second.headers.get("content-range").unwrap(), "bytes 2-3/4");
    assert_eq!(second.body, b"cd");

    // Progress: the acknowledged half, then completion.
    let mut seen = Vec::new();
    while let Ok(percent) = rx.try_recv() {
        seen.push(percent);
    }
    assert_eq!(seen, vec![50.0, 100.0]);
}

#[test]
fn api_rejection_surfaces_status_and_body() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let _ = read_request(&mut stream);
        let body = r#"{"error":{"message":"quota exceeded"}}"#;
        stream
            .write_all(
                format!(
                    "HTTP/1.1 403 Forbidden\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                )
                .as_bytes(),
            )
            .unwrap();
    });

    let dir = TempDir::new().unwrap();
    let file = dir.path().join("clip.mp4");
    std::fs::write(&file, b"abcd").unwrap();

    let uploader = Uploader::with_endpoint(format!("http://127.0.0.1:{port}/videos"));
    let (tx, _rx) = unbounded_channel();
    let sink = ProgressSink::new(tx);

    let err = uploader
        .upload(&upload_request(file), "test-token", &sink)
        .unwrap_err();
    match err {
        UploadError::Api { status, body } => {
            assert_eq!(status, 403);
            assert!(body.contains("quota exceeded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    server.join().unwrap();
}

#[test]
fn precondition_failures_never_touch_the_network() {
    // Nonblocking listener: accept() reports WouldBlock unless a
    // connection actually arrived.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let port = listener.local_addr().unwrap().port();

    let uploader = Uploader::with_endpoint(format!("http://127.0.0.1:{port}/videos"));
    let (tx, _rx) = unbounded_channel();
    let sink = ProgressSink::new(tx);

    // Missing file.
    let mut request = upload_request(std::path::PathBuf::from("/definitely/not/here.mp4"));
    let err = uploader.upload(&request, "test-token", &sink).unwrap_err();
    assert!(matches!(err, UploadError::MissingFile(_)));

    // Empty title, even with a perfectly good file.
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("clip.mp4");
    std::fs::write(&file, b"abcd").unwrap();
    request = upload_request(file);
    request.title = "   ".to_string();
    let err = uploader.upload(&request, "test-token", &sink).unwrap_err();
    assert!(matches!(err, UploadError::EmptyTitle));

    // Call count on the wire: zero.
    match listener.accept() {
        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
        other => panic!("expected no connection attempts, got {other:?}"),
    }
}
