use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tailserve::handler::LogtailHandler;
use tailserve::registry::{ProcessConfig, StaticRegistry};
use tailserve::server::Server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

async fn start(processes: Vec<ProcessConfig>) -> (SocketAddr, CancellationToken) {
    let handler = LogtailHandler::new(Arc::new(StaticRegistry::new(processes)));
    let server = Server::bind("127.0.0.1:0".parse().unwrap(), handler)
        .await
        .unwrap()
        .with_poll_interval(Duration::from_millis(10));
    let addr = server.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    tokio::spawn(server.run(shutdown.clone()));
    (addr, shutdown)
}

async fn get(addr: SocketAddr, path: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let req = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
    stream.write_all(req.as_bytes()).await.unwrap();
    stream
}

/// Reads until `needle` has been seen, returning everything read so far.
async fn read_until(stream: &mut TcpStream, seen: &mut String, needle: &str) {
    let mut buf = [0u8; 1024];
    timeout(Duration::from_secs(5), async {
        while !seen.contains(needle) {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before {needle:?}; got {seen:?}");
            seen.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
    })
    .await
    .expect("timed out waiting for response data");
}

#[tokio::test]
async fn unknown_process_is_gone() {
    let (addr, shutdown) = start(vec![]).await;
    let mut stream = get(addr, "/logtail/nobody").await;
    let mut body = String::new();
    timeout(Duration::from_secs(5), stream.read_to_string(&mut body))
        .await
        .unwrap()
        .unwrap();
    assert!(body.starts_with("HTTP/1.1 410 Gone\r\n"), "{body}");
    shutdown.cancel();
}

#[tokio::test]
async fn other_paths_are_not_found() {
    let (addr, shutdown) = start(vec![]).await;
    let mut stream = get(addr, "/index.html").await;
    let mut body = String::new();
    timeout(Duration::from_secs(5), stream.read_to_string(&mut body))
        .await
        .unwrap()
        .unwrap();
    assert!(body.starts_with("HTTP/1.1 404 Not Found\r\n"), "{body}");
    shutdown.cancel();
}

#[tokio::test]
async fn streams_appended_lines_as_chunks() {
    let mut log = tempfile::NamedTempFile::new().unwrap();
    log.write_all(b"hello\n").unwrap();
    log.flush().unwrap();
    let (addr, shutdown) = start(vec![ProcessConfig::new("app", Some(log.path().to_path_buf()))]).await;

    let mut stream = get(addr, "/logtail/app").await;
    let mut seen = String::new();
    read_until(&mut stream, &mut seen, "6\r\nhello\n\r\n").await;
    assert!(seen.starts_with("HTTP/1.1 200 OK\r\n"), "{seen}");
    assert!(seen.contains("Content-Type: text/plain\r\n"));
    assert!(seen.contains("Transfer-Encoding: chunked\r\n"));
    assert!(seen.contains("Last-Modified: "));

    log.write_all(b"more\n").unwrap();
    log.flush().unwrap();
    read_until(&mut stream, &mut seen, "5\r\nmore\n\r\n").await;

    log.as_file().set_len(0).unwrap();
    read_until(&mut stream, &mut seen, "17\r\n==> File truncated <==\n\r\n").await;

    shutdown.cancel();
}

#[tokio::test]
async fn half_closed_client_keeps_receiving() {
    let mut log = tempfile::NamedTempFile::new().unwrap();
    log.write_all(b"hello\n").unwrap();
    log.flush().unwrap();
    let (addr, shutdown) = start(vec![ProcessConfig::new("app", Some(log.path().to_path_buf()))]).await;

    let mut stream = get(addr, "/logtail/app").await;
    let mut seen = String::new();
    read_until(&mut stream, &mut seen, "6\r\nhello\n\r\n").await;
    stream.shutdown().await.unwrap();

    log.write_all(b"more\n").unwrap();
    log.flush().unwrap();
    read_until(&mut stream, &mut seen, "5\r\nmore\n\r\n").await;

    shutdown.cancel();
}

#[tokio::test]
async fn http10_response_is_not_chunked() {
    let mut log = tempfile::NamedTempFile::new().unwrap();
    log.write_all(b"hello\n").unwrap();
    log.flush().unwrap();
    let (addr, shutdown) = start(vec![ProcessConfig::new("app", Some(log.path().to_path_buf()))]).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"GET /logtail/app HTTP/1.0\r\n\r\n").await.unwrap();
    let mut seen = String::new();
    read_until(&mut stream, &mut seen, "\r\n\r\nhello\n").await;
    assert!(!seen.contains("Transfer-Encoding"), "{seen}");

    shutdown.cancel();
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn disconnected_client_releases_the_log() {
    let mut log = tempfile::NamedTempFile::new().unwrap();
    log.write_all(b"hello\n").unwrap();
    log.flush().unwrap();
    let path = log.path().canonicalize().unwrap();
    let handles = || {
        std::fs::read_dir("/proc/self/fd")
            .unwrap()
            .filter_map(|entry| std::fs::read_link(entry.ok()?.path()).ok())
            .filter(|target| *target == path)
            .count()
    };
    let idle = handles();
    let (addr, shutdown) = start(vec![ProcessConfig::new("app", Some(log.path().to_path_buf()))]).await;

    let mut stream = get(addr, "/logtail/app").await;
    let mut seen = String::new();
    read_until(&mut stream, &mut seen, "6\r\nhello\n\r\n").await;
    assert_eq!(handles(), idle + 1);
    drop(stream);

    // the server only notices once a write to the dead socket fails
    timeout(Duration::from_secs(5), async {
        while handles() > idle {
            log.write_all(b"tick\n").unwrap();
            log.flush().unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("log file still open after client went away");

    shutdown.cancel();
}
