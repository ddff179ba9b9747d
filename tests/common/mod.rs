//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use axum_server::accept::Accept;
use axum_server::tls_rustls::RustlsAcceptor;
use namerouter::config::{EdgeConfig, RouteConfig};
use namerouter::net::{CertificateProvider, PemCertificates};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

/// Start a mock backend that echoes what it received, one line per item:
/// request line, then every header as `name: value`, then the body.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    tokio::spawn(echo(socket));
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Same echo backend behind TLS, serving the PEM pair at `cert`/`key`.
#[allow(dead_code)]
pub async fn start_tls_echo_backend(cert: &Path, key: &Path) -> SocketAddr {
    let tls = PemCertificates::new(cert, key).tls_config(&[], "").await.unwrap();
    let acceptor = RustlsAcceptor::new(tls);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Ok((stream, ())) = acceptor.accept(socket, ()).await {
                    echo(stream).await;
                }
            });
        }
    });

    addr
}

/// Backend that switches to `websocket` when asked properly, then echoes
/// raw bytes. Without both upgrade headers it answers 400.
#[allow(dead_code)]
pub async fn start_upgrade_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let request = read_request(&mut socket).await;
                let upgrade = request.contains("\nconnection: upgrade") && request.contains("\nupgrade: websocket");
                if !upgrade {
                    let _ = socket
                        .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                        .await;
                    return;
                }
                let _ = socket
                    .write_all(b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\r\n")
                    .await;
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    addr
}

async fn echo<S>(mut socket: S)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = read_request(&mut socket).await;
    let response_str = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nX-Backend: echo\r\nConnection: close\r\n\r\n{}",
        request.len(),
        request
    );
    let _ = socket.write_all(response_str.as_bytes()).await;
    let _ = socket.shutdown().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Read one request: head up to the blank line, then `Content-Length` bytes.
async fn read_request<S>(socket: &mut S) -> String
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break buf.len();
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let mut echo = head.trim_end().to_ascii_lowercase();
    echo.push('\n');
    echo.push_str(&String::from_utf8_lossy(&buf[head_end..]));
    echo
}

/// Config with every listener on an ephemeral loopback port.
#[allow(dead_code)]
pub fn local_config(routes: Vec<RouteConfig>) -> EdgeConfig {
    let mut config = EdgeConfig {
        routes,
        ..Default::default()
    };
    config.listeners.http = "127.0.0.1:0".into();
    config.listeners.https = "127.0.0.1:0".into();
    config.listeners.health = "127.0.0.1:0".into();
    config
}

/// Client that never follows redirects.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap()
}
