//! Common utilities for integration tests
#![allow(dead_code)]

use httpgate::config::{ModeConfig, ServerConfig, ServerConfigBuilder, TimeoutConfig};
use httpgate::{create_handler, ConnectionGate, Server, ServerStats};
use std::net::{SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;

/// Find an available port
pub fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to random port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Temporary directory removed on drop
pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    pub fn new(prefix: &str) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64;
        let counter = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "{}-{}-{}-{}",
            prefix,
            timestamp,
            counter,
            std::process::id()
        ));
        std::fs::create_dir_all(&path).expect("Failed to create temp dir");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, name: &str, content: &[u8]) {
        std::fs::write(self.path.join(name), content).expect("Failed to write test file");
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// A running server; stops accepting when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    pub gate: ConnectionGate,
    pub stats: ServerStats,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start(mode: ModeConfig, max_connections: usize) -> Self {
        Self::start_with_timeouts(mode, max_connections, TimeoutConfig::default()).await
    }

    pub async fn start_with_timeouts(
        mode: ModeConfig,
        max_connections: usize,
        timeouts: TimeoutConfig,
    ) -> Self {
        let config = test_config()
            .max_connections(max_connections)
            .timeouts(timeouts)
            .build()
            .expect("Failed to build server config");
        Self::start_with_config(mode, config).await
    }

    pub async fn start_with_config(mode: ModeConfig, config: ServerConfig) -> Self {
        let handler = create_handler(&mode, &config);
        let server = Server::bind(&config, handler)
            .await
            .expect("Failed to bind server");
        let addr = server.local_addr().unwrap();
        let gate = server.gate().clone();
        let stats = server.stats().clone();

        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = server
                .run_until(async {
                    let _ = rx.await;
                })
                .await;
        });

        Self {
            addr,
            gate,
            stats,
            shutdown: Some(tx),
        }
    }

    /// Send raw bytes and read until the server closes
    pub async fn send(&self, request: &[u8]) -> Vec<u8> {
        send_raw(self.addr, request).await
    }

    /// Wait until the gate has no slot in use
    pub async fn wait_idle(&self) {
        for _ in 0..200 {
            if self.gate.in_use() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("server still has {} connections in use", self.gate.in_use());
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Builder bound to a free loopback port
pub fn test_config() -> ServerConfigBuilder {
    ServerConfigBuilder::new()
        .bind_addr("127.0.0.1")
        .bind_port(get_available_port())
}

/// Write a request and read the full response until EOF
pub async fn send_raw(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    timeout(Duration::from_secs(10), async {
        let mut stream = TcpStream::connect(addr)
            .await
            .expect("Failed to connect to server");
        stream
            .write_all(request)
            .await
            .expect("Failed to write request");

        let mut response = Vec::new();
        let _ = stream.read_to_end(&mut response).await;
        response
    })
    .await
    .expect("Timeout waiting for response")
}

/// Status line of a raw response
pub fn status_line(response: &[u8]) -> String {
    let text = String::from_utf8_lossy(response);
    text.lines().next().unwrap_or_default().to_string()
}

/// Body of a raw response (everything after the first blank line)
pub fn body(response: &[u8]) -> &[u8] {
    response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| &response[pos + 4..])
        .unwrap_or_default()
}

/// Mock origin: accepts one connection, captures the request head,
/// writes `response` and closes
pub async fn start_origin(response: Vec<u8>) -> (SocketAddr, oneshot::Receiver<Vec<u8>>) {
    let listener = TokioTcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind origin");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };

        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.ends_with(b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => head.extend_from_slice(&buf[..n]),
            }
        }

        let _ = socket.write_all(&response).await;
        let _ = socket.shutdown().await;
        let _ = tx.send(head);
    });

    (addr, rx)
}
