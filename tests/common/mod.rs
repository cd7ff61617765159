//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use forward_proxy::config::LimitsConfig;
use forward_proxy::net::{ConnectionRegistry, ListenerError};
use forward_proxy::proxy::session::read_request;
use forward_proxy::upstream::{Connector, Resolve, ResolveError};
use forward_proxy::{ProxyConfig, ProxyServer, Shutdown};

/// Start a mock backend that records each request and answers with `body`.
pub async fn start_recording_backend(body: &'static str) -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(request) = read_request(&mut socket, &LimitsConfig::default()).await else {
                    return;
                };
                let _ = tx.send(request);

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, rx)
}

/// Start a backend that echoes every byte until the peer half-closes.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut rx, mut tx) = socket.into_split();
                let _ = tokio::io::copy(&mut rx, &mut tx).await;
                let _ = tx.shutdown().await;
            });
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Resolver with a fixed name table; unknown names are NotFound.
pub struct StaticResolver {
    table: HashMap<String, Vec<SocketAddr>>,
}

impl StaticResolver {
    pub fn new(entries: &[(&str, Vec<SocketAddr>)]) -> Self {
        Self {
            table: entries
                .iter()
                .map(|(name, addrs)| (name.to_string(), addrs.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl Resolve for StaticResolver {
    // Table entries carry their own ports.
    async fn resolve(&self, host: &str, _port: u16) -> Result<Vec<SocketAddr>, ResolveError> {
        self.table
            .get(host)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound { host: host.to_string() })
    }
}

/// A running proxy on an ephemeral loopback port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub registry: Arc<ConnectionRegistry>,
    pub handle: JoinHandle<Result<(), ListenerError>>,
}

pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.timeouts.request_read_secs = 5;
    config.timeouts.connect_secs = 2;
    config.timeouts.idle_secs = 5;
    config
}

/// Start a proxy with `config`, optionally with a custom connector.
pub async fn start_proxy_with(config: ProxyConfig, connector: Option<Connector>) -> TestProxy {
    let mut server = ProxyServer::bind(config).unwrap();
    if let Some(connector) = connector {
        server = server.with_connector(connector);
    }
    let addr = server.local_addr().unwrap();
    let registry = server.registry();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(shutdown.clone()));

    TestProxy {
        addr,
        shutdown,
        registry,
        handle,
    }
}

pub async fn start_proxy() -> TestProxy {
    start_proxy_with(test_config(), None).await
}

/// Send raw bytes through the proxy and collect everything until close.
pub async fn exchange(proxy: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    reply
}

/// Read from `stream` until the head terminator has arrived.
pub async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert!(n > 0, "connection closed before head completed");
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}
