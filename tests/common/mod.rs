//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use memory_gateway::config::GatewayConfig;
use memory_gateway::http::HttpServer;
use memory_gateway::lifecycle::Shutdown;
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tower::ServiceExt;

/// Config rooted in a fresh temp dir: snapshots under `data/`, vault under `vault/`.
pub fn test_config(dir: &TempDir) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.port = 0;
    config.store.data_dir = dir.path().join("data");
    config.vault.root = dir.path().join("vault");
    config
}

/// Layered router for `oneshot` tests.
pub fn router(config: GatewayConfig) -> Router {
    HttpServer::new(config).unwrap().router()
}

/// Bind on an ephemeral loopback port and serve in the background.
pub async fn start_gateway(config: GatewayConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let server = HttpServer::new(config).unwrap();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

/// `GET /health` as seen from `peer`, with optional extra headers.
pub fn health_from(peer: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri("/health");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let mut request = builder.body(Body::empty()).unwrap();
    let peer: SocketAddr = if peer.contains(':') {
        format!("[{peer}]:40000")
    } else {
        format!("{peer}:40000")
    }
    .parse()
    .unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    request
}

/// Run one request through the router; return status, headers and JSON body.
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, body)
}
