//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the store, vault and tool registry from config
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Install the access pipeline in front of every route
//! - Bind and serve with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::mcp::{self, ToolRegistry};
use crate::security::{AccessLayer, AccessPipeline, AccessPolicy};
use crate::store::{RecordStore, SnapshotStore, StoreError};
use crate::vault::{Vault, VaultError};

/// Startup failures.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("record store: {0}")]
    Store(#[from] StoreError),
    #[error("vault: {0}")]
    Vault(#[from] VaultError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub tools: ToolRegistry,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
}

impl HttpServer {
    /// Open the snapshot store and vault named in `config`.
    pub fn new(config: GatewayConfig) -> Result<Self, ServerError> {
        let store = SnapshotStore::open(&config.store.data_dir, config.store.persist)?;
        let vault = Vault::new(config.vault.root.clone(), config.vault.max_file_bytes);
        vault.ensure_root()?;

        Ok(Self::with_backends(config, Arc::new(store), Arc::new(vault)))
    }

    /// Build a server around an existing store and vault.
    pub fn with_backends(
        config: GatewayConfig,
        store: Arc<dyn RecordStore>,
        vault: Arc<Vault>,
    ) -> Self {
        let policy = Arc::new(AccessPolicy::new(&config.security.allowed_ips));
        tracing::info!(ranges = policy.range_count(), "Access policy built");

        let pipeline = AccessPipeline::from_config(&config.security, policy);
        let state = AppState {
            tools: ToolRegistry::new(store, vault),
        };

        let router = Self::build_router(&config, pipeline, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Outermost first: request ID, trace, request ID echo, timeout, access
    /// pipeline, body limit, handlers. Gate rejections therefore still carry
    /// `x-request-id` and show up in the trace span.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, pipeline: AccessPipeline, state: AppState) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/mcp", post(mcp_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.limits.max_body_bytes))
            .layer(AccessLayer::new(pipeline))
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            method = %req.method(),
                            path = %req.uri().path(),
                            request_id = %req.request_id(),
                        )
                    }))
                    .layer(propagate_request_id_layer())
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.timeouts.request_secs,
                    ))),
            )
    }

    /// The fully layered router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            whitelist = self.config.security.ip_whitelist_enabled,
            auth = !self.config.security.api_key.is_empty(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// JSON-RPC entry point. Notifications get `202 Accepted` with no body.
async fn mcp_handler(State(state): State<AppState>, body: Bytes) -> Response {
    match mcp::handle(&state.tools, &body).await {
        Some(reply) => Json(reply).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
