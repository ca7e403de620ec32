//! Memory gateway library.
//!
//! An HTTP service exposing five knowledge tables and a note vault through a
//! JSON-RPC tool protocol, gated by an IP allow-list and a bearer credential.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod mcp;
pub mod observability;
pub mod security;
pub mod store;
pub mod vault;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
