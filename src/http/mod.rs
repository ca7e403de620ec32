//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (peer address kept via ConnectInfo)
//!     → request.rs (assign x-request-id)
//!     → security::pipeline (origin filter, credential gate)
//!     → server.rs (route: /health, /mcp)
//!     → response.rs (JSON error bodies)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use response::json_error;
pub use server::{AppState, HttpServer, ServerError};
