//! Tool-calling protocol (JSON-RPC 2.0, MCP-compatible).
//!
//! # Data Flow
//! ```text
//! POST /mcp body
//!     → handler.rs (parse envelope, dispatch method)
//!     → tools.rs (resolve tool, validate arguments, spawn_blocking)
//!     → RecordStore | Vault
//!     → protocol.rs (ToolResult / JsonRpcResponse)
//! ```
//!
//! # Design Decisions
//! - Tool failures are results with `isError: true`, not RPC errors
//! - Unknown tools and malformed `tools/call` params are RPC errors (-32602)
//! - Notifications never produce a body

pub mod handler;
pub mod protocol;
pub mod tools;

pub use handler::handle;
pub use protocol::{JsonRpcRequest, JsonRpcResponse, RpcError, ToolResult};
pub use tools::{Tool, ToolDescriptor, ToolError, ToolRegistry};
