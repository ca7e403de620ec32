//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → client_ip.rs (resolve ClientIdentity from tunnel/proxy headers or peer)
//!     → pipeline.rs (run stages in declared order)
//!         → origin_filter.rs (allow-list, 403 on miss)
//!         → credential.rs (bearer token, upstream/loopback exempt)
//!     → Pass to router
//! ```
//!
//! # Design Decisions
//! - Fail closed: an address that cannot be parsed matches no range
//! - Policy is built once and shared read-only; no global state
//! - Invalid credentials get a generic message

pub mod client_ip;
pub mod credential;
pub mod network;
pub mod origin_filter;
pub mod pipeline;

pub use client_ip::ClientIdentity;
pub use credential::CredentialGate;
pub use network::{AccessPolicy, NetworkRange, NetworkSet};
pub use origin_filter::OriginFilter;
pub use pipeline::{AccessLayer, AccessPipeline, Decision, Rejection, RequestView, Stage};
