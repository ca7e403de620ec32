//! Credential gate: bearer-token stage.
//!
//! # Auth matrix
//! ```text
//! | Source              | Origin filter | Bearer token |
//! |---------------------|---------------|--------------|
//! | Upstream provider   | checked       | skipped      |
//! | Local network (LAN) | checked       | checked      |
//! | Loopback            | checked       | skipped      |
//! ```
//!
//! Loopback skips the token even when the origin filter is disabled.

use std::sync::Arc;

use axum::http::header;
use subtle::ConstantTimeEq;

use crate::security::network::AccessPolicy;
use crate::security::pipeline::{Decision, Rejection, RequestView, Stage};

const BEARER_PREFIX: &str = "Bearer ";

/// Validates `Authorization: Bearer <token>` against the configured API key.
#[derive(Clone)]
pub struct CredentialGate {
    /// `None` means authless mode.
    api_key: Option<String>,
    policy: Arc<AccessPolicy>,
}

impl CredentialGate {
    /// An empty `api_key` disables credential checking entirely.
    pub fn new(api_key: impl Into<String>, policy: Arc<AccessPolicy>) -> Self {
        let api_key = Some(api_key.into()).filter(|key| !key.is_empty());
        if api_key.is_some() {
            tracing::info!("Bearer auth enabled (upstream and loopback exempt)");
        } else {
            tracing::warn!("Bearer auth disabled (no API key configured)");
        }
        Self { api_key, policy }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

impl std::fmt::Debug for CredentialGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialGate")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl Stage for CredentialGate {
    fn name(&self) -> &'static str {
        "credential"
    }

    fn check(&self, request: &RequestView<'_>) -> Decision {
        let Some(api_key) = &self.api_key else {
            return Decision::Allow;
        };

        if self.policy.is_credential_exempt(request.client.as_str()) {
            return Decision::Allow;
        }

        let token = request
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix(BEARER_PREFIX));

        let Some(token) = token else {
            tracing::debug!(client_ip = %request.client, "Missing bearer token");
            return Decision::Reject(Rejection::CredentialMissing);
        };

        if constant_time_eq(token, api_key) {
            Decision::Allow
        } else {
            tracing::debug!(client_ip = %request.client, "Bearer token rejected");
            Decision::Reject(Rejection::CredentialInvalid)
        }
    }
}

/// Compare two secrets without an early exit on the first differing byte.
///
/// Both inputs are padded to the longer length with different filler bytes, so
/// a length mismatch costs the same as a content mismatch and never short-circuits.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let len = a.len().max(b.len());

    let mut a_padded = vec![0x00u8; len];
    let mut b_padded = vec![0xFFu8; len];
    a_padded[..a.len()].copy_from_slice(a.as_bytes());
    b_padded[..b.len()].copy_from_slice(b.as_bytes());

    let lengths_equal = (a.len() as u64).ct_eq(&(b.len() as u64));
    let contents_equal = a_padded.ct_eq(&b_padded);

    (lengths_equal & contents_equal).into()
}
