//! Origin filter: network allow-list stage.

use std::sync::Arc;

use crate::security::network::AccessPolicy;
use crate::security::pipeline::{Decision, Rejection, RequestView, Stage};

/// Rejects callers whose address is outside the [`AccessPolicy`].
///
/// When disabled every request passes, which is how local-only and test
/// deployments run.
#[derive(Debug, Clone)]
pub struct OriginFilter {
    enabled: bool,
    policy: Arc<AccessPolicy>,
}

impl OriginFilter {
    pub fn new(enabled: bool, policy: Arc<AccessPolicy>) -> Self {
        if enabled {
            tracing::info!(
                networks = policy.range_count(),
                "IP whitelist active"
            );
        } else {
            tracing::warn!("IP whitelist disabled");
        }
        Self { enabled, policy }
    }
}

impl Stage for OriginFilter {
    fn name(&self) -> &'static str {
        "origin"
    }

    fn check(&self, request: &RequestView<'_>) -> Decision {
        if !self.enabled {
            return Decision::Allow;
        }

        if self.policy.allows(request.client.as_str()) {
            Decision::Allow
        } else {
            tracing::warn!(client_ip = %request.client, "Blocked request");
            Decision::Reject(Rejection::OriginDenied)
        }
    }
}
