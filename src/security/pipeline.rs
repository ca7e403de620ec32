//! Ordered access-control pipeline.
//!
//! Stages run in the order they are declared, and the first rejection wins.
//! The pipeline is installed as a single tower layer, so stage order does not
//! depend on how layers are registered on the router.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service};

use crate::config::SecurityConfig;
use crate::http::response::json_error;
use crate::observability::metrics;
use crate::security::client_ip::ClientIdentity;
use crate::security::credential::CredentialGate;
use crate::security::network::AccessPolicy;
use crate::security::origin_filter::OriginFilter;

/// What a stage sees of the request.
#[derive(Debug, Clone, Copy)]
pub struct RequestView<'a> {
    pub client: &'a ClientIdentity,
    pub headers: &'a HeaderMap,
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Caller address is not on the allow-list.
    OriginDenied,
    /// No usable `Authorization: Bearer` header.
    CredentialMissing,
    /// Bearer token did not match.
    CredentialInvalid,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::OriginDenied | Rejection::CredentialInvalid => StatusCode::FORBIDDEN,
            Rejection::CredentialMissing => StatusCode::UNAUTHORIZED,
        }
    }

    /// Client-facing message. Deliberately generic for invalid credentials.
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::OriginDenied => "Access denied",
            Rejection::CredentialMissing => "Missing or invalid Authorization header",
            Rejection::CredentialInvalid => "Invalid API key",
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let mut response = json_error(self.status(), self.message());
        if self == Rejection::CredentialMissing {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Outcome of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Reject(Rejection),
}

/// One access-control check.
pub trait Stage: Send + Sync + 'static {
    /// Short label used in logs and metrics.
    fn name(&self) -> &'static str;

    fn check(&self, request: &RequestView<'_>) -> Decision;
}

/// An ordered list of stages.
#[derive(Clone)]
pub struct AccessPipeline {
    stages: Arc<[Box<dyn Stage>]>,
}

impl AccessPipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self {
            stages: stages.into(),
        }
    }

    /// Origin filter first, credential gate second.
    pub fn from_config(security: &SecurityConfig, policy: Arc<AccessPolicy>) -> Self {
        Self::new(vec![
            Box::new(OriginFilter::new(
                security.ip_whitelist_enabled,
                Arc::clone(&policy),
            )),
            Box::new(CredentialGate::new(security.api_key.clone(), policy)),
        ])
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run every stage in order; stop at the first rejection.
    pub fn evaluate(&self, request: &RequestView<'_>) -> Result<(), Rejection> {
        for stage in self.stages.iter() {
            if let Decision::Reject(rejection) = stage.check(request) {
                metrics::record_access_denied(stage.name());
                return Err(rejection);
            }
        }
        Ok(())
    }

    /// Convenience wrapper resolving the client identity from a request.
    pub fn evaluate_request<B>(&self, req: &Request<B>) -> Result<(), Rejection> {
        let client = ClientIdentity::from_request(req);
        self.evaluate(&RequestView {
            client: &client,
            headers: req.headers(),
        })
    }
}

impl std::fmt::Debug for AccessPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessPipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Tower layer applying an [`AccessPipeline`].
#[derive(Clone, Debug)]
pub struct AccessLayer {
    pipeline: AccessPipeline,
}

impl AccessLayer {
    pub fn new(pipeline: AccessPipeline) -> Self {
        Self { pipeline }
    }
}

impl<S> Layer<S> for AccessLayer {
    type Service = AccessService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessService {
            inner,
            pipeline: self.pipeline.clone(),
        }
    }
}

/// Service produced by [`AccessLayer`].
#[derive(Clone, Debug)]
pub struct AccessService<S> {
    inner: S,
    pipeline: AccessPipeline,
}

impl<S> Service<Request<Body>> for AccessService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let verdict = self.pipeline.evaluate_request(&req);

        // Keep the service that was polled ready; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match verdict {
                Ok(()) => inner.call(req).await,
                Err(rejection) => Ok(rejection.into_response()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::network::NetworkSet;

    struct Fixed(&'static str, Decision);

    impl Stage for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn check(&self, _request: &RequestView<'_>) -> Decision {
            self.1
        }
    }

    fn eval(pipeline: &AccessPipeline, ip: &str) -> Result<(), Rejection> {
        let client = ClientIdentity::new(ip);
        let headers = HeaderMap::new();
        pipeline.evaluate(&RequestView {
            client: &client,
            headers: &headers,
        })
    }

    #[test]
    fn test_first_rejection_wins() {
        let pipeline = AccessPipeline::new(vec![
            Box::new(Fixed("origin", Decision::Reject(Rejection::OriginDenied))),
            Box::new(Fixed("credential", Decision::Reject(Rejection::CredentialMissing))),
        ]);
        assert_eq!(
            eval(&pipeline, "8.8.8.8"),
            Err(Rejection::OriginDenied)
        );
    }

    #[test]
    fn test_declared_order() {
        let security = SecurityConfig {
            api_key: "secret123".into(),
            ip_whitelist_enabled: true,
            allowed_ips: Vec::new(),
        };
        let pipeline = AccessPipeline::from_config(&security, Arc::new(AccessPolicy::default()));
        assert_eq!(pipeline.stage_names(), vec!["origin", "credential"]);
    }

    #[test]
    fn test_untrusted_origin_without_token_is_denied_not_challenged() {
        let security = SecurityConfig {
            api_key: "secret123".into(),
            ip_whitelist_enabled: true,
            allowed_ips: Vec::new(),
        };
        let policy = AccessPolicy::from_sets(
            NetworkSet::default(),
            NetworkSet::default(),
            NetworkSet::parse("local", ["10.0.0.0/8"]),
            NetworkSet::default(),
        );
        let pipeline = AccessPipeline::from_config(&security, Arc::new(policy));

        assert_eq!(
            eval(&pipeline, "203.0.113.5"),
            Err(Rejection::OriginDenied)
        );
        assert_eq!(
            eval(&pipeline, "10.1.2.3"),
            Err(Rejection::CredentialMissing)
        );
    }

    #[test]
    fn test_rejection_responses() {
        let missing = Rejection::CredentialMissing.into_response();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(missing.headers()[header::WWW_AUTHENTICATE], "Bearer");

        let invalid = Rejection::CredentialInvalid.into_response();
        assert_eq!(invalid.status(), StatusCode::FORBIDDEN);
        assert!(invalid.headers().get(header::WWW_AUTHENTICATE).is_none());

        assert_eq!(Rejection::OriginDenied.status(), StatusCode::FORBIDDEN);
    }
}
