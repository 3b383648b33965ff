//! The per-request authorization decision

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::VerificationFailure;
use crate::header::{authorization_header, extract_bearer_token};
use crate::jwt::{ClaimsView, TokenProcessor};
use crate::route::{ProtectedRoutes, RouteRegistry};

/// What the gate needs to know about a request
pub trait GateRequest {
    /// Request path, without query string
    fn path(&self) -> &str;
    /// HTTP method name
    fn method(&self) -> &str;
    /// Raw `Authorization` header value
    fn authorization(&self) -> Option<&str>;
}

impl<B> GateRequest for http::Request<B> {
    fn path(&self) -> &str {
        self.uri().path()
    }

    fn method(&self) -> &str {
        self.method().as_str()
    }

    fn authorization(&self) -> Option<&str> {
        authorization_header(self.headers())
    }
}

/// Framework-independent request description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// Request path
    pub path: String,
    /// HTTP method
    pub method: String,
    /// Raw `Authorization` header value
    pub authorization: Option<String>,
}

impl RequestDescriptor {
    /// A request without an `Authorization` header
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            authorization: None,
        }
    }

    /// Set the raw `Authorization` header value
    #[must_use]
    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Set `Authorization: Bearer <token>`
    #[must_use]
    pub fn with_bearer_token(self, token: &str) -> Self {
        self.with_authorization(format!("Bearer {token}"))
    }
}

impl GateRequest for RequestDescriptor {
    fn path(&self) -> &str {
        &self.path
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }
}

/// Decision for one request
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// Let the request through; carries the claims when a token was verified
    Allowed(Option<ClaimsView>),
    /// The route is protected and no well-formed bearer token was supplied
    TokenMissing,
    /// The route is protected and the token did not verify
    TokenInvalid(VerificationFailure),
}

impl GateOutcome {
    /// Whether the request may proceed
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateOutcome::Allowed(_))
    }

    /// Verified claims, for an allowed request on a protected route
    pub fn claims(&self) -> Option<&ClaimsView> {
        match self {
            GateOutcome::Allowed(claims) => claims.as_ref(),
            _ => None,
        }
    }

    /// Take the verified claims
    pub fn into_claims(self) -> Option<ClaimsView> {
        match self {
            GateOutcome::Allowed(claims) => claims,
            _ => None,
        }
    }

    /// Stable machine-readable name of the outcome
    pub fn as_str(&self) -> &'static str {
        match self {
            GateOutcome::Allowed(_) => "allowed",
            GateOutcome::TokenMissing => "token_missing",
            GateOutcome::TokenInvalid(_) => "token_invalid",
        }
    }
}

/// Combines route protection with token verification
///
/// Cheap to clone and safe to share across request-handling tasks.
///
/// # Example
///
/// ```rust,no_run
/// use turnstile::{
///     AuthorizationGate, GateOutcome, ProcessorConfig, RouteRegistry, SigningAlgorithm,
///     TokenVerifier,
/// };
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ProcessorConfig::builder(
///     "https://auth.example.com/.well-known/jwks.json",
///     "https://auth.example.com",
///     SigningAlgorithm::RS256,
/// )
/// .build()?;
///
/// let mut routes = RouteRegistry::new();
/// routes
///     .register_route("/api/**")
///     .register_route_with_methods("/admin/*", ["POST", "DELETE"]);
///
/// let gate = AuthorizationGate::new(routes, TokenVerifier::new(config)?);
///
/// match gate.evaluate("/api/users", "GET", Some("Bearer eyJhbGciOi...")).await {
///     GateOutcome::Allowed(claims) => println!("allowed: {claims:?}"),
///     GateOutcome::TokenMissing => println!("401, no token"),
///     GateOutcome::TokenInvalid(reason) => println!("401, {reason}"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AuthorizationGate {
    routes: Arc<ProtectedRoutes>,
    processor: Arc<dyn TokenProcessor>,
}

impl AuthorizationGate {
    /// Seal `routes` and build the gate
    pub fn new(routes: RouteRegistry, processor: impl TokenProcessor + 'static) -> Self {
        Self::with_shared_processor(routes, Arc::new(processor))
    }

    /// Seal `routes` and build the gate around a shared processor
    pub fn with_shared_processor(
        routes: RouteRegistry,
        processor: Arc<dyn TokenProcessor>,
    ) -> Self {
        Self {
            routes: Arc::new(routes.seal()),
            processor,
        }
    }

    /// The sealed route set
    pub fn routes(&self) -> &ProtectedRoutes {
        &self.routes
    }

    /// Whether a request to `path` with `method` needs a valid token
    pub fn requires_authorization(&self, path: &str, method: &str) -> bool {
        self.routes.matches(path, method)
    }

    /// Decide whether a request may proceed
    ///
    /// Unprotected routes are allowed without looking at the header. On a
    /// protected route the header must be exactly `Bearer <token>`, and the
    /// token must verify.
    pub async fn evaluate(
        &self,
        path: &str,
        method: &str,
        authorization: Option<&str>,
    ) -> GateOutcome {
        if !self.routes.matches(path, method) {
            return GateOutcome::Allowed(None);
        }

        let Some(token) = extract_bearer_token(authorization) else {
            debug!(path, method, "Protected route requested without bearer token");
            return GateOutcome::TokenMissing;
        };

        match self.processor.process(token).await {
            Ok(claims) => GateOutcome::Allowed(Some(claims)),
            Err(failure) => {
                debug!(
                    path,
                    method,
                    failure = %failure,
                    "Protected route requested with invalid token"
                );
                GateOutcome::TokenInvalid(failure)
            }
        }
    }

    /// [`evaluate`](Self::evaluate) for anything implementing [`GateRequest`]
    pub async fn evaluate_request<R>(&self, request: &R) -> GateOutcome
    where
        R: GateRequest + Sync + ?Sized,
    {
        self.evaluate(request.path(), request.method(), request.authorization())
            .await
    }

    /// Verify a bare token regardless of route protection
    ///
    /// # Errors
    ///
    /// Returns the [`VerificationFailure`] reported by the token processor.
    pub async fn claims_for(&self, token: &str) -> Result<ClaimsView, VerificationFailure> {
        self.processor.process(token).await
    }
}

impl fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationGate")
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Rejects every token and counts calls
    #[derive(Default)]
    struct CountingProcessor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenProcessor for CountingProcessor {
        async fn process(&self, _token: &str) -> Result<ClaimsView, VerificationFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(VerificationFailure::SignatureInvalid)
        }
    }

    fn gate(processor: Arc<CountingProcessor>) -> AuthorizationGate {
        let mut routes = RouteRegistry::new();
        routes.register_route("/private/**");
        AuthorizationGate::with_shared_processor(routes, processor)
    }

    #[tokio::test]
    async fn test_unprotected_route_skips_verification() {
        let processor = Arc::new(CountingProcessor::default());
        let gate = gate(processor.clone());

        let outcome = gate.evaluate("/public", "GET", Some("Bearer x")).await;

        assert_eq!(outcome, GateOutcome::Allowed(None));
        assert_eq!(processor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_and_malformed_header() {
        let processor = Arc::new(CountingProcessor::default());
        let gate = gate(processor.clone());

        assert_eq!(
            gate.evaluate("/private/x", "GET", None).await,
            GateOutcome::TokenMissing
        );
        assert_eq!(
            gate.evaluate("/private/x", "GET", Some("Token abc")).await,
            GateOutcome::TokenMissing
        );
        assert_eq!(processor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_token_is_tagged() {
        let processor = Arc::new(CountingProcessor::default());
        let gate = gate(processor.clone());

        let request = RequestDescriptor::new("GET", "/private/x").with_bearer_token("abc");
        let outcome = gate.evaluate_request(&request).await;

        assert_eq!(
            outcome,
            GateOutcome::TokenInvalid(VerificationFailure::SignatureInvalid)
        );
        assert!(!outcome.is_allowed());
        assert_eq!(outcome.as_str(), "token_invalid");
        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_http_request_adapter() {
        let processor = Arc::new(CountingProcessor::default());
        let gate = gate(processor);

        let request = http::Request::builder()
            .method("DELETE")
            .uri("https://api.example.com/private/items/7?force=true")
            .body(())
            .unwrap();

        assert_eq!(request.path(), "/private/items/7");
        assert_eq!(GateRequest::method(&request), "DELETE");
        assert_eq!(
            gate.evaluate_request(&request).await,
            GateOutcome::TokenMissing
        );
    }
}
