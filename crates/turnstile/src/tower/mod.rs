//! # Tower Middleware Integration
//!
//! Runs the [`AuthorizationGate`](crate::AuthorizationGate) in front of any
//! tower service over `http::Request<B>`.
//!
//! - [`GateLayer`] - wraps services with the gate
//! - [`GateService`] - evaluates each request before forwarding it
//! - [`RejectionHandler`] - builds the response for rejected requests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tower::ServiceBuilder;
//! use turnstile::tower::GateLayer;
//!
//! let service = ServiceBuilder::new()
//!     .layer(GateLayer::new(gate))
//!     .service(my_http_handler);
//! ```
//!
//! ## Request Extensions
//!
//! When a protected route is allowed, the verified
//! [`ClaimsView`](crate::ClaimsView) is inserted into the request's
//! extensions:
//!
//! ```rust,ignore
//! if let Some(claims) = req.extensions().get::<ClaimsView>() {
//!     println!("Authenticated subject: {:?}", claims.subject());
//! }
//! ```
//!
//! Requests to unprotected routes carry no claims; handlers that still want
//! them can call [`AuthorizationGate::claims_for`](crate::AuthorizationGate::claims_for).

mod layer;
mod service;

pub use layer::GateLayer;
pub use service::{GateService, GateServiceFuture};

use http::header::WWW_AUTHENTICATE;
use http::{HeaderValue, Response, StatusCode};

use crate::error::VerificationFailure;

/// Challenge sent when no bearer token was supplied
pub const MISSING_TOKEN_CHALLENGE: &str = "Bearer";

/// Challenge sent when the bearer token did not verify
pub const INVALID_TOKEN_CHALLENGE: &str = "Bearer error=\"invalid_token\"";

/// Builds the response for a request the gate rejected
///
/// Responses are bodiless; [`GateService`] fills in the body type's default.
/// The failure tag only names the failed stage, so a response built from it cannot
/// disclose which verification check failed.
pub trait RejectionHandler: Send + Sync + 'static {
    /// Response for a protected route requested without a bearer token
    fn missing_token(&self) -> Response<()> {
        unauthorized(MISSING_TOKEN_CHALLENGE)
    }

    /// Response for a protected route requested with an invalid token
    fn invalid_token(&self, _failure: VerificationFailure) -> Response<()> {
        unauthorized(INVALID_TOKEN_CHALLENGE)
    }
}

/// `401 Unauthorized` with a `WWW-Authenticate` challenge and no body
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRejectionHandler;

impl RejectionHandler for DefaultRejectionHandler {}

fn unauthorized(challenge: &'static str) -> Response<()> {
    let mut response = Response::new(());
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response
        .headers_mut()
        .insert(WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
    response
}
