//! # Turnstile - Bearer Token Gate for HTTP Services
//!
//! Verifies JWT bearer tokens against a remote JSON Web Key Set and decides,
//! per request, whether a route needs a token at all.
//!
//! ## Key Features
//!
//! - **JWKS verification** - keys fetched lazily, cached, and refreshed once
//!   when a token names an unknown key ID (key rotation)
//! - **Single-flight fetching** - concurrent requests share one JWKS fetch
//! - **Strict claim checks** - exact issuer match, `exp`/`nbf` against an
//!   injectable clock, no clock skew
//! - **Non-disclosing failures** - callers learn only which stage failed,
//!   never which individual check
//! - **Ant-style route patterns** - `?`, `*`, `**`, `{name}` path variables,
//!   optional method sets and automatic trailing-slash equivalence
//!
//! ## Architecture
//!
//! - [`config`] - `ProcessorConfig`, `SigningAlgorithm`, serde settings
//! - [`jwt`] - token parsing, key sources and cache, signature and claim
//!   validation, the `TokenVerifier`
//! - [`route`] - `RoutePattern`, `RouteRegistry`, `ProtectedRoutes`
//! - [`gate`] - `AuthorizationGate`, the single per-request decision
//! - [`header`] - `Authorization: Bearer` extraction
//! - `tower` - Layer/Service adapter (feature `middleware`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use turnstile::{
//!     AuthorizationGate, GateOutcome, ProcessorConfig, RouteRegistry, SigningAlgorithm,
//!     TokenVerifier,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProcessorConfig::builder(
//!     "https://auth.example.com/.well-known/jwks.json",
//!     "https://auth.example.com",
//!     SigningAlgorithm::RS256,
//! )
//! .build()?;
//!
//! let mut routes = RouteRegistry::new();
//! routes.register_route("/api/**");
//!
//! let gate = AuthorizationGate::new(routes, TokenVerifier::new(config)?);
//!
//! let outcome = gate
//!     .evaluate("/api/orders", "GET", Some("Bearer eyJhbGciOi..."))
//!     .await;
//! if let GateOutcome::Allowed(Some(claims)) = outcome {
//!     println!("subject: {:?}", claims.subject());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `middleware` - tower `GateLayer` / `GateService`
//! - `full` - all features enabled

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod header;
pub mod jwt;
pub mod route;

#[cfg(feature = "middleware")]
#[cfg_attr(docsrs, doc(cfg(feature = "middleware")))]
pub mod tower;

#[doc(inline)]
pub use clock::{Clock, FixedClock, SystemClock};

#[doc(inline)]
pub use config::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_READ_TIMEOUT_MS, KeyType, ProcessorConfig,
    ProcessorConfigBuilder, ProcessorSettings, SigningAlgorithm,
};

#[doc(inline)]
pub use error::{
    ClaimAccessError, ClaimsError, ConfigurationError, KeyFetchError, SignatureError,
    VerificationFailure,
};

#[doc(inline)]
pub use gate::{AuthorizationGate, GateOutcome, GateRequest, RequestDescriptor};

#[doc(inline)]
pub use header::{BEARER_SCHEME, bearer_token_from_headers, extract_bearer_token};

#[doc(inline)]
pub use jwt::{
    ClaimsValidator, ClaimsView, HttpKeySource, KeyCache, KeySnapshot, KeySource, ParsedClaims,
    RawToken, SignatureVerifier, SigningKey, SigningKeySet, StaticKeySource, TokenHeader,
    TokenProcessor, TokenVerifier, TokenVerifierBuilder,
};

#[doc(inline)]
pub use route::{ProtectedRoutes, RoutePattern, RouteRegistry};
