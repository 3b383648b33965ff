//! JWT verification
//!
//! The pipeline is split into independently usable stages:
//!
//! - [`token`] - structural parsing of compact tokens
//! - [`jwks`] - key sources and the single-flight key cache
//! - [`signature`] - algorithm check, key selection and signature verification
//! - [`claims`] - time window and issuer validation, read-only claims view
//! - [`processor`] - the stages wired together behind [`TokenProcessor`]

pub mod claims;
pub mod jwks;
pub mod processor;
pub mod signature;
pub mod token;

pub use claims::{ClaimsValidator, ClaimsView, ParsedClaims};
pub use jwks::{
    HttpKeySource, KeyCache, KeySnapshot, KeySource, SigningKey, SigningKeySet, StaticKeySource,
};
pub use processor::{TokenProcessor, TokenVerifier, TokenVerifierBuilder};
pub use signature::SignatureVerifier;
pub use token::{RawToken, TokenHeader};
