//! Signature verification against a key set

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode};
use serde_json::{Map, Value};
use tracing::trace;

use super::claims::ParsedClaims;
use super::jwks::SigningKeySet;
use super::token::RawToken;
use crate::config::SigningAlgorithm;
use crate::error::{ConfigurationError, SignatureError};

/// Verifies token signatures for exactly one configured algorithm
///
/// Time-based and issuer checks are switched off in the
/// underlying `jsonwebtoken` validation; they belong to
/// [`ClaimsValidator`](super::ClaimsValidator), which runs against an
/// injectable clock.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    expected: SigningAlgorithm,
    validation: Validation,
}

impl SignatureVerifier {
    /// Create a verifier accepting only `expected`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnsupportedAlgorithm`] if the algorithm
    /// has no verification backend.
    pub fn new(expected: SigningAlgorithm) -> Result<Self, ConfigurationError> {
        let algorithm: Algorithm = expected.to_jwt()?;

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Ok(Self {
            expected,
            validation,
        })
    }

    /// The only algorithm this verifier accepts
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.expected
    }

    /// Verify `token` with a key from `keys`
    ///
    /// The header `alg` must equal the configured algorithm exactly. When the
    /// header names a `kid`, only that key is tried; otherwise each
    /// compatible key is tried in order until one verifies.
    ///
    /// # Errors
    ///
    /// - [`SignatureError::AlgorithmMismatch`] if the header algorithm differs
    /// - [`SignatureError::UnknownKeyId`] if no key qualifies
    /// - [`SignatureError::BadSignature`] if no qualifying key verifies
    /// - [`SignatureError::Malformed`] if the backend rejects the token's encoding
    pub fn verify(
        &self,
        token: &RawToken<'_>,
        keys: &SigningKeySet,
    ) -> Result<ParsedClaims, SignatureError> {
        let header = token.header();
        if header.alg != self.expected.as_str() {
            return Err(SignatureError::AlgorithmMismatch {
                expected: self.expected.as_str().to_string(),
                found: header.alg.clone(),
            });
        }

        let mut failure = None;
        for key in keys.candidates(token.key_id(), self.expected) {
            match decode::<Map<String, Value>>(token.as_str(), key.decoding_key(), &self.validation)
            {
                Ok(data) => return Ok(ParsedClaims::new(data.claims)),
                Err(e) => {
                    trace!(kid = ?key.key_id(), error = %e, "Key did not verify token");
                    let error = classify(&e);
                    if matches!(error, SignatureError::Malformed(_)) {
                        return Err(error);
                    }
                    failure = Some(error);
                }
            }
        }

        Err(failure.unwrap_or_else(|| SignatureError::UnknownKeyId(header.kid.clone())))
    }
}

fn classify(error: &jsonwebtoken::errors::Error) -> SignatureError {
    match error.kind() {
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            SignatureError::Malformed(error.to_string())
        }
        _ => SignatureError::BadSignature,
    }
}
