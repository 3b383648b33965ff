//! Error types for token verification and gate configuration
//!
//! Only [`ConfigurationError`] is meant to abort anything: it is raised while
//! building a [`ProcessorConfig`](crate::ProcessorConfig) or a
//! [`TokenVerifier`](crate::TokenVerifier) at startup. Everything that can go
//! wrong with an individual token is an ordinary value. The detailed errors
//! ([`SignatureError`], [`ClaimsError`], [`KeyFetchError`]) are logged and then
//! collapsed into a [`VerificationFailure`] tag so callers cannot learn which
//! individual check rejected a token.

use std::fmt;

use thiserror::Error;

/// Fatal configuration problems detected at construction time
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The JWKS URL does not parse
    #[error("Invalid JWKS URL '{url}': {reason}")]
    InvalidJwksUrl {
        /// The configured URL text
        url: String,
        /// Parser or scheme message
        reason: String,
    },

    /// Plain HTTP to a non-loopback host
    #[error("JWKS URL must use HTTPS (HTTP only allowed for loopback hosts): {0}")]
    InsecureJwksUrl(String),

    /// No issuer configured
    #[error("Expected issuer must not be empty")]
    EmptyIssuer,

    /// Not a JOSE signing algorithm name
    #[error("Unknown signing algorithm: {0}")]
    UnknownAlgorithm(String),

    /// Known algorithm the verification backend cannot check
    #[error("Signing algorithm {0} is not supported by the verification backend")]
    UnsupportedAlgorithm(String),

    /// Connect or read timeout below zero
    #[error("{name} must not be negative (got {value} ms)")]
    NegativeTimeout {
        /// Setting name
        name: &'static str,
        /// Configured value
        value: i64,
    },

    /// The JWKS HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

impl ConfigurationError {
    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ConfigurationError::InvalidJwksUrl { .. } => "invalid_jwks_url",
            ConfigurationError::InsecureJwksUrl(_) => "insecure_jwks_url",
            ConfigurationError::EmptyIssuer => "empty_issuer",
            ConfigurationError::UnknownAlgorithm(_) => "unknown_algorithm",
            ConfigurationError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            ConfigurationError::NegativeTimeout { .. } => "negative_timeout",
            ConfigurationError::HttpClient(_) => "http_client",
        }
    }
}

/// Failure to obtain a usable key set from the remote JWKS endpoint
///
/// Recoverable: a later call attempts the fetch again. The type is `Clone`
/// because one coalesced fetch hands its outcome to every waiting caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyFetchError {
    /// Connection or protocol failure
    #[error("JWKS request failed: {0}")]
    Transport(String),

    /// Connect or read timeout elapsed
    #[error("JWKS request timed out: {0}")]
    Timeout(String),

    /// Non-success HTTP status
    #[error("JWKS endpoint returned status {0}")]
    Status(u16),

    /// Body is not a JWKS document
    #[error("Invalid JWKS document: {0}")]
    Parse(String),

    /// Every key was skipped or the set was empty
    #[error("JWKS document contains no usable keys")]
    Empty,
}

impl KeyFetchError {
    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            KeyFetchError::Transport(_) => "transport",
            KeyFetchError::Timeout(_) => "timeout",
            KeyFetchError::Status(_) => "status",
            KeyFetchError::Parse(_) => "parse",
            KeyFetchError::Empty => "empty",
        }
    }
}

/// Reasons a token's structure or signature was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Not three base64url segments with a JSON header and payload
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Header `alg` differs from the configured algorithm
    #[error("Token algorithm '{found}' does not match expected '{expected}'")]
    AlgorithmMismatch {
        /// Configured algorithm
        expected: String,
        /// Header `alg`
        found: String,
    },

    /// No compatible key carries the token's `kid`
    #[error("No key in the key set matches key ID {0:?}")]
    UnknownKeyId(Option<String>),

    /// No candidate key verified the signature
    #[error("Signature verification failed")]
    BadSignature,
}

impl SignatureError {
    /// Whether a key set refresh could change the outcome
    pub fn is_key_miss(&self) -> bool {
        matches!(self, SignatureError::UnknownKeyId(_))
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            SignatureError::Malformed(_) => "malformed",
            SignatureError::AlgorithmMismatch { .. } => "algorithm_mismatch",
            SignatureError::UnknownKeyId(_) => "unknown_key_id",
            SignatureError::BadSignature => "bad_signature",
        }
    }
}

/// Reasons a verified token's claims were rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    /// `exp` is at or before the current time
    #[error("Token expired at {expired_at}")]
    Expired {
        /// `exp` in seconds since the epoch
        expired_at: i64,
    },

    /// `nbf` is after the current time
    #[error("Token not valid before {not_before}")]
    NotYetValid {
        /// `nbf` in seconds since the epoch
        not_before: i64,
    },

    /// `iss` is not exactly the configured issuer
    #[error("Token issuer '{found}' does not match expected issuer")]
    IssuerMismatch {
        /// Issuer the token carried
        found: String,
    },

    /// A required claim is absent
    #[error("Required claim '{0}' is missing")]
    MissingClaim(&'static str),

    /// A registered claim has the wrong JSON type
    #[error("Claim '{0}' has an invalid value")]
    InvalidClaim(&'static str),
}

impl ClaimsError {
    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ClaimsError::Expired { .. } => "expired",
            ClaimsError::NotYetValid { .. } => "not_yet_valid",
            ClaimsError::IssuerMismatch { .. } => "issuer_mismatch",
            ClaimsError::MissingClaim(_) => "missing_claim",
            ClaimsError::InvalidClaim(_) => "invalid_claim",
        }
    }
}

/// Typed claim access on a [`ClaimsView`](crate::ClaimsView) failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimAccessError {
    /// The claim exists but has another JSON type
    #[error("Claim '{name}' is not a {expected}")]
    WrongType {
        /// Claim name
        name: String,
        /// Expected JSON type
        expected: &'static str,
    },

    /// Deserializing into the caller's type failed
    #[error("Claims cannot be bound to the requested type: {0}")]
    Bind(String),
}

/// Outcome tag for a token that did not verify
///
/// This is what [`TokenVerifier::process`](crate::TokenVerifier::process)
/// returns on failure and what the gate reports for an invalid token. It
/// carries no detail beyond the stage that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationFailure {
    /// The token is not a structurally valid compact JWS
    Malformed,
    /// Algorithm, key selection or signature check failed
    SignatureInvalid,
    /// Expiry, not-before or issuer check failed
    ClaimsInvalid,
    /// The key set could not be fetched
    KeySourceUnavailable,
}

impl VerificationFailure {
    /// Stable machine-readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationFailure::Malformed => "malformed",
            VerificationFailure::SignatureInvalid => "signature_invalid",
            VerificationFailure::ClaimsInvalid => "claims_invalid",
            VerificationFailure::KeySourceUnavailable => "key_source_unavailable",
        }
    }
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for VerificationFailure {}

impl From<SignatureError> for VerificationFailure {
    fn from(error: SignatureError) -> Self {
        match error {
            SignatureError::Malformed(_) => VerificationFailure::Malformed,
            _ => VerificationFailure::SignatureInvalid,
        }
    }
}

impl From<ClaimsError> for VerificationFailure {
    fn from(_: ClaimsError) -> Self {
        VerificationFailure::ClaimsInvalid
    }
}

impl From<KeyFetchError> for VerificationFailure {
    fn from(_: KeyFetchError) -> Self {
        VerificationFailure::KeySourceUnavailable
    }
}
