//! End-to-end token processing

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::claims::{ClaimsValidator, ClaimsView};
use super::jwks::{HttpKeySource, KeyCache, KeySource};
use super::signature::SignatureVerifier;
use super::token::RawToken;
use crate::clock::{Clock, SystemClock};
use crate::config::ProcessorConfig;
use crate::error::{ConfigurationError, KeyFetchError, VerificationFailure};

/// Turns a bearer token into verified claims
///
/// Implemented by [`TokenVerifier`]; the gate only depends on this trait so
/// that alternative verification strategies can be plugged in.
#[async_trait]
pub trait TokenProcessor: Send + Sync {
    /// Verify `token` and return its claims
    async fn process(&self, token: &str) -> Result<ClaimsView, VerificationFailure>;
}

/// JWT verifier backed by a cached remote key set
///
/// Processing a token runs, in order: structural parsing, key lookup,
/// signature verification and claim validation. If the token names a key ID
/// that the cached key set lacks, the key set is refreshed once and
/// verification retried. The reason for any rejection is logged at debug
/// level and collapsed into a [`VerificationFailure`].
///
/// # Example
///
/// ```rust,no_run
/// use turnstile::{ProcessorConfig, SigningAlgorithm, TokenVerifier};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ProcessorConfig::builder(
///     "https://auth.example.com/.well-known/jwks.json",
///     "https://auth.example.com",
///     SigningAlgorithm::RS256,
/// )
/// .build()?;
///
/// let verifier = TokenVerifier::new(config)?;
/// let claims = verifier.process("eyJhbGciOi...").await?;
/// println!("subject: {:?}", claims.subject());
/// # Ok(())
/// # }
/// ```
pub struct TokenVerifier {
    config: ProcessorConfig,
    keys: KeyCache,
    signature: SignatureVerifier,
    claims: ClaimsValidator,
}

impl TokenVerifier {
    /// Create a verifier fetching keys from the configured JWKS URL
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the algorithm is unsupported or the
    /// HTTP client cannot be built.
    pub fn new(config: ProcessorConfig) -> Result<Self, ConfigurationError> {
        Self::builder(config).build()
    }

    /// Start building a verifier with a custom key source or clock
    pub fn builder(config: ProcessorConfig) -> TokenVerifierBuilder {
        TokenVerifierBuilder {
            config,
            key_source: None,
            clock: None,
        }
    }

    /// The configuration this verifier was built from
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// The key cache, for inspection and manual invalidation
    pub fn key_cache(&self) -> &KeyCache {
        &self.keys
    }

    /// Verify `token` and return its claims
    ///
    /// # Errors
    ///
    /// Returns the [`VerificationFailure`] of the first stage that rejected
    /// the token.
    pub async fn process(&self, token: &str) -> Result<ClaimsView, VerificationFailure> {
        let token = RawToken::parse(token).map_err(|e| {
            debug!(reason = %e, "Rejected malformed token");
            VerificationFailure::from(e)
        })?;

        let snapshot = self.keys.current().await.map_err(key_source_unavailable)?;

        let parsed = match self.signature.verify(&token, snapshot.keys()) {
            Ok(parsed) => parsed,
            Err(e) if e.is_key_miss() => {
                debug!(
                    kid = ?token.key_id(),
                    revision = snapshot.revision(),
                    "Key not in cached JWKS, refreshing and retrying"
                );
                let refreshed = self
                    .keys
                    .refresh(&snapshot)
                    .await
                    .map_err(key_source_unavailable)?;

                self.signature
                    .verify(&token, refreshed.keys())
                    .map_err(|e| {
                        debug!(
                            reason = %e,
                            category = e.category(),
                            "Signature rejected after JWKS refresh"
                        );
                        VerificationFailure::from(e)
                    })?
            }
            Err(e) => {
                debug!(reason = %e, category = e.category(), "Signature rejected");
                return Err(e.into());
            }
        };

        let claims = self.claims.validate(parsed, &self.config).map_err(|e| {
            debug!(reason = %e, category = e.category(), "Claims rejected");
            VerificationFailure::from(e)
        })?;

        debug!(subject = ?claims.subject(), "Token verified");
        Ok(claims)
    }
}

fn key_source_unavailable(error: KeyFetchError) -> VerificationFailure {
    warn!(error = %error, category = error.category(), "JWKS unavailable");
    VerificationFailure::from(error)
}

#[async_trait]
impl TokenProcessor for TokenVerifier {
    async fn process(&self, token: &str) -> Result<ClaimsView, VerificationFailure> {
        TokenVerifier::process(self, token).await
    }
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("config", &self.config)
            .field("keys", &self.keys)
            .field("algorithm", &self.signature.algorithm())
            .finish()
    }
}

/// Builder for [`TokenVerifier`]
#[derive(Debug)]
#[must_use]
pub struct TokenVerifierBuilder {
    config: ProcessorConfig,
    key_source: Option<Arc<dyn KeySource>>,
    clock: Option<Arc<dyn Clock>>,
}

impl TokenVerifierBuilder {
    /// Fetch keys from `source` instead of the configured JWKS URL
    pub fn key_source(mut self, source: impl KeySource + 'static) -> Self {
        self.key_source = Some(Arc::new(source));
        self
    }

    /// Fetch keys from a shared source
    pub fn shared_key_source(mut self, source: Arc<dyn KeySource>) -> Self {
        self.key_source = Some(source);
        self
    }

    /// Read time from `clock` instead of the system clock
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Build the verifier
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the algorithm is unsupported or,
    /// when no custom key source was given, the HTTP client cannot be built.
    pub fn build(self) -> Result<TokenVerifier, ConfigurationError> {
        let signature = SignatureVerifier::new(self.config.algorithm())?;

        let source = match self.key_source {
            Some(source) => source,
            None => Arc::new(HttpKeySource::new(&self.config)?),
        };
        let keys =
            KeyCache::new(source).with_min_refresh_interval(self.config.min_refresh_interval());

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        Ok(TokenVerifier {
            keys,
            signature,
            claims: ClaimsValidator::new(clock),
            config: self.config,
        })
    }
}
