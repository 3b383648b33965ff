//! JWKS (JSON Web Key Set) fetching and caching
//!
//! Keys come from a [`KeySource`]; in production that is an
//! [`HttpKeySource`] pointed at the issuer's JWKS endpoint. The [`KeyCache`]
//! sits in front of the source and guarantees:
//!
//! - **Lazy fetch**: nothing is requested until the first token arrives
//! - **Single flight**: concurrent callers that find the cache cold, or that
//!   all ask for a refresh after the same stale snapshot, share one fetch
//! - **Failure isolation**: a failed fetch never replaces a previously good
//!   key set; the next caller simply tries again
//!
//! There is no TTL. Keys are refreshed when a token names a key ID the cached
//! set does not contain, which is how key rotation is picked up.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, KeyAlgorithm, PublicKeyUse};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::{KeyType, ProcessorConfig, SigningAlgorithm};
use crate::error::{ConfigurationError, KeyFetchError};

/// One verification key from a key set
#[derive(Clone)]
pub struct SigningKey {
    kid: Option<String>,
    key_type: KeyType,
    algorithm: Option<String>,
    decoding: DecodingKey,
}

impl SigningKey {
    fn from_jwk(jwk: &Jwk) -> Result<Self, String> {
        if let Some(usage) = &jwk.common.public_key_use
            && !matches!(usage, PublicKeyUse::Signature)
        {
            return Err(format!("key use {usage:?} is not a signature key"));
        }

        let key_type = match &jwk.algorithm {
            AlgorithmParameters::OctetKey(_) => KeyType::Octet,
            AlgorithmParameters::RSA(_) => KeyType::Rsa,
            AlgorithmParameters::EllipticCurve(_) => KeyType::EllipticCurve,
            AlgorithmParameters::OctetKeyPair(_) => KeyType::OctetKeyPair,
        };

        let decoding = DecodingKey::from_jwk(jwk).map_err(|e| e.to_string())?;

        Ok(Self {
            kid: jwk.common.key_id.clone(),
            key_type,
            algorithm: jwk.common.key_algorithm.as_ref().and_then(jose_name),
            decoding,
        })
    }

    /// The `kid` parameter, if the key has one
    pub fn key_id(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// The key's `kty`
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// The `alg` parameter, if the key pins one
    pub fn algorithm(&self) -> Option<&str> {
        self.algorithm.as_deref()
    }

    /// Whether this key may verify `algorithm`
    pub fn supports(&self, algorithm: SigningAlgorithm) -> bool {
        self.key_type == algorithm.key_type()
            && self
                .algorithm
                .as_deref()
                .is_none_or(|pinned| pinned == algorithm.as_str())
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

/// The registered JOSE name of a key's `alg`, as it appears on the wire
fn jose_name(algorithm: &KeyAlgorithm) -> Option<String> {
    match serde_json::to_value(algorithm) {
        Ok(Value::String(name)) => Some(name),
        _ => None,
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("key_type", &self.key_type)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// A non-empty, immutable set of verification keys
#[derive(Debug, Clone)]
pub struct SigningKeySet {
    keys: Vec<SigningKey>,
    fetched_at: DateTime<Utc>,
}

impl SigningKeySet {
    /// Parse a JWKS document
    ///
    /// Keys that cannot be used for signature verification (encryption keys,
    /// unsupported key types, unparsable members) are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`KeyFetchError::Parse`] if the document is not JSON with a
    /// `keys` array, and [`KeyFetchError::Empty`] if no usable key remains.
    pub fn from_slice(document: &[u8]) -> Result<Self, KeyFetchError> {
        let value: Value =
            serde_json::from_slice(document).map_err(|e| KeyFetchError::Parse(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Build a key set from an already-parsed JWKS document
    ///
    /// # Errors
    ///
    /// Same as [`SigningKeySet::from_slice`].
    pub fn from_value(document: &Value) -> Result<Self, KeyFetchError> {
        let members = document
            .get("keys")
            .and_then(Value::as_array)
            .ok_or_else(|| KeyFetchError::Parse("missing \"keys\" array".to_string()))?;

        let mut keys = Vec::with_capacity(members.len());
        for member in members {
            let kid = member.get("kid").and_then(Value::as_str);
            let parsed = serde_json::from_value::<Jwk>(member.clone())
                .map_err(|e| e.to_string())
                .and_then(|jwk| SigningKey::from_jwk(&jwk));
            match parsed {
                Ok(key) => keys.push(key),
                Err(reason) => warn!(kid = ?kid, reason = %reason, "Skipping unusable JWK"),
            }
        }

        if keys.is_empty() {
            return Err(KeyFetchError::Empty);
        }

        Ok(Self {
            keys,
            fetched_at: Utc::now(),
        })
    }

    /// Keys that may verify a token with the given `kid` and algorithm
    ///
    /// With a `kid`, only keys carrying that exact ID qualify. Without one,
    /// every key compatible with the algorithm is a candidate.
    pub fn candidates<'a>(
        &'a self,
        kid: Option<&'a str>,
        algorithm: SigningAlgorithm,
    ) -> impl Iterator<Item = &'a SigningKey> + 'a {
        self.keys.iter().filter(move |key| {
            key.supports(algorithm) && kid.is_none_or(|kid| key.key_id() == Some(kid))
        })
    }

    /// Whether any key carries `kid`
    pub fn contains_key_id(&self, kid: &str) -> bool {
        self.keys.iter().any(|key| key.key_id() == Some(kid))
    }

    /// All keys, in document order
    pub fn keys(&self) -> &[SigningKey] {
        &self.keys
    }

    /// Number of usable keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always `false`; an empty set is never constructed
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// When the set was parsed
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// Where signing keys come from
#[async_trait]
pub trait KeySource: Send + Sync + fmt::Debug {
    /// Fetch the current key set
    async fn fetch(&self) -> Result<SigningKeySet, KeyFetchError>;
}

/// Fetches the key set from a JWKS endpoint over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpKeySource {
    jwks_url: Url,
    http_client: reqwest::Client,
}

impl HttpKeySource {
    /// Create a source using the URL and timeouts in `config`
    ///
    /// A zero timeout means no limit is applied to that phase.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::HttpClient`] if the HTTP client cannot
    /// be initialized.
    pub fn new(config: &ProcessorConfig) -> Result<Self, ConfigurationError> {
        let mut builder = reqwest::Client::builder();
        if !config.connect_timeout().is_zero() {
            builder = builder.connect_timeout(config.connect_timeout());
        }
        if !config.read_timeout().is_zero() {
            builder = builder.read_timeout(config.read_timeout());
        }
        let http_client = builder
            .build()
            .map_err(|e| ConfigurationError::HttpClient(e.to_string()))?;

        Ok(Self {
            jwks_url: config.jwks_url().clone(),
            http_client,
        })
    }

    /// The JWKS endpoint
    pub fn jwks_url(&self) -> &Url {
        &self.jwks_url
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch(&self) -> Result<SigningKeySet, KeyFetchError> {
        info!(jwks_url = %self.jwks_url, "Fetching JWKS from endpoint");

        let response = self
            .http_client
            .get(self.jwks_url.clone())
            .send()
            .await
            .map_err(|e| {
                error!(jwks_url = %self.jwks_url, error = %e, "Failed to fetch JWKS");
                transport_error(&e)
            })?;

        if !response.status().is_success() {
            error!(
                jwks_url = %self.jwks_url,
                status = %response.status(),
                "JWKS endpoint returned error status"
            );
            return Err(KeyFetchError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await.map_err(|e| {
            error!(jwks_url = %self.jwks_url, error = %e, "Failed to read JWKS body");
            transport_error(&e)
        })?;

        let keys = SigningKeySet::from_slice(&body).inspect_err(|e| {
            error!(jwks_url = %self.jwks_url, error = %e, "Failed to parse JWKS");
        })?;

        info!(
            jwks_url = %self.jwks_url,
            key_count = keys.len(),
            "Successfully fetched JWKS"
        );

        Ok(keys)
    }
}

fn transport_error(error: &reqwest::Error) -> KeyFetchError {
    if error.is_timeout() {
        KeyFetchError::Timeout(error.to_string())
    } else {
        KeyFetchError::Transport(error.to_string())
    }
}

/// A key source serving a fixed, pre-provisioned key set
#[derive(Debug, Clone)]
pub struct StaticKeySource {
    keys: SigningKeySet,
}

impl StaticKeySource {
    /// Serve `keys` on every fetch
    pub fn new(keys: SigningKeySet) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    async fn fetch(&self) -> Result<SigningKeySet, KeyFetchError> {
        Ok(self.keys.clone())
    }
}

/// A key set together with the cache revision it was read at
///
/// Pass the snapshot back to [`KeyCache::refresh`] so that callers who saw
/// the same stale set share one refresh.
#[derive(Debug, Clone)]
pub struct KeySnapshot {
    keys: Arc<SigningKeySet>,
    revision: u64,
}

impl KeySnapshot {
    /// The keys
    pub fn keys(&self) -> &SigningKeySet {
        &self.keys
    }

    /// Number of fetch attempts completed before this snapshot was taken
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[derive(Debug, Default)]
struct CacheState {
    keys: Option<Arc<SigningKeySet>>,
    /// Incremented once per completed fetch attempt
    revision: u64,
    /// Outcome of the latest attempt when it failed
    last_failure: Option<KeyFetchError>,
    last_fetch: Option<Instant>,
}

impl CacheState {
    fn snapshot(&self) -> Option<KeySnapshot> {
        self.keys.as_ref().map(|keys| KeySnapshot {
            keys: Arc::clone(keys),
            revision: self.revision,
        })
    }

    fn latest_outcome(&self) -> Result<KeySnapshot, KeyFetchError> {
        if let Some(failure) = &self.last_failure {
            return Err(failure.clone());
        }
        self.snapshot().ok_or(KeyFetchError::Empty)
    }
}

/// Lazily populated, single-flight cache over a [`KeySource`]
pub struct KeyCache {
    source: Arc<dyn KeySource>,
    state: RwLock<CacheState>,
    /// Held for the duration of a fetch
    refresh_lock: tokio::sync::Mutex<()>,
    min_refresh_interval: Duration,
}

impl KeyCache {
    /// Create an empty cache
    pub fn new(source: Arc<dyn KeySource>) -> Self {
        Self {
            source,
            state: RwLock::new(CacheState::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
            min_refresh_interval: Duration::ZERO,
        }
    }

    /// Suppress forced refreshes that follow a fetch more closely than
    /// `interval`; zero disables the limit
    #[must_use]
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Current key set, fetching it if the cache is cold
    ///
    /// # Errors
    ///
    /// Returns the [`KeyFetchError`] of the fetch this call performed or
    /// joined.
    pub async fn current(&self) -> Result<KeySnapshot, KeyFetchError> {
        let observed = {
            let state = self.state.read();
            if let Some(snapshot) = state.snapshot() {
                return Ok(snapshot);
            }
            state.revision
        };

        self.fetch_after(observed).await
    }

    /// Replace the key set that `stale` was taken from
    ///
    /// If another caller already refreshed past `stale`, its result is
    /// returned without a new fetch. When a previous key set exists it is kept
    /// if this refresh fails.
    ///
    /// # Errors
    ///
    /// Returns the [`KeyFetchError`] of the fetch this call performed or
    /// joined.
    pub async fn refresh(&self, stale: &KeySnapshot) -> Result<KeySnapshot, KeyFetchError> {
        if let Some(recent) = self.rate_limited_snapshot() {
            return Ok(recent);
        }

        self.fetch_after(stale.revision).await
    }

    /// Drop the cached key set so the next call fetches again
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.keys = None;
        state.last_failure = None;
        state.revision += 1;
        debug!("Key cache cleared");
    }

    /// Whether a key set is cached
    pub fn is_populated(&self) -> bool {
        self.state.read().keys.is_some()
    }

    fn rate_limited_snapshot(&self) -> Option<KeySnapshot> {
        if self.min_refresh_interval.is_zero() {
            return None;
        }

        let state = self.state.read();
        let since_last = state.last_fetch?.elapsed();
        if since_last >= self.min_refresh_interval {
            return None;
        }

        let snapshot = state.snapshot()?;
        warn!(
            since_last_ms = since_last.as_millis(),
            "JWKS refresh rate limited, using cache"
        );
        Some(snapshot)
    }

    /// Fetch unless a fetch completed after `observed`
    async fn fetch_after(&self, observed: u64) -> Result<KeySnapshot, KeyFetchError> {
        let _in_flight = self.refresh_lock.lock().await;

        {
            let state = self.state.read();
            if state.revision != observed {
                debug!(revision = state.revision, "Joined completed JWKS fetch");
                return state.latest_outcome();
            }
        }

        let fetched = self.source.fetch().await;

        let mut state = self.state.write();
        state.revision += 1;
        state.last_fetch = Some(Instant::now());
        match fetched {
            Ok(keys) => {
                debug!(
                    revision = state.revision,
                    key_count = keys.len(),
                    "JWKS cache updated"
                );
                state.keys = Some(Arc::new(keys));
                state.last_failure = None;
                state.latest_outcome()
            }
            Err(e) => {
                warn!(
                    revision = state.revision,
                    error = %e,
                    category = e.category(),
                    "JWKS fetch failed, keeping previous key set"
                );
                state.last_failure = Some(e.clone());
                Err(e)
            }
        }
    }
}

impl fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("KeyCache")
            .field("source", &self.source)
            .field("populated", &state.keys.is_some())
            .field("revision", &state.revision)
            .field("min_refresh_interval", &self.min_refresh_interval)
            .finish()
    }
}
