//! Processor configuration
//!
//! [`ProcessorSettings`] is the raw, deserialisable form (what a config file or
//! environment layer produces). [`ProcessorConfig`] is the validated, immutable
//! value every other component consumes. Conversion happens once, at startup,
//! and is the only place a [`ConfigurationError`] can arise.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::error::ConfigurationError;

/// Default JWKS connect timeout in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: i64 = 1000;

/// Default JWKS read timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: i64 = 1000;

/// JWS signing algorithms accepted in configuration
///
/// Names are the exact JOSE identifiers and are matched case-sensitively.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// HMAC using SHA-256
    HS256,
    /// HMAC using SHA-384
    HS384,
    /// HMAC using SHA-512
    HS512,
    /// RSASSA-PKCS1-v1_5 using SHA-256
    RS256,
    /// RSASSA-PKCS1-v1_5 using SHA-384
    RS384,
    /// RSASSA-PKCS1-v1_5 using SHA-512
    RS512,
    /// ECDSA using P-256 and SHA-256
    ES256,
    /// ECDSA using P-384 and SHA-384
    ES384,
    /// ECDSA using P-521 and SHA-512
    ES512,
    /// RSASSA-PSS using SHA-256
    PS256,
    /// RSASSA-PSS using SHA-384
    PS384,
    /// RSASSA-PSS using SHA-512
    PS512,
    /// Edwards-curve signatures (Ed25519)
    EdDSA,
}

/// Key type a signing algorithm needs, as named by the JWK `kty` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// `oct` - symmetric secret
    Octet,
    /// `RSA`
    Rsa,
    /// `EC`
    EllipticCurve,
    /// `OKP`
    OctetKeyPair,
}

impl SigningAlgorithm {
    /// Every algorithm, in declaration order
    pub const ALL: [SigningAlgorithm; 13] = [
        SigningAlgorithm::HS256,
        SigningAlgorithm::HS384,
        SigningAlgorithm::HS512,
        SigningAlgorithm::RS256,
        SigningAlgorithm::RS384,
        SigningAlgorithm::RS512,
        SigningAlgorithm::ES256,
        SigningAlgorithm::ES384,
        SigningAlgorithm::ES512,
        SigningAlgorithm::PS256,
        SigningAlgorithm::PS384,
        SigningAlgorithm::PS512,
        SigningAlgorithm::EdDSA,
    ];

    /// The JOSE `alg` identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningAlgorithm::HS256 => "HS256",
            SigningAlgorithm::HS384 => "HS384",
            SigningAlgorithm::HS512 => "HS512",
            SigningAlgorithm::RS256 => "RS256",
            SigningAlgorithm::RS384 => "RS384",
            SigningAlgorithm::RS512 => "RS512",
            SigningAlgorithm::ES256 => "ES256",
            SigningAlgorithm::ES384 => "ES384",
            SigningAlgorithm::ES512 => "ES512",
            SigningAlgorithm::PS256 => "PS256",
            SigningAlgorithm::PS384 => "PS384",
            SigningAlgorithm::PS512 => "PS512",
            SigningAlgorithm::EdDSA => "EdDSA",
        }
    }

    /// The JWK key type able to verify this algorithm
    pub fn key_type(&self) -> KeyType {
        match self {
            SigningAlgorithm::HS256 | SigningAlgorithm::HS384 | SigningAlgorithm::HS512 => {
                KeyType::Octet
            }
            SigningAlgorithm::RS256
            | SigningAlgorithm::RS384
            | SigningAlgorithm::RS512
            | SigningAlgorithm::PS256
            | SigningAlgorithm::PS384
            | SigningAlgorithm::PS512 => KeyType::Rsa,
            SigningAlgorithm::ES256 | SigningAlgorithm::ES384 | SigningAlgorithm::ES512 => {
                KeyType::EllipticCurve
            }
            SigningAlgorithm::EdDSA => KeyType::OctetKeyPair,
        }
    }

    /// Map to the verification backend's algorithm
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnsupportedAlgorithm`] for ES512, which
    /// `jsonwebtoken` cannot verify.
    pub fn to_jwt(&self) -> Result<jsonwebtoken::Algorithm, ConfigurationError> {
        use jsonwebtoken::Algorithm;

        Ok(match self {
            SigningAlgorithm::HS256 => Algorithm::HS256,
            SigningAlgorithm::HS384 => Algorithm::HS384,
            SigningAlgorithm::HS512 => Algorithm::HS512,
            SigningAlgorithm::RS256 => Algorithm::RS256,
            SigningAlgorithm::RS384 => Algorithm::RS384,
            SigningAlgorithm::RS512 => Algorithm::RS512,
            SigningAlgorithm::ES256 => Algorithm::ES256,
            SigningAlgorithm::ES384 => Algorithm::ES384,
            SigningAlgorithm::PS256 => Algorithm::PS256,
            SigningAlgorithm::PS384 => Algorithm::PS384,
            SigningAlgorithm::PS512 => Algorithm::PS512,
            SigningAlgorithm::EdDSA => Algorithm::EdDSA,
            SigningAlgorithm::ES512 => {
                return Err(ConfigurationError::UnsupportedAlgorithm(
                    self.as_str().to_string(),
                ));
            }
        })
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SigningAlgorithm::ALL
            .into_iter()
            .find(|alg| alg.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnknownAlgorithm(s.to_string()))
    }
}

fn default_connect_timeout_ms() -> i64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_read_timeout_ms() -> i64 {
    DEFAULT_READ_TIMEOUT_MS
}

/// Raw processor settings as read from configuration sources
///
/// Timeouts are signed so that a negative value coming from a config file is
/// reported as a [`ConfigurationError`] instead of failing deserialisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorSettings {
    /// JSON Web Key Set URL
    pub jwks_url: String,
    /// Issuer that must appear verbatim in the `iss` claim
    pub issuer: String,
    /// Algorithm tokens must be signed with
    pub algorithm: SigningAlgorithm,
    /// Connect timeout for JWKS requests in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: i64,
    /// Read timeout for JWKS requests in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: i64,
    /// Minimum spacing between forced key set refreshes (0 disables the limit)
    #[serde(default)]
    pub min_refresh_interval_ms: i64,
}

impl ProcessorSettings {
    /// Settings with default timeouts
    pub fn new(
        jwks_url: impl Into<String>,
        issuer: impl Into<String>,
        algorithm: SigningAlgorithm,
    ) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            issuer: issuer.into(),
            algorithm,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            min_refresh_interval_ms: 0,
        }
    }
}

/// Validated, immutable processor configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    jwks_url: Url,
    issuer: String,
    algorithm: SigningAlgorithm,
    connect_timeout: Duration,
    read_timeout: Duration,
    min_refresh_interval: Duration,
}

impl ProcessorConfig {
    /// Start building a configuration
    ///
    /// # Example
    ///
    /// ```rust
    /// use turnstile::{ProcessorConfig, SigningAlgorithm};
    ///
    /// let config = ProcessorConfig::builder(
    ///     "https://accounts.example.com/.well-known/jwks.json",
    ///     "https://accounts.example.com",
    ///     SigningAlgorithm::RS256,
    /// )
    /// .connect_timeout_ms(500)
    /// .build()
    /// .unwrap();
    ///
    /// assert_eq!(config.issuer(), "https://accounts.example.com");
    /// ```
    pub fn builder(
        jwks_url: impl Into<String>,
        issuer: impl Into<String>,
        algorithm: SigningAlgorithm,
    ) -> ProcessorConfigBuilder {
        ProcessorConfigBuilder {
            settings: ProcessorSettings::new(jwks_url, issuer, algorithm),
        }
    }

    /// JWKS endpoint
    pub fn jwks_url(&self) -> &Url {
        &self.jwks_url
    }

    /// Expected `iss` claim
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Expected header `alg`
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Connect timeout for JWKS requests
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Read timeout for JWKS requests
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Minimum spacing between forced key set refreshes
    pub fn min_refresh_interval(&self) -> Duration {
        self.min_refresh_interval
    }
}

impl TryFrom<ProcessorSettings> for ProcessorConfig {
    type Error = ConfigurationError;

    fn try_from(settings: ProcessorSettings) -> Result<Self, Self::Error> {
        let jwks_url = parse_jwks_url(&settings.jwks_url)?;

        if settings.issuer.is_empty() {
            return Err(ConfigurationError::EmptyIssuer);
        }

        // Fail at startup rather than on the first token
        settings.algorithm.to_jwt()?;

        Ok(Self {
            jwks_url,
            issuer: settings.issuer,
            algorithm: settings.algorithm,
            connect_timeout: millis("connect_timeout", settings.connect_timeout_ms)?,
            read_timeout: millis("read_timeout", settings.read_timeout_ms)?,
            min_refresh_interval: millis(
                "min_refresh_interval",
                settings.min_refresh_interval_ms,
            )?,
        })
    }
}

/// Builder for [`ProcessorConfig`]
#[derive(Debug, Clone)]
pub struct ProcessorConfigBuilder {
    settings: ProcessorSettings,
}

impl ProcessorConfigBuilder {
    /// Set the JWKS connect timeout in milliseconds
    #[must_use]
    pub fn connect_timeout_ms(mut self, millis: i64) -> Self {
        self.settings.connect_timeout_ms = millis;
        self
    }

    /// Set the JWKS read timeout in milliseconds
    #[must_use]
    pub fn read_timeout_ms(mut self, millis: i64) -> Self {
        self.settings.read_timeout_ms = millis;
        self
    }

    /// Rate-limit forced key set refreshes
    #[must_use]
    pub fn min_refresh_interval(mut self, interval: Duration) -> Self {
        self.settings.min_refresh_interval_ms =
            i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
        self
    }

    /// Validate and build the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] if the URL is malformed or insecure, the
    /// issuer is empty, a timeout is negative, or the algorithm is unsupported.
    pub fn build(self) -> Result<ProcessorConfig, ConfigurationError> {
        ProcessorConfig::try_from(self.settings)
    }
}

fn millis(name: &'static str, value: i64) -> Result<Duration, ConfigurationError> {
    u64::try_from(value)
        .map(Duration::from_millis)
        .map_err(|_| ConfigurationError::NegativeTimeout { name, value })
}

fn parse_jwks_url(raw: &str) -> Result<Url, ConfigurationError> {
    let url = Url::parse(raw).map_err(|e| ConfigurationError::InvalidJwksUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    let loopback = match url.host() {
        Some(Host::Domain(domain)) => domain == "localhost",
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => {
            return Err(ConfigurationError::InvalidJwksUrl {
                url: raw.to_string(),
                reason: "URL has no host".to_string(),
            });
        }
    };

    match url.scheme() {
        "https" => Ok(url),
        "http" if loopback => Ok(url),
        "http" => Err(ConfigurationError::InsecureJwksUrl(raw.to_string())),
        other => Err(ConfigurationError::InvalidJwksUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}
