//! Claim validation and the read-only claims view
//!
//! [`ClaimsValidator`] enforces the time window (`exp`, `nbf`) and the
//! issuer. Audience, subject and any custom claims are exposed through
//! [`ClaimsView`] for callers to check themselves.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use url::Url;

use crate::clock::Clock;
use crate::config::ProcessorConfig;
use crate::error::{ClaimAccessError, ClaimsError};

/// Registered claim names
pub mod names {
    /// Issuer
    pub const ISSUER: &str = "iss";
    /// Subject
    pub const SUBJECT: &str = "sub";
    /// Audience
    pub const AUDIENCE: &str = "aud";
    /// Expiration time
    pub const EXPIRATION: &str = "exp";
    /// Not before
    pub const NOT_BEFORE: &str = "nbf";
    /// Issued at
    pub const ISSUED_AT: &str = "iat";
    /// JWT ID
    pub const JWT_ID: &str = "jti";
}

/// Claims of a token whose signature has verified but whose time window and
/// issuer have not been checked yet
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedClaims(Map<String, Value>);

impl ParsedClaims {
    /// Wrap a verified payload
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// Raw claim value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Unwrap the payload
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Checks `exp`, `nbf` and `iss` against a clock and the configured issuer
#[derive(Debug, Clone)]
pub struct ClaimsValidator {
    clock: Arc<dyn Clock>,
}

impl ClaimsValidator {
    /// Create a validator reading time from `clock`
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Validate `claims` and produce the read-only view
    ///
    /// A token is expired once the current instant reaches `exp`, and not yet
    /// valid while the current instant is before `nbf`. No clock skew is
    /// tolerated. `exp` is mandatory; `nbf` is checked only when present.
    /// `iss` must equal the configured issuer byte for byte.
    ///
    /// # Errors
    ///
    /// Returns the first [`ClaimsError`] in the order expiry, not-before,
    /// issuer. A registered claim with the wrong JSON type is reported as
    /// [`ClaimsError::InvalidClaim`].
    pub fn validate(
        &self,
        claims: ParsedClaims,
        config: &ProcessorConfig,
    ) -> Result<ClaimsView, ClaimsError> {
        let claims = claims.into_inner();

        let expires_at = registered_date(&claims, names::EXPIRATION)?
            .ok_or(ClaimsError::MissingClaim(names::EXPIRATION))?;
        let not_before = registered_date(&claims, names::NOT_BEFORE)?;
        let issued_at = registered_date(&claims, names::ISSUED_AT)?;
        let issuer = registered_string(&claims, names::ISSUER)?
            .ok_or(ClaimsError::MissingClaim(names::ISSUER))?;
        let subject = registered_string(&claims, names::SUBJECT)?;
        let jwt_id = registered_string(&claims, names::JWT_ID)?;
        let audience = audience(&claims)?;

        let now = self.clock.now();
        if now >= expires_at {
            return Err(ClaimsError::Expired {
                expired_at: expires_at.timestamp(),
            });
        }
        if let Some(not_before) = not_before
            && now < not_before
        {
            return Err(ClaimsError::NotYetValid {
                not_before: not_before.timestamp(),
            });
        }
        if issuer != config.issuer() {
            return Err(ClaimsError::IssuerMismatch { found: issuer });
        }

        Ok(ClaimsView {
            claims: Arc::new(claims),
            issuer,
            subject,
            audience,
            expires_at,
            not_before,
            issued_at,
            jwt_id,
        })
    }
}

fn registered_date(
    claims: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<DateTime<Utc>>, ClaimsError> {
    match claims.get(name) {
        None => Ok(None),
        Some(value) => numeric_date(value)
            .map(Some)
            .ok_or(ClaimsError::InvalidClaim(name)),
    }
}

fn registered_string(
    claims: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<String>, ClaimsError> {
    match claims.get(name) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(ClaimsError::InvalidClaim(name)),
    }
}

/// `aud` may be a single string or an array of strings
fn audience(claims: &Map<String, Value>) -> Result<Vec<String>, ClaimsError> {
    match claims.get(names::AUDIENCE) {
        None => Ok(Vec::new()),
        Some(Value::String(single)) => Ok(vec![single.clone()]),
        Some(Value::Array(values)) => values
            .iter()
            .map(|value| value.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or(ClaimsError::InvalidClaim(names::AUDIENCE)),
        Some(_) => Err(ClaimsError::InvalidClaim(names::AUDIENCE)),
    }
}

/// Seconds since the epoch, fractional part honoured
fn numeric_date(value: &Value) -> Option<DateTime<Utc>> {
    let Value::Number(number) = value else {
        return None;
    };
    if let Some(secs) = number.as_i64() {
        return DateTime::from_timestamp(secs, 0);
    }
    let secs = number.as_f64()?;
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

/// Read-only view of a verified token's claims
///
/// Cheap to clone; the claim map is shared.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimsView {
    claims: Arc<Map<String, Value>>,
    issuer: String,
    subject: Option<String>,
    audience: Vec<String>,
    expires_at: DateTime<Utc>,
    not_before: Option<DateTime<Utc>>,
    issued_at: Option<DateTime<Utc>>,
    jwt_id: Option<String>,
}

impl ClaimsView {
    /// `iss`
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// `sub`
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// `aud`, normalized to a list; empty when absent
    pub fn audience(&self) -> &[String] {
        &self.audience
    }

    /// `exp`
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// `nbf`
    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.not_before
    }

    /// `iat`
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    /// `jti`
    pub fn jwt_id(&self) -> Option<&str> {
        self.jwt_id.as_deref()
    }

    /// Raw value of any claim
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// Whether the claim is present
    pub fn contains(&self, name: &str) -> bool {
        self.claims.contains_key(name)
    }

    /// All claims
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// String claim
    ///
    /// # Errors
    ///
    /// Returns [`ClaimAccessError::WrongType`] if the claim is present but
    /// not a string. The same applies to every typed getter below.
    pub fn string_claim(&self, name: &str) -> Result<Option<&str>, ClaimAccessError> {
        self.typed(name, "string", Value::as_str)
    }

    /// Array-of-strings claim
    ///
    /// # Errors
    ///
    /// See [`ClaimsView::string_claim`].
    pub fn string_list_claim(&self, name: &str) -> Result<Option<Vec<&str>>, ClaimAccessError> {
        self.typed(name, "string array", |value| {
            value
                .as_array()?
                .iter()
                .map(Value::as_str)
                .collect::<Option<Vec<_>>>()
        })
    }

    /// Boolean claim
    ///
    /// # Errors
    ///
    /// See [`ClaimsView::string_claim`].
    pub fn bool_claim(&self, name: &str) -> Result<Option<bool>, ClaimAccessError> {
        self.typed(name, "boolean", Value::as_bool)
    }

    /// Integer claim
    ///
    /// # Errors
    ///
    /// See [`ClaimsView::string_claim`].
    pub fn integer_claim(&self, name: &str) -> Result<Option<i64>, ClaimAccessError> {
        self.typed(name, "integer", Value::as_i64)
    }

    /// Numeric claim as a float
    ///
    /// # Errors
    ///
    /// See [`ClaimsView::string_claim`].
    pub fn float_claim(&self, name: &str) -> Result<Option<f64>, ClaimAccessError> {
        self.typed(name, "number", Value::as_f64)
    }

    /// NumericDate claim
    ///
    /// # Errors
    ///
    /// See [`ClaimsView::string_claim`].
    pub fn timestamp_claim(&self, name: &str) -> Result<Option<DateTime<Utc>>, ClaimAccessError> {
        self.typed(name, "NumericDate", numeric_date)
    }

    /// String claim parsed as an absolute URI
    ///
    /// # Errors
    ///
    /// See [`ClaimsView::string_claim`].
    pub fn uri_claim(&self, name: &str) -> Result<Option<Url>, ClaimAccessError> {
        self.typed(name, "URI", |value| Url::parse(value.as_str()?).ok())
    }

    /// Deserialize the whole claim set into `T`
    ///
    /// # Errors
    ///
    /// Returns [`ClaimAccessError::Bind`] if the claims do not fit `T`.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, ClaimAccessError> {
        serde_json::from_value(Value::Object(self.claims.as_ref().clone()))
            .map_err(|e| ClaimAccessError::Bind(e.to_string()))
    }

    fn typed<'a, T>(
        &'a self,
        name: &str,
        expected: &'static str,
        convert: impl FnOnce(&'a Value) -> Option<T>,
    ) -> Result<Option<T>, ClaimAccessError> {
        match self.claims.get(name) {
            None => Ok(None),
            Some(value) => convert(value)
                .map(Some)
                .ok_or_else(|| ClaimAccessError::WrongType {
                    name: name.to_string(),
                    expected,
                }),
        }
    }
}
