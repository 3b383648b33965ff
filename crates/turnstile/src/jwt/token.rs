//! Structural parsing of compact JWS tokens
//!
//! Parsing only establishes that a token *looks* like a JWT: three non-empty
//! base64url segments, a JSON object header carrying a string `alg`, and a
//! JSON object payload. Nothing here is trusted until the signature verifies.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::SignatureError;

/// The protected header fields the verifier looks at
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Declared signing algorithm, compared verbatim
    pub alg: String,
    /// Key ID selecting the verification key
    #[serde(default)]
    pub kid: Option<String>,
    /// Media type, informational only
    #[serde(default)]
    pub typ: Option<String>,
}

/// A structurally valid compact token
///
/// Borrowed from the caller's string and never modified.
#[derive(Debug, Clone)]
pub struct RawToken<'a> {
    compact: &'a str,
    header: TokenHeader,
}

impl<'a> RawToken<'a> {
    /// Parse the compact serialization
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::Malformed`] when the token does not have
    /// exactly three non-empty base64url segments, or its header or payload
    /// is not a JSON object.
    pub fn parse(compact: &'a str) -> Result<Self, SignatureError> {
        let mut segments = compact.split('.');
        let (Some(header), Some(payload), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(SignatureError::Malformed(
                "expected three dot-separated segments".to_string(),
            ));
        };

        let header_bytes = decode_segment("header", header)?;
        let payload_bytes = decode_segment("payload", payload)?;
        decode_segment("signature", signature)?;

        let header: TokenHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| SignatureError::Malformed(format!("invalid header: {e}")))?;

        serde_json::from_slice::<Map<String, Value>>(&payload_bytes)
            .map_err(|e| SignatureError::Malformed(format!("invalid payload: {e}")))?;

        Ok(Self { compact, header })
    }

    /// The parsed header
    pub fn header(&self) -> &TokenHeader {
        &self.header
    }

    /// Key ID from the header, if any
    pub fn key_id(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }

    /// The original compact string
    pub fn as_str(&self) -> &'a str {
        self.compact
    }
}

fn decode_segment(name: &str, segment: &str) -> Result<Vec<u8>, SignatureError> {
    if segment.is_empty() {
        return Err(SignatureError::Malformed(format!("empty {name} segment")));
    }
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| SignatureError::Malformed(format!("{name} is not base64url: {e}")))
}
