//! Bearer token extraction from the `Authorization` header

use http::HeaderMap;
use http::header::AUTHORIZATION;

/// Authentication scheme accepted in the `Authorization` header
pub const BEARER_SCHEME: &str = "Bearer";

/// Extract the token from an `Authorization` header value
///
/// The value must be exactly `Bearer <token>`: the scheme is matched
/// case-sensitively, separated by a single space, and the token must be
/// non-empty and contain no further spaces. Anything else yields `None`.
///
/// # Example
///
/// ```rust
/// use turnstile::extract_bearer_token;
///
/// assert_eq!(extract_bearer_token(Some("Bearer abc.def.ghi")), Some("abc.def.ghi"));
/// assert_eq!(extract_bearer_token(Some("Basic dXNlcjpwYXNz")), None);
/// assert_eq!(extract_bearer_token(None), None);
/// ```
pub fn extract_bearer_token(authorization: Option<&str>) -> Option<&str> {
    let mut parts = authorization?.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(BEARER_SCHEME), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

/// Extract the bearer token from request headers
///
/// Header values that are not visible ASCII are treated as absent.
pub fn bearer_token_from_headers(headers: &HeaderMap) -> Option<&str> {
    extract_bearer_token(authorization_header(headers))
}

pub(crate) fn authorization_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}
