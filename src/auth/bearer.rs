//! Authorization header parsing.

use axum::http::header;

/// Extract the token from an `Authorization: Bearer <token>` header.
///
/// A missing header, a non-Bearer scheme, or an empty token all yield
/// `None`; the caller treats that as an anonymous request, not an error.
pub fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}
