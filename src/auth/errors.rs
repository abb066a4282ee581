//! Authorization rejection types for the extractors.
//!
//! These are produced by [`RequireAuth`](super::RequireAuth) and
//! [`AdminOnly`](super::AdminOnly), never by the pipeline itself: the
//! pipeline only establishes (or declines to establish) an identity.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Rejection for endpoints that require an authenticated or privileged
/// caller.
#[derive(Debug)]
pub enum AuthError {
    /// No identity was established for the request.
    NotAuthenticated,
    /// An identity exists but lacks the required role.
    InsufficientRole,
}

impl AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientRole => StatusCode::FORBIDDEN,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            AuthError::NotAuthenticated => "Not authenticated",
            AuthError::InsufficientRole => "Insufficient permissions",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        use axum::Json;
        use serde::Serialize;

        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response()
    }
}
