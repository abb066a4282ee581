//! Administrative endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ResultExt};
use crate::auth::{AdminOnly, PrincipalLoader};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::revocation::RevocationStore;

#[derive(Clone)]
pub struct AdminState {
    pub jwt: Arc<JwtConfig>,
    pub revocations: RevocationStore,
    pub principals: Arc<dyn PrincipalLoader>,
}

impl_has_auth_backend!(AdminState);

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/revoke/{subject}", post(revoke_subject))
        .with_state(state)
}

/// Revoke every token for a subject. The marker blocks the subject's tokens
/// until it expires, which takes the longest lifetime any token can have.
async fn revoke_subject(
    State(state): State<AdminState>,
    AdminOnly(admin): AdminOnly,
    Path(subject): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .revocations
        .revoke_all_for_subject(&subject)
        .await
        .store_err("Failed to revoke subject")?;

    info!(admin = %admin.subject, subject = %subject, "Subject revoked by administrator");
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "revoked": subject })),
    ))
}
