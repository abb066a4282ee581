//! Session lifecycle endpoints.
//!
//! - POST `/login` - Verify credentials and mint an access + refresh token pair
//! - POST `/register` - Create an account and mint a token pair
//! - POST `/refresh` - Exchange a refresh token for a new access token
//! - POST `/logout` - Revoke the presented tokens
//! - POST `/logout-all` - Revoke every session for the caller
//! - GET `/me` - Return the caller's principal

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ResultExt};
use crate::auth::{CredentialVerifier, Principal, PrincipalLoader, RequireAuth, bearer_token};
use crate::db::UserStore;
use crate::impl_has_auth_backend;
use crate::jwt::{JwtConfig, TokenType, now_unix};
use crate::rate_limit::{RateLimitConfig, rate_limit_login};
use crate::revocation::RevocationStore;

#[derive(Clone)]
pub struct SessionState {
    pub jwt: Arc<JwtConfig>,
    pub revocations: RevocationStore,
    pub principals: Arc<dyn PrincipalLoader>,
    pub credentials: Arc<dyn CredentialVerifier>,
    pub users: UserStore,
    pub rate_limit: Arc<RateLimitConfig>,
    pub signup_enabled: bool,
}

impl_has_auth_backend!(SessionState);

pub fn router(state: SessionState) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit.clone(),
            rate_limit_login,
        ));

    let mut router = Router::new()
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/logout-all", post(logout_all))
        .route("/me", get(me))
        .with_state(state.clone())
        .merge(login_router);

    if state.signup_enabled {
        router = router.merge(
            Router::new()
                .route("/register", post(register))
                .with_state(state),
        );
    }

    router
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    display_name: Option<String>,
    password: String,
}

#[derive(Deserialize, Default)]
struct LogoutRequest {
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

/// Token pair issued on login and registration.
#[derive(Serialize)]
struct TokenPairResponse {
    access_token: String,
    refresh_token: String,
    token_type: &'static str,
    expires_in: u64,
    refresh_expires_in: u64,
    subject: String,
    display_name: String,
    roles: Vec<String>,
}

#[derive(Serialize)]
struct AccessTokenResponse {
    access_token: String,
    token_type: &'static str,
    expires_in: u64,
}

#[derive(Serialize)]
struct PrincipalResponse {
    subject: String,
    display_name: String,
    roles: Vec<String>,
}

fn issue_pair(jwt: &JwtConfig, principal: &Principal) -> Result<TokenPairResponse, ApiError> {
    let access = jwt
        .issue_access_token(principal)
        .token_err("Failed to issue access token")?;
    let refresh = jwt
        .issue_refresh_token(&principal.subject)
        .token_err("Failed to issue refresh token")?;

    Ok(TokenPairResponse {
        access_token: access.token,
        refresh_token: refresh.token,
        token_type: "Bearer",
        expires_in: access.ttl,
        refresh_expires_in: refresh.ttl,
        subject: principal.subject.clone(),
        display_name: principal.display_name.clone(),
        roles: principal.roles.clone(),
    })
}

/// Verify credentials and mint a token pair.
async fn login(
    State(state): State<SessionState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = state
        .credentials
        .verify_credentials(&payload.username, &payload.password)
        .await
        .store_err("Credential verification failed")?
        .ok_or_else(|| {
            warn!(username = %payload.username, "Login failed");
            ApiError::unauthorized("Invalid username or password")
        })?;

    info!(subject = %principal.subject, "Login successful");
    Ok((StatusCode::OK, Json(issue_pair(&state.jwt, &principal)?)))
}

/// Create an account and mint a token pair.
async fn register(
    State(state): State<SessionState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = payload.username.trim();

    if username.is_empty() {
        return Err(ApiError::bad_request("Username cannot be empty"));
    }
    if username.len() > 32 {
        return Err(ApiError::bad_request(
            "Username cannot be longer than 32 characters",
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ApiError::bad_request(
            "Username can only contain letters, numbers, and underscores",
        ));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::bad_request(
            "Password must be at least 8 characters",
        ));
    }

    let available = state
        .users
        .is_username_available(username)
        .await
        .store_err("Failed to check username availability")?;
    if !available {
        return Err(ApiError::conflict("Username is already taken"));
    }

    let display_name = payload
        .display_name
        .as_deref()
        .unwrap_or(username)
        .trim()
        .to_string();

    state
        .users
        .create(username, &display_name, &payload.password, &["user"])
        .await
        .store_err("Failed to create user")?;

    info!(subject = %username, "User registered");

    let principal = Principal {
        subject: username.to_string(),
        display_name,
        roles: vec!["user".to_string()],
    };
    Ok((StatusCode::CREATED, Json(issue_pair(&state.jwt, &principal)?)))
}

/// Exchange a valid, unexpired, non-revoked refresh token for a new access
/// token. The role set is re-read from the principal loader, so role changes
/// take effect here.
async fn refresh(
    State(state): State<SessionState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = state
        .jwt
        .verify(&payload.refresh_token)
        .map_err(|_| ApiError::unauthorized("Invalid refresh token"))?;

    let now = now_unix().token_err("Clock error")?;
    if claims.is_expired(now) {
        return Err(ApiError::unauthorized("Refresh token has expired"));
    }
    if claims.token_type != TokenType::Refresh {
        return Err(ApiError::unauthorized("Not a refresh token"));
    }
    if state
        .revocations
        .is_revoked(&payload.refresh_token, &claims.sub)
        .await
    {
        return Err(ApiError::unauthorized("Refresh token has been revoked"));
    }

    let principal = state
        .principals
        .load_principal(&claims.sub)
        .await
        .store_err("Principal lookup failed")?
        .ok_or_else(|| ApiError::unauthorized("Unknown subject"))?;

    let access = state
        .jwt
        .issue_access_token(&principal)
        .token_err("Failed to issue access token")?;

    Ok((
        StatusCode::OK,
        Json(AccessTokenResponse {
            access_token: access.token,
            token_type: "Bearer",
            expires_in: access.ttl,
        }),
    ))
}

/// Revoke the presented access token, and the refresh token if one is
/// supplied in the body. Revocation failures on the optional refresh token
/// are logged but do not fail the logout.
async fn logout(
    State(state): State<SessionState>,
    RequireAuth(principal): RequireAuth,
    headers: HeaderMap,
    payload: Option<Json<LogoutRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    // RequireAuth already established that a bearer token is present.
    if let Some(token) = bearer_token(&headers) {
        state
            .revocations
            .revoke(token)
            .await
            .store_err("Failed to revoke access token")?;
    }

    let Json(payload) = payload.unwrap_or_default();
    if let Some(refresh_token) = payload.refresh_token {
        if let Err(e) = state.revocations.revoke(&refresh_token).await {
            warn!(subject = %principal.subject, error = %e, "Could not revoke refresh token on logout");
        }
    }

    info!(subject = %principal.subject, "Logged out");
    Ok((StatusCode::OK, Json(serde_json::json!({ "success": true }))))
}

/// Revoke every session for the caller.
async fn logout_all(
    State(state): State<SessionState>,
    RequireAuth(principal): RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    state
        .revocations
        .revoke_all_for_subject(&principal.subject)
        .await
        .store_err("Failed to revoke sessions")?;

    Ok((StatusCode::OK, Json(serde_json::json!({ "success": true }))))
}

/// Return the caller's principal.
async fn me(RequireAuth(principal): RequireAuth) -> impl IntoResponse {
    Json(PrincipalResponse {
        subject: principal.subject,
        display_name: principal.display_name,
        roles: principal.roles,
    })
}
