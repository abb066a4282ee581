//! The per-request authentication pipeline and its axum extractors.
//!
//! The pipeline runs a fixed sequence of checks (extract bearer token,
//! verify signature, check expiry, check token type, check revocation, load
//! principal) and every failure degrades to [`Identity::Anonymous`]. The
//! request always continues; producing a 401/403 is the job of the
//! [`RequireAuth`] / [`AdminOnly`] extractors at the endpoints that need it.
//!
//! The computed identity is cached in the request extensions, so the
//! expensive path (verification plus one revocation-store round-trip) runs
//! exactly once per physical request no matter how many extractors ask.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::bearer::bearer_token;
use super::errors::AuthError;
use super::principal::Principal;
use super::state::HasAuthBackend;
use crate::jwt::{TokenType, now_unix};

/// Role granting access to the admin endpoints.
pub const ADMIN_ROLE: &str = "admin";

/// The outcome of the authentication pipeline for one request.
#[derive(Debug, Clone)]
pub enum Identity {
    /// No identity established; the request proceeds without one.
    Anonymous,
    /// A verified, non-revoked token resolved to this principal.
    Authenticated(Principal),
}

impl Identity {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(p) => Some(p),
        }
    }
}

/// Run the pipeline once for this request, reusing a previously computed
/// identity if one is already attached to the request.
pub async fn authenticate_request<S>(parts: &mut Parts, state: &S) -> Identity
where
    S: HasAuthBackend + Send + Sync,
{
    if let Some(identity) = parts.extensions.get::<Identity>() {
        return identity.clone();
    }

    let identity = run_pipeline(parts, state).await;
    parts.extensions.insert(identity.clone());
    identity
}

async fn run_pipeline<S>(parts: &Parts, state: &S) -> Identity
where
    S: HasAuthBackend + Send + Sync,
{
    let Some(token) = bearer_token(&parts.headers) else {
        return Identity::Anonymous;
    };

    let claims = match state.jwt().verify(token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, "Rejecting token that failed verification");
            return Identity::Anonymous;
        }
    };

    let Ok(now) = now_unix() else {
        return Identity::Anonymous;
    };
    if claims.is_expired(now) {
        tracing::debug!(subject = %claims.sub, "Rejecting expired token");
        return Identity::Anonymous;
    }

    if claims.token_type != TokenType::Access {
        tracing::warn!(subject = %claims.sub, "Refresh token presented as access credential");
        return Identity::Anonymous;
    }

    // Revoked tokens are indistinguishable from invalid ones to the caller.
    if state.revocations().is_revoked(token, &claims.sub).await {
        tracing::debug!(subject = %claims.sub, "Rejecting revoked token");
        return Identity::Anonymous;
    }

    match state.principals().load_principal(&claims.sub).await {
        Ok(Some(principal)) => Identity::Authenticated(principal),
        Ok(None) => {
            tracing::debug!(subject = %claims.sub, "Token subject not found");
            Identity::Anonymous
        }
        Err(e) => {
            tracing::warn!(subject = %claims.sub, error = %e, "Principal lookup failed");
            Identity::Anonymous
        }
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(authenticate_request(parts, state).await)
    }
}

/// Extractor for endpoints that require an authenticated caller.
/// Rejects anonymous requests with 401.
pub struct RequireAuth(pub Principal);

impl<S> FromRequestParts<S> for RequireAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match authenticate_request(parts, state).await {
            Identity::Authenticated(principal) => Ok(RequireAuth(principal)),
            Identity::Anonymous => Err(AuthError::NotAuthenticated),
        }
    }
}

/// Extractor for endpoints restricted to the admin role.
pub struct AdminOnly(pub Principal);

impl<S> FromRequestParts<S> for AdminOnly
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireAuth(principal) = RequireAuth::from_request_parts(parts, state).await?;
        if principal.has_role(ADMIN_ROLE) {
            Ok(AdminOnly(principal))
        } else {
            Err(AuthError::InsufficientRole)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{DirectoryError, PrincipalLoader};
    use crate::db::Database;
    use crate::impl_has_auth_backend;
    use crate::jwt::JwtConfig;
    use crate::revocation::{DEFAULT_LOOKUP_TIMEOUT, RevocationStore};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Loader that knows "alice" and "bob" and counts how often it is asked.
    struct CountingLoader {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PrincipalLoader for CountingLoader {
        async fn load_principal(&self, subject: &str) -> Result<Option<Principal>, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match subject {
                "alice" => Ok(Some(Principal {
                    subject: "alice".to_string(),
                    display_name: "Alice".to_string(),
                    roles: vec!["user".to_string()],
                })),
                "bob" => Ok(Some(Principal {
                    subject: "bob".to_string(),
                    display_name: "Bob".to_string(),
                    roles: vec![],
                })),
                _ => Ok(None),
            }
        }
    }

    struct FailingLoader;

    #[async_trait]
    impl PrincipalLoader for FailingLoader {
        async fn load_principal(&self, _: &str) -> Result<Option<Principal>, DirectoryError> {
            Err(DirectoryError::new("directory offline"))
        }
    }

    #[derive(Clone)]
    struct TestState {
        jwt: Arc<JwtConfig>,
        revocations: RevocationStore,
        principals: Arc<dyn PrincipalLoader>,
        loader_calls: Arc<CountingLoader>,
    }

    impl_has_auth_backend!(TestState);

    async fn test_state() -> TestState {
        test_state_with_ttl(3600).await
    }

    async fn test_state_with_ttl(access_ttl: u64) -> TestState {
        let db = Database::open(":memory:").await.unwrap();
        let jwt = Arc::new(JwtConfig::from_secret(
            b"test-secret-key-at-least-32-bytes-long",
            "tokengate-test",
            access_ttl,
            604800,
        ));
        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
        });
        TestState {
            jwt,
            revocations: RevocationStore::new(&db, 604800, DEFAULT_LOOKUP_TIMEOUT, false),
            principals: loader.clone(),
            loader_calls: loader,
        }
    }

    fn parts_with_bearer(token: Option<&str>) -> Parts {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn alice() -> Principal {
        Principal {
            subject: "alice".to_string(),
            display_name: "Alice".to_string(),
            roles: vec!["user".to_string()],
        }
    }

    #[tokio::test]
    async fn test_no_header_is_anonymous() {
        let state = test_state().await;
        let mut parts = parts_with_bearer(None);
        let identity = authenticate_request(&mut parts, &state).await;
        assert!(identity.principal().is_none());
    }

    #[tokio::test]
    async fn test_garbage_token_is_anonymous() {
        let state = test_state().await;
        let mut parts = parts_with_bearer(Some("definitely-not-a-jwt"));
        assert!(matches!(
            authenticate_request(&mut parts, &state).await,
            Identity::Anonymous
        ));
    }

    #[tokio::test]
    async fn test_valid_token_authenticates() {
        let state = test_state().await;
        let issued = state.jwt.issue_access_token(&alice()).unwrap();
        let mut parts = parts_with_bearer(Some(&issued.token));

        let identity = authenticate_request(&mut parts, &state).await;
        let principal = identity.principal().expect("expected authenticated identity");
        assert_eq!(principal.subject, "alice");
        assert_eq!(principal.roles, vec!["user".to_string()]);
    }

    #[tokio::test]
    async fn test_refresh_token_is_anonymous() {
        let state = test_state().await;
        let issued = state.jwt.issue_refresh_token("alice").unwrap();
        let mut parts = parts_with_bearer(Some(&issued.token));

        assert!(matches!(
            authenticate_request(&mut parts, &state).await,
            Identity::Anonymous
        ));
    }

    #[tokio::test]
    async fn test_expired_token_is_anonymous() {
        // Zero-TTL access tokens are expired at issuance.
        let state = test_state_with_ttl(0).await;
        let issued = state.jwt.issue_access_token(&alice()).unwrap();
        let mut parts = parts_with_bearer(Some(&issued.token));

        assert!(matches!(
            authenticate_request(&mut parts, &state).await,
            Identity::Anonymous
        ));
    }

    #[tokio::test]
    async fn test_revoked_token_is_anonymous() {
        let state = test_state().await;
        let issued = state.jwt.issue_access_token(&alice()).unwrap();

        state.revocations.revoke(&issued.token).await.unwrap();

        let mut parts = parts_with_bearer(Some(&issued.token));
        assert!(matches!(
            authenticate_request(&mut parts, &state).await,
            Identity::Anonymous
        ));
    }

    #[tokio::test]
    async fn test_revocation_outage_fails_open() {
        let db = Database::open(":memory:").await.unwrap();
        let jwt = Arc::new(JwtConfig::from_secret(
            b"test-secret-key-at-least-32-bytes-long",
            "tokengate-test",
            3600,
            604800,
        ));
        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
        });
        let state = TestState {
            jwt: jwt.clone(),
            revocations: RevocationStore::new(&db, 604800, DEFAULT_LOOKUP_TIMEOUT, false),
            principals: loader.clone(),
            loader_calls: loader,
        };

        let issued = jwt.issue_access_token(&alice()).unwrap();

        // Take the revocation store down; under the fail-open policy an
        // otherwise valid token still authenticates.
        db.pool().close().await;

        let mut parts = parts_with_bearer(Some(&issued.token));
        let identity = authenticate_request(&mut parts, &state).await;
        assert_eq!(
            identity.principal().map(|p| p.subject.as_str()),
            Some("alice")
        );
    }

    #[tokio::test]
    async fn test_principal_wide_revocation() {
        let state = test_state().await;
        state.revocations.revoke_all_for_subject("bob").await.unwrap();

        // Bob's freshly issued token no longer authenticates.
        let bob = Principal {
            subject: "bob".to_string(),
            display_name: "Bob".to_string(),
            roles: vec![],
        };
        let bob_token = state.jwt.issue_access_token(&bob).unwrap();
        let mut parts = parts_with_bearer(Some(&bob_token.token));
        assert!(matches!(
            authenticate_request(&mut parts, &state).await,
            Identity::Anonymous
        ));

        // Alice is unaffected.
        let alice_token = state.jwt.issue_access_token(&alice()).unwrap();
        let mut parts = parts_with_bearer(Some(&alice_token.token));
        assert!(matches!(
            authenticate_request(&mut parts, &state).await,
            Identity::Authenticated(_)
        ));
    }

    #[tokio::test]
    async fn test_unknown_subject_is_anonymous() {
        let state = test_state().await;
        let ghost = Principal {
            subject: "ghost".to_string(),
            display_name: "Ghost".to_string(),
            roles: vec![],
        };
        let issued = state.jwt.issue_access_token(&ghost).unwrap();
        let mut parts = parts_with_bearer(Some(&issued.token));

        assert!(matches!(
            authenticate_request(&mut parts, &state).await,
            Identity::Anonymous
        ));
    }

    #[tokio::test]
    async fn test_loader_failure_is_anonymous() {
        let db = Database::open(":memory:").await.unwrap();
        let jwt = Arc::new(JwtConfig::from_secret(
            b"test-secret-key-at-least-32-bytes-long",
            "tokengate-test",
            3600,
            604800,
        ));

        #[derive(Clone)]
        struct FailingState {
            jwt: Arc<JwtConfig>,
            revocations: RevocationStore,
            principals: Arc<dyn PrincipalLoader>,
        }
        impl_has_auth_backend!(FailingState);

        let state = FailingState {
            jwt: jwt.clone(),
            revocations: RevocationStore::new(&db, 604800, DEFAULT_LOOKUP_TIMEOUT, false),
            principals: Arc::new(FailingLoader),
        };

        let issued = jwt.issue_access_token(&alice()).unwrap();
        let mut parts = parts_with_bearer(Some(&issued.token));
        assert!(matches!(
            authenticate_request(&mut parts, &state).await,
            Identity::Anonymous
        ));
    }

    #[tokio::test]
    async fn test_pipeline_runs_once_per_request() {
        let state = test_state().await;
        let issued = state.jwt.issue_access_token(&alice()).unwrap();
        let mut parts = parts_with_bearer(Some(&issued.token));

        let first = authenticate_request(&mut parts, &state).await;
        let second = authenticate_request(&mut parts, &state).await;

        assert!(matches!(first, Identity::Authenticated(_)));
        assert!(matches!(second, Identity::Authenticated(_)));
        // The loader was consulted exactly once; the second pass reused the
        // cached identity.
        assert_eq!(state.loader_calls.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_admin_only_requires_role() {
        let state = test_state().await;

        // Alice holds "user" only.
        let issued = state.jwt.issue_access_token(&alice()).unwrap();
        let mut parts = parts_with_bearer(Some(&issued.token));
        let result = AdminOnly::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::InsufficientRole)));

        // Anonymous requests fail earlier.
        let mut parts = parts_with_bearer(None);
        let result = AdminOnly::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::NotAuthenticated)));
    }
}
