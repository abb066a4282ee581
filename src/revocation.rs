//! Token revocation ledger.
//!
//! Revocation is a secondary defense layer behind short access-token TTLs:
//! entries live only as long as the token they revoke, and lookup failures
//! default to allowing the request (fail-open) unless the operator opts into
//! fail-closed.

use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::db::{Database, RevocationEntryStore};
use crate::jwt::{JwtConfig, JwtError, now_unix};

/// Default time budget for a revocation lookup on the request hot path.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_millis(80);

/// Diagnostic value stored for principal-wide markers.
const ALL_SESSIONS: &str = "all";

/// Revocation ledger over the shared entry store.
#[derive(Clone)]
pub struct RevocationStore {
    entries: RevocationEntryStore,
    lookup_timeout: Duration,
    fail_closed: bool,
    max_token_ttl: u64,
}

impl RevocationStore {
    /// Create a store. `max_token_ttl` is the longest lifetime any token can
    /// have (the refresh TTL); principal-wide markers use it as their TTL.
    pub fn new(
        db: &Database,
        max_token_ttl: u64,
        lookup_timeout: Duration,
        fail_closed: bool,
    ) -> Self {
        Self {
            entries: db.revocations(),
            lookup_timeout,
            fail_closed,
            max_token_ttl,
        }
    }

    /// Revoke a single token. The token is parsed without signature
    /// verification so that revocation succeeds even when verification
    /// would be borderline.
    ///
    /// Returns `true` if an entry was written, `false` if the token was
    /// already expired and there was nothing to revoke. Revoking the same
    /// token twice is idempotent.
    pub async fn revoke(&self, token: &str) -> Result<bool, RevocationError> {
        let claims = JwtConfig::peek(token).map_err(RevocationError::Token)?;
        let now = now_unix().map_err(RevocationError::Token)?;

        if claims.is_expired(now) {
            tracing::debug!(subject = %claims.sub, "Token already expired, nothing to revoke");
            return Ok(false);
        }

        self.entries
            .put(&token_key(token), &claims.sub, claims.exp)
            .await
            .map_err(RevocationError::Store)?;

        tracing::info!(subject = %claims.sub, expires_at = claims.exp, "Token revoked");
        Ok(true)
    }

    /// Revoke every token issued for a subject, current and future, until
    /// the maximum token lifetime has elapsed.
    pub async fn revoke_all_for_subject(&self, subject: &str) -> Result<(), RevocationError> {
        let now = now_unix().map_err(RevocationError::Token)?;
        self.entries
            .put(&principal_key(subject), ALL_SESSIONS, now + self.max_token_ttl)
            .await
            .map_err(RevocationError::Store)?;

        tracing::info!(subject = %subject, "All sessions revoked for subject");
        Ok(())
    }

    /// Check whether a token (or its subject as a whole) has been revoked.
    ///
    /// Runs under a short timeout. On store failure or timeout the answer is
    /// decided by policy: fail-open (`false`) by default, fail-closed
    /// (`true`) when configured.
    pub async fn is_revoked(&self, token: &str, subject: &str) -> bool {
        let Ok(now) = now_unix() else {
            return self.fail_closed;
        };

        let lookup = async {
            Ok::<bool, sqlx::Error>(
                self.entries.exists(&token_key(token), now).await?
                    || self.entries.exists(&principal_key(subject), now).await?,
            )
        };

        match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(Ok(revoked)) => revoked,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, fail_closed = self.fail_closed, "Revocation lookup failed");
                self.fail_closed
            }
            Err(_) => {
                tracing::warn!(fail_closed = self.fail_closed, "Revocation lookup timed out");
                self.fail_closed
            }
        }
    }
}

/// Storage key for a single-token entry: a stable hash of the token value.
fn token_key(token: &str) -> String {
    format!("token:{}", hex::encode(Sha256::digest(token.as_bytes())))
}

/// Storage key for a principal-wide marker.
fn principal_key(subject: &str) -> String {
    format!("principal:{}", subject)
}

/// Errors from revocation writes. Lookups never error; they resolve by policy.
#[derive(Debug)]
pub enum RevocationError {
    /// The token could not be parsed at all.
    Token(JwtError),
    /// The underlying store rejected the write.
    Store(sqlx::Error),
}

impl std::fmt::Display for RevocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RevocationError::Token(e) => write!(f, "Cannot parse token: {}", e),
            RevocationError::Store(e) => write!(f, "Revocation store error: {}", e),
        }
    }
}

impl std::error::Error for RevocationError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Principal;

    fn test_jwt() -> JwtConfig {
        JwtConfig::from_secret(
            b"test-secret-key-at-least-32-bytes-long",
            "tokengate-test",
            3600,
            604800,
        )
    }

    fn alice() -> Principal {
        Principal {
            subject: "alice".to_string(),
            display_name: "Alice".to_string(),
            roles: vec!["user".to_string()],
        }
    }

    async fn test_store(db: &Database) -> RevocationStore {
        RevocationStore::new(db, 604800, DEFAULT_LOOKUP_TIMEOUT, false)
    }

    #[tokio::test]
    async fn test_revoke_and_check() {
        let db = Database::open(":memory:").await.unwrap();
        let store = test_store(&db).await;
        let jwt = test_jwt();

        let issued = jwt.issue_access_token(&alice()).unwrap();
        assert!(!store.is_revoked(&issued.token, "alice").await);

        assert!(store.revoke(&issued.token).await.unwrap());
        assert!(store.is_revoked(&issued.token, "alice").await);

        // A different token for the same subject is unaffected.
        let other = jwt.issue_access_token(&alice()).unwrap();
        if other.token != issued.token {
            assert!(!store.is_revoked(&other.token, "alice").await);
        }
    }

    #[tokio::test]
    async fn test_revoke_twice_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        let store = test_store(&db).await;
        let issued = test_jwt().issue_access_token(&alice()).unwrap();

        assert!(store.revoke(&issued.token).await.unwrap());
        assert!(store.revoke(&issued.token).await.unwrap());
        assert!(store.is_revoked(&issued.token, "alice").await);
    }

    #[tokio::test]
    async fn test_entry_ttl_matches_token_expiry() {
        let db = Database::open(":memory:").await.unwrap();
        let store = test_store(&db).await;
        let issued = test_jwt().issue_access_token(&alice()).unwrap();

        store.revoke(&issued.token).await.unwrap();

        let entry = db
            .revocations()
            .get(&token_key(&issued.token))
            .await
            .unwrap()
            .unwrap();
        // The entry expires exactly when the token does, so it never
        // outlives the token it revokes.
        assert_eq!(entry.expires_at as u64, issued.expires_at);
        assert_eq!(entry.subject, "alice");

        // Once the token's expiry passes, the entry is invisible.
        assert!(
            !db.revocations()
                .exists(&token_key(&issued.token), issued.expires_at)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_revoke_expired_token_is_noop() {
        let db = Database::open(":memory:").await.unwrap();
        let store = test_store(&db).await;

        // Zero-TTL tokens are expired at issuance.
        let jwt = JwtConfig::from_secret(
            b"test-secret-key-at-least-32-bytes-long",
            "tokengate-test",
            0,
            604800,
        );
        let issued = jwt.issue_access_token(&alice()).unwrap();

        assert!(!store.revoke(&issued.token).await.unwrap());
        assert!(
            db.revocations()
                .get(&token_key(&issued.token))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_revoke_malformed_token_errors() {
        let db = Database::open(":memory:").await.unwrap();
        let store = test_store(&db).await;
        assert!(store.revoke("not-a-token").await.is_err());
    }

    #[tokio::test]
    async fn test_revoke_all_for_subject() {
        let db = Database::open(":memory:").await.unwrap();
        let store = test_store(&db).await;
        let jwt = test_jwt();

        store.revoke_all_for_subject("bob").await.unwrap();

        // Any token for bob, even freshly issued, is now revoked.
        let bob = Principal {
            subject: "bob".to_string(),
            display_name: "Bob".to_string(),
            roles: vec![],
        };
        let bob_token = jwt.issue_access_token(&bob).unwrap();
        assert!(store.is_revoked(&bob_token.token, "bob").await);

        // Carol's tokens are untouched.
        let carol_token = jwt.issue_refresh_token("carol").unwrap();
        assert!(!store.is_revoked(&carol_token.token, "carol").await);
    }

    #[tokio::test]
    async fn test_lookup_failure_fails_open() {
        let db = Database::open(":memory:").await.unwrap();
        let store = test_store(&db).await;
        let issued = test_jwt().issue_access_token(&alice()).unwrap();

        store.revoke(&issued.token).await.unwrap();
        db.pool().close().await;

        // Store is gone; fail-open policy resolves to "not revoked".
        assert!(!store.is_revoked(&issued.token, "alice").await);
    }

    #[tokio::test]
    async fn test_lookup_failure_fail_closed_policy() {
        let db = Database::open(":memory:").await.unwrap();
        let store = RevocationStore::new(&db, 604800, DEFAULT_LOOKUP_TIMEOUT, true);
        let issued = test_jwt().issue_access_token(&alice()).unwrap();

        db.pool().close().await;
        assert!(store.is_revoked(&issued.token, "alice").await);
    }
}
