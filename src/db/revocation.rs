//! Revocation entry storage.
//!
//! Entries are write-once/read-many: a key is inserted with an absolute
//! expiry and never updated, so concurrent writers need no coordination.
//! Expired rows are invisible to lookups and reclaimed by the cleanup
//! scheduler.

use sqlx::sqlite::SqlitePool;

/// A stored revocation entry.
#[derive(Debug, Clone)]
pub struct RevocationEntry {
    pub key: String,
    pub subject: String,
    pub expires_at: i64,
}

/// Store for revocation entries.
#[derive(Clone)]
pub struct RevocationEntryStore {
    pool: SqlitePool,
}

impl RevocationEntryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an entry expiring at the given Unix timestamp.
    ///
    /// Re-inserting an existing key is a no-op, which makes revoking the
    /// same token twice idempotent. An expiry beyond the i64 range (claims
    /// come from unverified token payloads) is clamped rather than
    /// truncated, so the entry cannot wrap into the past.
    pub async fn put(&self, key: &str, subject: &str, expires_at: u64) -> Result<(), sqlx::Error> {
        let expires_at = i64::try_from(expires_at).unwrap_or(i64::MAX);
        sqlx::query("INSERT OR IGNORE INTO revocations (key, subject, expires_at) VALUES (?, ?, ?)")
            .bind(key)
            .bind(subject)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Check whether an unexpired entry exists for the key.
    pub async fn exists(&self, key: &str, now: u64) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM revocations WHERE key = ? AND expires_at > ?")
                .bind(key)
                .bind(now as i64)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Fetch an entry regardless of expiry (used by tests to inspect TTLs).
    pub async fn get(&self, key: &str) -> Result<Option<RevocationEntry>, sqlx::Error> {
        let row: Option<(String, String, i64)> =
            sqlx::query_as("SELECT key, subject, expires_at FROM revocations WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(key, subject, expires_at)| RevocationEntry {
            key,
            subject,
            expires_at,
        }))
    }

    /// Delete all entries whose expiry has passed. Returns the number removed.
    pub async fn delete_expired(&self, now: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM revocations WHERE expires_at <= ?")
            .bind(now as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn test_put_and_exists() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.revocations();

        assert!(!store.exists("token:abc", 100).await.unwrap());

        store.put("token:abc", "alice", 200).await.unwrap();
        assert!(store.exists("token:abc", 100).await.unwrap());

        // Invisible once the expiry passes.
        assert!(!store.exists("token:abc", 200).await.unwrap());
        assert!(!store.exists("token:abc", 300).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_is_write_once() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.revocations();

        store.put("token:abc", "alice", 200).await.unwrap();
        // A second insert with a different expiry must not extend the entry.
        store.put("token:abc", "alice", 9999).await.unwrap();

        let entry = store.get("token:abc").await.unwrap().unwrap();
        assert_eq!(entry.expires_at, 200);
        assert_eq!(entry.subject, "alice");
    }

    #[tokio::test]
    async fn test_put_clamps_oversized_expiry() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.revocations();

        // An expiry past the i64 range must clamp, not wrap negative and
        // make the entry invisible.
        store.put("token:far", "alice", u64::MAX).await.unwrap();

        assert!(store.exists("token:far", 1_000_000).await.unwrap());
        let entry = store.get("token:far").await.unwrap().unwrap();
        assert_eq!(entry.expires_at, i64::MAX);
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.revocations();

        store.put("token:old", "alice", 100).await.unwrap();
        store.put("token:new", "alice", 500).await.unwrap();

        let removed = store.delete_expired(200).await.unwrap();
        assert_eq!(removed, 1);

        assert!(store.get("token:old").await.unwrap().is_none());
        assert!(store.get("token:new").await.unwrap().is_some());
    }
}
