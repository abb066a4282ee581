//! Scheduled cleanup of expired revocation entries.
//!
//! Entries stop matching lookups the moment they expire; this sweep only
//! reclaims the storage, so the table stays bounded by currently valid
//! revocations.

use crate::db::Database;
use crate::jwt::now_unix;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database) {
    let now = match now_unix() {
        Ok(now) => now,
        Err(e) => {
            error!("Skipping cleanup, clock error: {}", e);
            return;
        }
    };

    match db.revocations().delete_expired(now).await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired revocation entries", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up revocation entries: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db).await;
        }
    })
}
