mod admin;
mod error;
mod session;

use axum::Router;
use std::sync::Arc;

use crate::db::{Database, UserDirectory};
use crate::jwt::JwtConfig;
use crate::rate_limit::RateLimitConfig;
use crate::revocation::RevocationStore;

pub use session::SessionState;

/// Create the API router.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    revocations: RevocationStore,
    rate_limit: Arc<RateLimitConfig>,
    no_signup: bool,
) -> Router {
    let directory = Arc::new(UserDirectory::new(db.users()));

    let session_state = session::SessionState {
        jwt: jwt.clone(),
        revocations: revocations.clone(),
        principals: directory.clone(),
        credentials: directory.clone(),
        users: db.users(),
        rate_limit,
        signup_enabled: !no_signup,
    };

    let admin_state = admin::AdminState {
        jwt,
        revocations,
        principals: directory,
    };

    Router::new()
        .nest("/auth", session::router(session_state))
        .nest("/admin", admin::router(admin_state))
}
