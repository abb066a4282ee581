pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod rate_limit;
pub mod revocation;

use api::create_api_router;
use axum::Router;
use db::Database;
use jwt::JwtConfig;
use rate_limit::RateLimitConfig;
use revocation::RevocationStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing tokens
    pub signing_secret: Vec<u8>,
    /// Issuer claim stamped into and required from every token
    pub issuer: String,
    /// Access token lifetime in seconds
    pub access_ttl_secs: u64,
    /// Refresh token lifetime in seconds
    pub refresh_ttl_secs: u64,
    /// Time budget for revocation lookups on the request path
    pub revocation_timeout: Duration,
    /// Treat revocation lookup failures as revoked instead of valid
    pub revocation_fail_closed: bool,
    /// Whether new user signups are disabled
    pub no_signup: bool,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::from_secret(
        &config.signing_secret,
        &config.issuer,
        config.access_ttl_secs,
        config.refresh_ttl_secs,
    ));

    // Principal-wide markers must outlive the longest-lived token.
    let revocations = RevocationStore::new(
        &config.db,
        config.refresh_ttl_secs,
        config.revocation_timeout,
        config.revocation_fail_closed,
    );

    let rate_limit = Arc::new(RateLimitConfig::new());

    let api_router = create_api_router(
        config.db.clone(),
        jwt,
        revocations,
        rate_limit,
        config.no_signup,
    );

    Router::new().nest("/api", api_router)
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
