//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use clap::Parser;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "Tokengate", about = "Bearer token authentication service")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7320")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "tokengate.db")]
    pub database: String,

    /// Issuer claim stamped into and required from every token
    #[arg(long, default_value = "tokengate")]
    pub issuer: String,

    /// Access token lifetime in seconds
    #[arg(long, default_value = "3600")]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, default_value = "604800")]
    pub refresh_ttl_secs: u64,

    /// Path to file containing the token signing secret.
    /// Prefer using the SIGNING_SECRET env var instead
    #[arg(long)]
    pub signing_secret_file: Option<String>,

    /// Time budget in milliseconds for revocation lookups on the request path
    #[arg(long, default_value = "80")]
    pub revocation_timeout_ms: u64,

    /// Treat revocation lookup failures as revoked instead of valid
    #[arg(long)]
    pub revocation_fail_closed: bool,

    /// Create an admin user with the given username on startup and print
    /// a generated password
    #[arg(long)]
    pub create_admin: Option<String>,

    /// Disable new user signups (admin creation via --create-admin still works)
    #[arg(long)]
    pub no_signup: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load the signing secret from the environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
///
/// A present-but-weak secret is returned as-is; key strength is handled at
/// key construction, which substitutes a generated key rather than refusing
/// to start.
pub fn load_signing_secret(signing_secret_file: Option<&str>) -> Option<String> {
    if let Ok(secret) = std::env::var("SIGNING_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("SIGNING_SECRET") };
        Some(secret)
    } else if let Some(path) = signing_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => Some(content.trim().to_string()),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read signing secret file");
                None
            }
        }
    } else {
        error!(
            "Signing secret is required. Set SIGNING_SECRET environment variable (recommended) or use --signing-secret-file"
        );
        None
    }
}

/// Handle the --create-admin flag: create the named admin with a generated
/// password, printed once to stdout.
pub async fn handle_create_admin(db: &Database, username: &str) {
    match db.users().is_username_available(username).await {
        Ok(false) => {
            println!();
            println!("User already exists: {}", username);
            println!();
        }
        Ok(true) => {
            let password = Uuid::new_v4().to_string();
            match db
                .users()
                .create(username, username, &password, &["user", "admin"])
                .await
            {
                Ok(_) => {
                    println!();
                    println!("Admin user created: {}", username);
                    println!("Password: {}", password);
                    println!();
                }
                Err(e) => {
                    error!(error = %e, "Failed to create admin user");
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to check for existing admin");
            std::process::exit(1);
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, signing_secret: String) -> ServerConfig {
    ServerConfig {
        db,
        signing_secret: signing_secret.into_bytes(),
        issuer: args.issuer.clone(),
        access_ttl_secs: args.access_ttl_secs,
        refresh_ttl_secs: args.refresh_ttl_secs,
        revocation_timeout: Duration::from_millis(args.revocation_timeout_ms),
        revocation_fail_closed: args.revocation_fail_closed,
        no_signup: args.no_signup,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
