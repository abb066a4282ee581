//! The authenticated principal and the external collaborator traits.

use async_trait::async_trait;

/// The authenticated identity attached to a request. Constructed fresh per
/// request from the principal loader; never cached across requests.
#[derive(Debug, Clone)]
pub struct Principal {
    /// Stable principal identifier (the token subject)
    pub subject: String,
    /// Human-readable name
    pub display_name: String,
    /// Granted roles
    pub roles: Vec<String>,
}

impl Principal {
    /// Whether the principal holds the given role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Resolves a token subject to a principal. Invoked by the authentication
/// pipeline after successful verification.
#[async_trait]
pub trait PrincipalLoader: Send + Sync {
    async fn load_principal(&self, subject: &str) -> Result<Option<Principal>, DirectoryError>;
}

/// Verifies a username/password pair. Invoked only by the login flow,
/// never by the per-request pipeline.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Principal>, DirectoryError>;
}

/// Opaque failure from a collaborator. The pipeline treats it as
/// "no identity established" and the login flow surfaces it as a server
/// error.
#[derive(Debug)]
pub struct DirectoryError(String);

impl DirectoryError {
    pub fn new(source: impl std::fmt::Display) -> Self {
        Self(source.to_string())
    }
}

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Principal directory error: {}", self.0)
    }
}

impl std::error::Error for DirectoryError {}
