//! Signed token encoding, verification, and issuance.
//!
//! Tokens are compact HS256 JWTs. `verify` checks the signature and issuer
//! but deliberately not expiry: callers compare `Claims::exp` to the current
//! time themselves, so that the revocation path and the request pipeline can
//! treat expiry independently of signature validity.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::Principal;

/// Minimum signing secret length in bytes. Anything shorter is replaced by a
/// generated key at startup.
pub const MIN_SECRET_LEN: usize = 32;

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived credential presented on every request.
    Access,
    /// Long-lived credential exchanged for new access tokens.
    Refresh,
}

/// Flat claims payload carried by every token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (principal identifier)
    pub sub: String,
    /// Issuing system
    pub iss: String,
    /// Token type discriminator
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Granted roles (access tokens only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    /// Issued at (Unix seconds)
    pub iat: u64,
    /// Expiration time (Unix seconds)
    pub exp: u64,
}

impl Claims {
    /// Whether the token has passed its natural expiry.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.exp
    }

    /// Remaining lifetime in seconds, zero if already expired.
    pub fn remaining_lifetime(&self, now: u64) -> u64 {
        self.exp.saturating_sub(now)
    }
}

/// A freshly minted token together with its timestamps.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The encoded JWT string
    pub token: String,
    /// Issued at (Unix seconds)
    pub issued_at: u64,
    /// Expiration (Unix seconds)
    pub expires_at: u64,
    /// Lifetime in seconds
    pub ttl: u64,
}

/// Immutable signing configuration, created once at startup.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl: u64,
    refresh_ttl: u64,
}

impl JwtConfig {
    /// Create a configuration from the supplied secret.
    ///
    /// A secret shorter than [`MIN_SECRET_LEN`] bytes is replaced by a
    /// generated random key and a warning is logged. Tokens signed with a
    /// generated key do not survive a process restart.
    pub fn from_secret(secret: &[u8], issuer: &str, access_ttl: u64, refresh_ttl: u64) -> Self {
        let generated;
        let secret = if secret.len() < MIN_SECRET_LEN {
            tracing::warn!(
                min_len = MIN_SECRET_LEN,
                "Signing secret is too short, substituting a generated key"
            );
            generated = rand::random::<[u8; 32]>();
            &generated[..]
        } else {
            secret
        };

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.to_string(),
            access_ttl,
            refresh_ttl,
        }
    }

    /// Access token lifetime in seconds.
    pub fn access_ttl(&self) -> u64 {
        self.access_ttl
    }

    /// Refresh token lifetime in seconds. This is also the maximum possible
    /// token lifetime, used for principal-wide revocation markers.
    pub fn refresh_ttl(&self) -> u64 {
        self.refresh_ttl
    }

    /// Issue an access token carrying the principal's subject and roles.
    pub fn issue_access_token(&self, principal: &Principal) -> Result<IssuedToken, JwtError> {
        self.issue(
            &principal.subject,
            TokenType::Access,
            principal.roles.clone(),
            self.access_ttl,
        )
    }

    /// Issue a refresh token. Refresh tokens carry no roles: the role set is
    /// re-read from the principal loader when the token is redeemed.
    pub fn issue_refresh_token(&self, subject: &str) -> Result<IssuedToken, JwtError> {
        self.issue(subject, TokenType::Refresh, Vec::new(), self.refresh_ttl)
    }

    fn issue(
        &self,
        subject: &str,
        token_type: TokenType,
        roles: Vec<String>,
        ttl: u64,
    ) -> Result<IssuedToken, JwtError> {
        let now = now_unix()?;
        let exp = now + ttl;

        let claims = Claims {
            sub: subject.to_string(),
            iss: self.issuer.clone(),
            token_type,
            roles,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            issued_at: now,
            expires_at: exp,
            ttl,
        })
    }

    /// Verify the signature and issuer of a token and decode its claims.
    ///
    /// Expiry is not checked here; compare `Claims::exp` against the current
    /// time at the call site.
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.set_issuer(&[&self.issuer]);

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(JwtError::Decoding)?;

        Ok(data.claims)
    }

    /// Decode the claims payload without verifying the signature.
    ///
    /// The revocation path uses this so that revoking a token succeeds even
    /// when signature verification would be borderline (e.g. clock skew).
    pub fn peek(token: &str) -> Result<Claims, JwtError> {
        let mut segments = token.split('.');
        let payload = match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Err(JwtError::Malformed),
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| JwtError::Malformed)?;
        serde_json::from_slice(&bytes).map_err(|_| JwtError::Malformed)
    }
}

/// Current Unix time in seconds.
pub fn now_unix() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

/// Errors that can occur during token operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Error decoding the token (bad signature, wrong issuer, garbage input)
    Decoding(jsonwebtoken::errors::Error),
    /// Token does not have the three-segment compact layout
    Malformed,
    /// System time error
    TimeError,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::Malformed => write!(f, "Malformed token"),
            JwtError::TimeError => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for JwtError {}
