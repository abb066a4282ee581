//! Request authentication.
//!
//! A bearer token is turned into an [`Identity`] exactly once per request by
//! the pipeline in [`pipeline`]; every failure degrades to
//! `Identity::Anonymous` and the request continues. Whether an anonymous
//! request may proceed is decided per endpoint by the [`RequireAuth`] and
//! [`AdminOnly`] extractors, not by the pipeline itself.

mod bearer;
mod errors;
mod pipeline;
mod principal;
mod state;

pub use bearer::bearer_token;
pub use errors::AuthError;
pub use pipeline::{ADMIN_ROLE, AdminOnly, Identity, RequireAuth};
pub use principal::{CredentialVerifier, DirectoryError, Principal, PrincipalLoader};
pub use state::HasAuthBackend;
