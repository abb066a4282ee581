//! Authentication state trait and macro.

use crate::auth::PrincipalLoader;
use crate::jwt::JwtConfig;
use crate::revocation::RevocationStore;

/// Trait for router state types that carry the authentication backend.
pub trait HasAuthBackend {
    fn jwt(&self) -> &JwtConfig;
    fn revocations(&self) -> &RevocationStore;
    fn principals(&self) -> &dyn PrincipalLoader;
}

/// Implement [`HasAuthBackend`] for a state struct with the standard fields:
/// `jwt: Arc<JwtConfig>`, `revocations: RevocationStore`, and
/// `principals: Arc<dyn PrincipalLoader>`.
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn jwt(&self) -> &$crate::jwt::JwtConfig {
                &self.jwt
            }
            fn revocations(&self) -> &$crate::revocation::RevocationStore {
                &self.revocations
            }
            fn principals(&self) -> &dyn $crate::auth::PrincipalLoader {
                &*self.principals
            }
        }
    };
}
