//! Bearer credential to [`Principal`].

use std::sync::Arc;

use tracing::{debug, warn};

use bizhub_auth::{AuthError, JwtValidator, Principal, PrincipalKind};
use bizhub_core::{Clock, OwnerId, UserId};

use crate::store::{RbacStore, StoreError};

pub struct PrincipalResolver<S> {
    validator: Arc<dyn JwtValidator>,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for PrincipalResolver<S> {
    fn clone(&self) -> Self {
        Self {
            validator: self.validator.clone(),
            store: self.store.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S: RbacStore> PrincipalResolver<S> {
    pub fn new(validator: Arc<dyn JwtValidator>, store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            validator,
            store,
            clock,
        }
    }

    /// Verify `token` and look its subject up.
    ///
    /// Owners must exist and be active. Company users must be active, belong
    /// to the company named in the token, and that company must be active.
    /// Frozen companies are left to the authorization gates.
    pub async fn resolve(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.validator.validate(token, self.clock.now())?;

        match claims.kind {
            PrincipalKind::Owner => {
                let owner_id = OwnerId::from_uuid(claims.sub);
                let owner = self
                    .store
                    .find_owner(owner_id)
                    .await
                    .map_err(unavailable)?
                    .filter(|o| o.is_active)
                    .ok_or(AuthError::PrincipalNotFound)?;
                Ok(Principal::owner(owner.id))
            }
            PrincipalKind::CompanyUser => {
                let user_id = UserId::from_uuid(claims.sub);
                let user = self
                    .store
                    .find_user(user_id)
                    .await
                    .map_err(unavailable)?
                    .filter(|u| u.is_active)
                    .ok_or(AuthError::PrincipalNotFound)?;

                if claims.company_id.is_some_and(|c| c != user.company_id) {
                    debug!(user_id = %user_id, "token company does not match user");
                    return Err(AuthError::InvalidCredential);
                }

                self.store
                    .find_company(user.company_id)
                    .await
                    .map_err(unavailable)?
                    .filter(|c| c.is_active)
                    .ok_or(AuthError::PrincipalNotFound)?;

                Ok(Principal::company_user(user.id, user.company_id))
            }
        }
    }
}

fn unavailable(err: StoreError) -> AuthError {
    warn!(error = %err, "principal lookup failed");
    AuthError::Unavailable
}
