//! Authorization gates every protected operation calls through.
//!
//! Gates operate on an already-resolved [`Principal`] (or its absence).
//! Any backing-store failure fails closed with `PermissionCheck`.

use std::sync::Arc;

use tracing::debug;

use bizhub_auth::{EffectivePermissions, PermissionRef, Principal, RbacError, is_owner_of};
use bizhub_core::CompanyId;

use super::resolver::PermissionResolver;
use crate::store::RbacStore;

pub struct Gatekeeper<S> {
    store: Arc<S>,
    resolver: PermissionResolver<S>,
}

impl<S> Clone for Gatekeeper<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

impl<S: RbacStore> Gatekeeper<S> {
    pub fn new(store: Arc<S>, resolver: PermissionResolver<S>) -> Self {
        Self { store, resolver }
    }

    pub fn require_authenticated<'p>(&self, principal: Option<&'p Principal>) -> Result<&'p Principal, RbacError> {
        principal.ok_or(RbacError::Unauthorized)
    }

    pub async fn require_permission<'p>(
        &self,
        principal: Option<&'p Principal>,
        permission: &PermissionRef,
    ) -> Result<&'p Principal, RbacError> {
        let principal = self.require_authenticated(principal)?;
        if principal.is_owner() {
            return Ok(principal);
        }
        self.check_account(principal).await?;

        if self.resolver.has_permission(principal, permission).await? {
            Ok(principal)
        } else {
            debug!(subject = %principal.subject(), permission = %permission, "permission denied");
            Err(RbacError::denied(permission.clone()))
        }
    }

    pub async fn require_any_permission<'p>(
        &self,
        principal: Option<&'p Principal>,
        permissions: &[PermissionRef],
    ) -> Result<&'p Principal, RbacError> {
        let principal = self.require_authenticated(principal)?;
        if principal.is_owner() {
            return Ok(principal);
        }
        self.check_account(principal).await?;

        if self.resolver.has_any(principal, permissions).await? {
            Ok(principal)
        } else {
            debug!(subject = %principal.subject(), "no permission of the any-of set held");
            Err(RbacError::PermissionDenied {
                required: permissions.to_vec(),
                missing: None,
            })
        }
    }

    pub async fn require_all_permissions<'p>(
        &self,
        principal: Option<&'p Principal>,
        permissions: &[PermissionRef],
    ) -> Result<&'p Principal, RbacError> {
        let principal = self.require_authenticated(principal)?;
        if principal.is_owner() {
            return Ok(principal);
        }
        self.check_account(principal).await?;

        match self.resolver.first_missing(principal, permissions).await? {
            None => Ok(principal),
            Some(missing) => {
                debug!(subject = %principal.subject(), missing = %missing, "all-of permission gate failed");
                Err(RbacError::PermissionDenied {
                    required: permissions.to_vec(),
                    missing: Some(missing),
                })
            }
        }
    }

    /// Owner kind, or, for legacy records, the registered owner of `company_id`.
    pub async fn require_owner<'p>(
        &self,
        principal: Option<&'p Principal>,
        company_id: Option<CompanyId>,
    ) -> Result<&'p Principal, RbacError> {
        let principal = self.require_authenticated(principal)?;
        if principal.is_owner() {
            return Ok(principal);
        }

        if let Some(company_id) = company_id {
            if let Some(company) = self.store.find_company(company_id).await? {
                if is_owner_of(principal, &company) {
                    return Ok(principal);
                }
            }
        }

        debug!(subject = %principal.subject(), "owner required");
        Err(RbacError::OwnerRequired)
    }

    /// Read-only enrichment: the caller's resolved permission set.
    pub async fn attach_user_permissions(&self, principal: &Principal) -> Result<EffectivePermissions, RbacError> {
        Ok(self.resolver.effective_permissions(principal).await?)
    }

    /// Company and account state for non-owner principals.
    async fn check_account(&self, principal: &Principal) -> Result<(), RbacError> {
        let (user_id, company_id) = match principal {
            Principal::Owner { .. } => return Ok(()),
            Principal::CompanyUser {
                user_id, company_id, ..
            } => (*user_id, *company_id),
        };

        let company = self
            .store
            .find_company(company_id)
            .await?
            .ok_or(RbacError::PrincipalNotFound)?;
        if company.is_frozen {
            return Err(RbacError::CompanyFrozen);
        }

        let user = self
            .store
            .find_user(user_id)
            .await?
            .filter(|u| u.company_id == company_id)
            .ok_or(RbacError::PrincipalNotFound)?;
        if !user.is_active || !principal.is_active() {
            return Err(RbacError::UserInactive);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizhub_auth::permissions::rbac;

    use crate::rbac::test_support::Fixture;

    #[tokio::test]
    async fn missing_principal_is_unauthorized() {
        let fx = Fixture::new().await;
        let gate = fx.services.gate();

        assert_eq!(gate.require_authenticated(None), Err(RbacError::Unauthorized));
        assert_eq!(
            gate.require_permission(None, &rbac::VIEW_ROLES).await,
            Err(RbacError::Unauthorized)
        );
        assert_eq!(gate.require_owner(None, None).await, Err(RbacError::Unauthorized));
    }

    #[tokio::test]
    async fn owner_passes_every_gate_even_when_frozen() {
        let fx = Fixture::new().await;
        fx.store.set_company_frozen(fx.company_id, true).unwrap();
        let gate = fx.services.gate();

        assert!(gate.require_permission(Some(&fx.owner), &rbac::MANAGE_ROLES).await.is_ok());
        assert!(gate
            .require_all_permissions(Some(&fx.owner), &[rbac::MANAGE_ROLES, rbac::VIEW_AUDIT_LOG])
            .await
            .is_ok());
        assert!(gate.require_owner(Some(&fx.owner), Some(fx.company_id)).await.is_ok());
    }

    #[tokio::test]
    async fn frozen_company_blocks_users_before_permission_check() {
        let fx = Fixture::new().await;
        let role = fx.role_with(&[&rbac::VIEW_ROLES]).await;
        let user = fx.user_with_role(Some(role)).await;
        fx.store.set_company_frozen(fx.company_id, true).unwrap();

        assert_eq!(
            fx.services.gate().require_permission(Some(&user), &rbac::VIEW_ROLES).await,
            Err(RbacError::CompanyFrozen)
        );
    }

    #[tokio::test]
    async fn inactive_user_is_rejected() {
        let fx = Fixture::new().await;
        let role = fx.role_with(&[&rbac::VIEW_ROLES]).await;
        let user = fx.user_with_role(Some(role)).await;
        fx.store.set_user_active(fx.user_id(&user), false).unwrap();

        assert_eq!(
            fx.services.gate().require_any_permission(Some(&user), &[rbac::VIEW_ROLES]).await,
            Err(RbacError::UserInactive)
        );
    }

    #[tokio::test]
    async fn denial_names_the_required_permission() {
        let fx = Fixture::new().await;
        let user = fx.user_with_role(None).await;

        let err = fx
            .services
            .gate()
            .require_permission(Some(&user), &rbac::MANAGE_ROLES)
            .await
            .unwrap_err();
        assert_eq!(err.denial().required_permission, Some(rbac::MANAGE_ROLES));
    }

    #[tokio::test]
    async fn all_of_gate_names_first_missing_pair() {
        let fx = Fixture::new().await;
        let role = fx.role_with(&[&rbac::VIEW_ROLES]).await;
        let user = fx.user_with_role(Some(role)).await;

        let err = fx
            .services
            .gate()
            .require_all_permissions(Some(&user), &[rbac::VIEW_ROLES, rbac::VIEW_AUDIT_LOG])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RbacError::PermissionDenied {
                required: vec![rbac::VIEW_ROLES, rbac::VIEW_AUDIT_LOG],
                missing: Some(rbac::VIEW_AUDIT_LOG),
            }
        );
    }

    #[tokio::test]
    async fn registered_owner_record_satisfies_owner_gate() {
        let fx = Fixture::new().await;
        let legacy = fx.legacy_owner_user().await;
        let stranger = fx.user_with_role(None).await;
        let gate = fx.services.gate();

        assert!(gate.require_owner(Some(&legacy), Some(fx.company_id)).await.is_ok());
        assert_eq!(
            gate.require_owner(Some(&stranger), Some(fx.company_id)).await,
            Err(RbacError::OwnerRequired)
        );
    }

    #[tokio::test]
    async fn attached_permissions_for_owner_are_wildcard() {
        let fx = Fixture::new().await;
        let set = fx.services.gate().attach_user_permissions(&fx.owner).await.unwrap();
        assert_eq!(set.keys(), vec!["*.*"]);
    }
}
