//! Placing users into roles.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};

use bizhub_auth::permissions::rbac;
use bizhub_auth::{
    AuditAction, CompanyUser, EffectivePermissions, NewAuditEntry, Principal, RbacError,
    RoleAssignment, scoped_company,
};
use bizhub_core::{Clock, CompanyId, RoleId, UserId};

use super::audit::AuditLog;
use super::resolver::PermissionResolver;
use crate::store::{RbacStore, RbacTx};

pub struct AssignmentService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    resolver: PermissionResolver<S>,
    audit: AuditLog<S>,
}

impl<S> Clone for AssignmentService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            resolver: self.resolver.clone(),
            audit: self.audit.clone(),
        }
    }
}

impl<S: RbacStore> AssignmentService<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        resolver: PermissionResolver<S>,
        audit: AuditLog<S>,
    ) -> Self {
        Self {
            store,
            clock,
            resolver,
            audit,
        }
    }

    /// Give `user_id` the role, replacing whatever they held before.
    #[instrument(skip_all, fields(company_id = %company_id, user_id = %user_id, role_id = %role_id))]
    pub async fn assign_role(
        &self,
        company_id: CompanyId,
        user_id: UserId,
        role_id: RoleId,
        actor: &Principal,
    ) -> Result<CompanyUser, RbacError> {
        scoped_company(actor, company_id)?;
        self.require_assign_roles(actor).await?;
        let user = self.load_user(company_id, user_id).await?;
        if self.store.find_role(company_id, role_id).await?.is_none() {
            return Err(RbacError::not_found("role"));
        }

        let assignment = RoleAssignment {
            role_id,
            assigned_at: self.clock.now(),
            assigned_by: actor.actor(),
        };

        let tx = self.store.begin().await?;
        tx.update_user_role_assignment(user_id, Some(assignment)).await?;
        self.audit
            .record(
                &tx,
                NewAuditEntry::new(company_id, AuditAction::UserRoleAssigned, actor.actor())
                    .user(user_id)
                    .role(role_id)
                    .old_value(json!({ "role_id": user.assigned_role_id }))
                    .new_value(json!({ "role_id": role_id })),
            )
            .await?;
        tx.commit().await?;

        info!(previous_role_id = ?user.assigned_role_id, "role assigned");
        Ok(user.with_assignment(Some(assignment)))
    }

    /// Clear the user's role. Fails when none is assigned.
    #[instrument(skip_all, fields(company_id = %company_id, user_id = %user_id))]
    pub async fn revoke_role(
        &self,
        company_id: CompanyId,
        user_id: UserId,
        actor: &Principal,
    ) -> Result<CompanyUser, RbacError> {
        scoped_company(actor, company_id)?;
        self.require_assign_roles(actor).await?;
        let user = self.load_user(company_id, user_id).await?;
        let Some(previous) = user.assigned_role_id else {
            return Err(RbacError::bad_request("user has no role assigned"));
        };

        let tx = self.store.begin().await?;
        tx.update_user_role_assignment(user_id, None).await?;
        self.audit
            .record(
                &tx,
                NewAuditEntry::new(company_id, AuditAction::UserRoleRevoked, actor.actor())
                    .user(user_id)
                    .role(previous)
                    .old_value(json!({ "role_id": previous })),
            )
            .await?;
        tx.commit().await?;

        info!(previous_role_id = %previous, "role revoked");
        Ok(user.with_assignment(None))
    }

    /// Resolved permission set of another user in the company.
    pub async fn user_permissions(
        &self,
        company_id: CompanyId,
        user_id: UserId,
        actor: &Principal,
    ) -> Result<EffectivePermissions, RbacError> {
        scoped_company(actor, company_id)?;
        self.load_user(company_id, user_id).await?;
        let target = Principal::company_user(user_id, company_id);
        Ok(self.resolver.effective_permissions(&target).await?)
    }

    async fn require_assign_roles(&self, actor: &Principal) -> Result<(), RbacError> {
        if self.resolver.has_permission(actor, &rbac::ASSIGN_ROLES).await? {
            Ok(())
        } else {
            Err(RbacError::forbidden("users.assign_roles is required"))
        }
    }

    async fn load_user(&self, company_id: CompanyId, user_id: UserId) -> Result<CompanyUser, RbacError> {
        self.store
            .find_user(user_id)
            .await?
            .filter(|u| u.company_id == company_id)
            .ok_or_else(|| RbacError::not_found("user"))
    }
}
