//! Role lifecycle and role-permission bindings.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};

use bizhub_auth::permissions::rbac;
use bizhub_auth::{
    AssignOutcome, AuditAction, CloneRole, CreateRole, NewAuditEntry, Principal, RbacError,
    RevokeOutcome, Role, RoleComparison, RoleDetail, RoleNode, RolePatch, RolePermission,
    RoleSummary, SkipReason, build_hierarchy, scoped_company, validate_role_key,
    validate_role_name,
};
use bizhub_core::{Clock, CompanyId, PermissionId, RoleId};

use super::audit::{AuditLog, snapshot};
use super::resolver::{PermissionResolver, can_grant_in};
use crate::store::{RbacReader, RbacStore, RbacTx, StoreError};

pub struct RoleService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    resolver: PermissionResolver<S>,
    audit: AuditLog<S>,
}

impl<S> Clone for RoleService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            resolver: self.resolver.clone(),
            audit: self.audit.clone(),
        }
    }
}

impl<S: RbacStore> RoleService<S> {
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

    /// Create a role, binding only the requested permissions the actor may grant.
    #[instrument(skip_all, fields(company_id = %company_id, role_key = %input.role_key))]
    pub async fn create_role(
        &self,
        company_id: CompanyId,
        input: CreateRole,
        actor: &Principal,
    ) -> Result<RoleSummary, RbacError> {
        scoped_company(actor, company_id)?;
        validate_role_key(&input.role_key)?;
        validate_role_name(&input.role_name)?;

        if self
            .store
            .find_role_by_key(company_id, &input.role_key)
            .await?
            .is_some()
        {
            return Err(RbacError::DuplicateRoleKey(input.role_key));
        }
        self.require_manage_roles(actor).await?;
        if input.is_system_role && !actor.is_owner() {
            return Err(RbacError::forbidden("only owners may create system roles"));
        }
        self.check_parent(company_id, None, input.parent_role_id).await?;

        let mut grantable = Vec::new();
        for permission_id in unique(&input.permission_ids) {
            if self.store.find_permission(permission_id).await?.is_none() {
                continue;
            }
            if self
                .resolver
                .can_grant_permission(actor, permission_id, company_id)
                .await?
            {
                grantable.push(permission_id);
            }
        }

        let now = self.clock.now();
        let role = Role {
            id: RoleId::new(),
            company_id,
            role_key: input.role_key,
            role_name: input.role_name.trim().to_string(),
            description: input.description,
            parent_role_id: input.parent_role_id,
            hierarchy_level: input.hierarchy_level.unwrap_or(0),
            is_system_role: input.is_system_role,
            is_active: true,
            created_by: actor.actor(),
            created_at: now,
            updated_at: now,
        };

        let tx = self.store.begin().await?;
        insert_role(&tx, &role).await?;

        let mut permission_count = 0;
        for permission_id in grantable {
            let binding = RolePermission {
                role_id: role.id,
                permission_id,
                can_grant: false,
                granted_by: actor.actor(),
                granted_at: now,
            };
            if tx.insert_binding(&binding).await? {
                permission_count += 1;
            }
        }

        self.audit
            .record(
                &tx,
                NewAuditEntry::new(company_id, AuditAction::RoleCreated, actor.actor())
                    .role(role.id)
                    .new_value(json!({
                        "role_key": role.role_key,
                        "role_name": role.role_name,
                        "permission_count": permission_count,
                    })),
            )
            .await?;
        tx.commit().await?;

        info!(role_id = %role.id, permission_count, "role created");
        Ok(RoleSummary {
            role,
            permission_count,
            user_count: 0,
        })
    }

    pub async fn get_role(
        &self,
        company_id: CompanyId,
        role_id: RoleId,
        actor: &Principal,
    ) -> Result<RoleDetail, RbacError> {
        scoped_company(actor, company_id)?;
        let role = self.load(company_id, role_id).await?;
        let permissions = self.store.find_bindings_for_role(role_id).await?;
        Ok(RoleDetail { role, permissions })
    }

    pub async fn list_roles(&self, company_id: CompanyId, actor: &Principal) -> Result<Vec<RoleSummary>, RbacError> {
        scoped_company(actor, company_id)?;

        let roles = self.store.list_roles(company_id).await?;
        let mut summaries = Vec::with_capacity(roles.len());
        for role in roles {
            let permission_count = self.store.find_bindings_for_role(role.id).await?.len() as u64;
            let user_count = self.store.count_users_with_role(role.id).await?;
            summaries.push(RoleSummary {
                role,
                permission_count,
                user_count,
            });
        }
        Ok(summaries)
    }

    #[instrument(skip_all, fields(company_id = %company_id, role_id = %role_id))]
    pub async fn update_role(
        &self,
        company_id: CompanyId,
        role_id: RoleId,
        patch: RolePatch,
        actor: &Principal,
    ) -> Result<Role, RbacError> {
        scoped_company(actor, company_id)?;
        let role = self.load(company_id, role_id).await?;
        if role.is_system_role {
            return Err(RbacError::forbidden("system roles cannot be modified"));
        }
        self.require_manage_roles(actor).await?;

        if patch.is_empty() {
            return Err(RbacError::bad_request("no updatable fields supplied"));
        }
        if let Some(name) = &patch.role_name {
            validate_role_name(name)?;
        }
        if let Some(parent) = patch.parent_role_id {
            self.check_parent(company_id, Some(role_id), parent).await?;
        }

        let updated = patch.applied_to(&role, self.clock.now());

        let tx = self.store.begin().await?;
        tx.update_role(&updated).await?;
        self.audit
            .record(
                &tx,
                NewAuditEntry::new(company_id, AuditAction::RoleUpdated, actor.actor())
                    .role(role_id)
                    .old_value(snapshot(&role)?)
                    .new_value(snapshot(&updated)?),
            )
            .await?;
        tx.commit().await?;

        info!("role updated");
        Ok(updated)
    }

    /// Delete a role nobody holds, together with its bindings.
    #[instrument(skip_all, fields(company_id = %company_id, role_id = %role_id))]
    pub async fn delete_role(&self, company_id: CompanyId, role_id: RoleId, actor: &Principal) -> Result<(), RbacError> {
        scoped_company(actor, company_id)?;
        let role = self.load(company_id, role_id).await?;
        if role.is_system_role {
            return Err(RbacError::forbidden("system roles cannot be deleted"));
        }

        let tx = self.store.begin().await?;
        let user_count = tx.count_users_with_role(role_id).await?;
        if user_count > 0 {
            return Err(RbacError::RoleInUse { role_id, user_count });
        }
        self.require_manage_roles(actor).await?;

        let permissions = tx.find_bindings_for_role(role_id).await?;
        tx.delete_all_bindings(role_id).await?;
        tx.delete_role(company_id, role_id).await?;
        self.audit
            .record(
                &tx,
                NewAuditEntry::new(company_id, AuditAction::RoleDeleted, actor.actor())
                    .role(role_id)
                    .old_value(json!({
                        "role": snapshot(&role)?,
                        "permissions": snapshot(&permissions)?,
                    })),
            )
            .await?;
        tx.commit().await?;

        info!("role deleted");
        Ok(())
    }

    /// Copy a role and all of its bindings under a new key.
    #[instrument(skip_all, fields(company_id = %company_id, source_role_id = %source_role_id, role_key = %input.role_key))]
    pub async fn clone_role(
        &self,
        company_id: CompanyId,
        source_role_id: RoleId,
        input: CloneRole,
        actor: &Principal,
    ) -> Result<RoleSummary, RbacError> {
        scoped_company(actor, company_id)?;
        let source = self.load(company_id, source_role_id).await?;
        validate_role_key(&input.role_key)?;
        validate_role_name(&input.role_name)?;

        if self
            .store
            .find_role_by_key(company_id, &input.role_key)
            .await?
            .is_some()
        {
            return Err(RbacError::DuplicateRoleKey(input.role_key));
        }
        self.require_manage_roles(actor).await?;

        let now = self.clock.now();
        let role = Role {
            id: RoleId::new(),
            company_id,
            role_key: input.role_key,
            role_name: input.role_name.trim().to_string(),
            description: Some(format!("Cloned from {}", source.role_name)),
            parent_role_id: source.parent_role_id,
            hierarchy_level: source.hierarchy_level,
            is_system_role: false,
            is_active: true,
            created_by: actor.actor(),
            created_at: now,
            updated_at: now,
        };

        let tx = self.store.begin().await?;
        insert_role(&tx, &role).await?;

        let mut permission_count = 0;
        for bound in tx.find_bindings_for_role(source_role_id).await? {
            let binding = RolePermission {
                role_id: role.id,
                permission_id: bound.permission_id,
                can_grant: input.include_can_grant && bound.can_grant,
                granted_by: actor.actor(),
                granted_at: now,
            };
            if tx.insert_binding(&binding).await? {
                permission_count += 1;
            }
        }

        self.audit
            .record(
                &tx,
                NewAuditEntry::new(company_id, AuditAction::RoleCreated, actor.actor())
                    .role(role.id)
                    .new_value(json!({
                        "role_key": role.role_key,
                        "role_name": role.role_name,
                        "cloned_from": source_role_id,
                        "permission_count": permission_count,
                    })),
            )
            .await?;
        tx.commit().await?;

        info!(role_id = %role.id, permission_count, "role cloned");
        Ok(RoleSummary {
            role,
            permission_count,
            user_count: 0,
        })
    }

    pub async fn role_hierarchy(&self, company_id: CompanyId, actor: &Principal) -> Result<Vec<RoleNode>, RbacError> {
        scoped_company(actor, company_id)?;
        Ok(build_hierarchy(self.store.list_roles(company_id).await?))
    }

    /// Ids that do not resolve inside the company are skipped.
    pub async fn compare_roles(
        &self,
        company_id: CompanyId,
        role_ids: &[RoleId],
        actor: &Principal,
    ) -> Result<RoleComparison, RbacError> {
        scoped_company(actor, company_id)?;

        let mut roles = Vec::new();
        for role_id in unique(role_ids) {
            if let Some(role) = self.store.find_role(company_id, role_id).await? {
                let permissions = self.store.find_bindings_for_role(role_id).await?;
                roles.push(RoleDetail { role, permissions });
            }
        }

        if roles.len() < 2 {
            return Err(RbacError::bad_request("at least two existing roles are required for comparison"));
        }
        Ok(RoleComparison::new(roles))
    }

    /// Bind permissions to a role, skipping existing bindings and anything
    /// the actor may not delegate. One audit entry summarises the call.
    #[instrument(skip_all, fields(company_id = %company_id, role_id = %role_id, requested = permission_ids.len()))]
    pub async fn assign_permissions(
        &self,
        company_id: CompanyId,
        role_id: RoleId,
        permission_ids: &[PermissionId],
        can_grant: bool,
        actor: &Principal,
    ) -> Result<AssignOutcome, RbacError> {
        scoped_company(actor, company_id)?;
        let role = self.load(company_id, role_id).await?;
        if role.is_system_role {
            return Err(RbacError::forbidden("system role permissions cannot be changed"));
        }
        if permission_ids.is_empty() {
            return Err(RbacError::bad_request("permission_ids must not be empty"));
        }

        let now = self.clock.now();
        let tx = self.store.begin().await?;

        let mut outcome = AssignOutcome::default();
        for permission_id in unique(permission_ids) {
            if tx.find_permission(permission_id).await?.is_none() {
                outcome.skip(permission_id, SkipReason::UnknownPermission);
                continue;
            }
            if tx.find_binding(role_id, permission_id).await?.is_some() {
                outcome.skip(permission_id, SkipReason::AlreadyBound);
                continue;
            }
            if !can_grant_in(&tx, actor, permission_id, company_id).await? {
                outcome.skip(permission_id, SkipReason::NotGrantable);
                continue;
            }

            let binding = RolePermission {
                role_id,
                permission_id,
                can_grant,
                granted_by: actor.actor(),
                granted_at: now,
            };
            if tx.insert_binding(&binding).await? {
                outcome.bound(permission_id);
            } else {
                outcome.skip(permission_id, SkipReason::AlreadyBound);
            }
        }

        self.audit
            .record(
                &tx,
                NewAuditEntry::new(company_id, AuditAction::PermissionGranted, actor.actor())
                    .role(role_id)
                    .new_value(json!({
                        "can_grant": can_grant,
                        "assigned": outcome.assigned,
                        "skipped": outcome.skipped,
                        "assigned_permissions": outcome.assigned_permissions,
                        "skipped_permissions": outcome.skipped_permissions,
                    })),
            )
            .await?;
        tx.commit().await?;

        info!(assigned = outcome.assigned, skipped = outcome.skipped, "permissions assigned");
        Ok(outcome)
    }

    #[instrument(skip_all, fields(company_id = %company_id, role_id = %role_id, requested = permission_ids.len()))]
    pub async fn revoke_permissions(
        &self,
        company_id: CompanyId,
        role_id: RoleId,
        permission_ids: &[PermissionId],
        actor: &Principal,
    ) -> Result<RevokeOutcome, RbacError> {
        scoped_company(actor, company_id)?;
        let role = self.load(company_id, role_id).await?;
        if role.is_system_role {
            return Err(RbacError::forbidden("system role permissions cannot be changed"));
        }
        if permission_ids.is_empty() {
            return Err(RbacError::bad_request("permission_ids must not be empty"));
        }

        let requested = unique(permission_ids);
        let tx = self.store.begin().await?;
        let removed = tx.delete_bindings(role_id, &requested).await?;
        self.audit
            .record(
                &tx,
                NewAuditEntry::new(company_id, AuditAction::PermissionRevoked, actor.actor())
                    .role(role_id)
                    .old_value(json!({ "permission_ids": requested }))
                    .new_value(json!({ "removed": removed })),
            )
            .await?;
        tx.commit().await?;

        info!(removed, "permissions revoked");
        Ok(RevokeOutcome { removed })
    }

    pub async fn can_grant_permission(
        &self,
        actor: &Principal,
        permission_id: PermissionId,
        company_id: CompanyId,
    ) -> Result<bool, RbacError> {
        Ok(self
            .resolver
            .can_grant_permission(actor, permission_id, company_id)
            .await?)
    }

    async fn load(&self, company_id: CompanyId, role_id: RoleId) -> Result<Role, RbacError> {
        self.store
            .find_role(company_id, role_id)
            .await?
            .ok_or_else(|| RbacError::not_found("role"))
    }

    async fn require_manage_roles(&self, actor: &Principal) -> Result<(), RbacError> {
        if self.resolver.has_permission(actor, &rbac::MANAGE_ROLES).await? {
            Ok(())
        } else {
            Err(RbacError::forbidden("roles.manage_roles is required"))
        }
    }

    /// `parent` must exist in the company and must not lead back to `role_id`.
    async fn check_parent(
        &self,
        company_id: CompanyId,
        role_id: Option<RoleId>,
        parent: Option<RoleId>,
    ) -> Result<(), RbacError> {
        let Some(parent_id) = parent else {
            return Ok(());
        };
        if Some(parent_id) == role_id {
            return Err(RbacError::bad_request("a role cannot be its own parent"));
        }

        let mut seen = HashSet::new();
        let mut cursor = Some(
            self.store
                .find_role(company_id, parent_id)
                .await?
                .ok_or_else(|| RbacError::not_found("parent role"))?,
        );
        while let Some(ancestor) = cursor {
            if Some(ancestor.id) == role_id {
                return Err(RbacError::bad_request("parent link would create a cycle"));
            }
            if !seen.insert(ancestor.id) {
                break;
            }
            cursor = match ancestor.parent_role_id {
                Some(next) => self.store.find_role(company_id, next).await?,
                None => None,
            };
        }
        Ok(())
    }
}

async fn insert_role<T: RbacTx>(tx: &T, role: &Role) -> Result<(), RbacError> {
    tx.insert_role(role).await.map_err(|e| match e {
        StoreError::UniqueViolation(_) => RbacError::DuplicateRoleKey(role.role_key.clone()),
        other => other.into(),
    })
}

/// Deduplicate, keeping first occurrences in order.
fn unique<T: Copy + Eq + Hash>(ids: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
