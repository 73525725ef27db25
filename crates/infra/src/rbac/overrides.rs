//! Temporary, user-specific permission grants.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};

use bizhub_auth::{
    AuditAction, CompanyUser, GrantOverride, NewAuditEntry, OverrideView, PermissionOverride,
    Principal, RbacError, scoped_company,
};
use bizhub_core::{Clock, CompanyId, PermissionId, UserId};

use super::audit::{AuditLog, snapshot};
use super::resolver::PermissionResolver;
use crate::store::{RbacReader, RbacStore, RbacTx};

pub struct OverrideService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    resolver: PermissionResolver<S>,
    audit: AuditLog<S>,
}

impl<S> Clone for OverrideService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            resolver: self.resolver.clone(),
            audit: self.audit.clone(),
        }
    }
}

impl<S: RbacStore> OverrideService<S> {
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

    /// Grant (or refresh) an override. Re-granting replaces expiry and reason.
    #[instrument(skip_all, fields(company_id = %company_id, user_id = %input.user_id, permission_id = %input.permission_id))]
    pub async fn grant_override(
        &self,
        company_id: CompanyId,
        input: GrantOverride,
        actor: &Principal,
    ) -> Result<PermissionOverride, RbacError> {
        scoped_company(actor, company_id)?;
        self.load_user(company_id, input.user_id).await?;
        if self.store.find_permission(input.permission_id).await?.is_none() {
            return Err(RbacError::not_found("permission"));
        }

        let now = self.clock.now();
        if input.expires_at.is_some_and(|at| at <= now) {
            return Err(RbacError::bad_request("expires_at must be in the future"));
        }
        if !self
            .resolver
            .can_grant_permission(actor, input.permission_id, company_id)
            .await?
        {
            return Err(RbacError::forbidden("you cannot grant this permission"));
        }

        let entry = PermissionOverride {
            user_id: input.user_id,
            permission_id: input.permission_id,
            is_granted: true,
            expires_at: input.expires_at,
            override_reason: input.reason,
            overridden_by: actor.actor(),
            created_at: now,
        };

        let tx = self.store.begin().await?;
        let previous = tx
            .list_overrides_for_user(entry.user_id)
            .await?
            .into_iter()
            .find(|o| o.permission_id == entry.permission_id);
        tx.upsert_override(&entry).await?;

        let mut audit = NewAuditEntry::new(company_id, AuditAction::OverrideGranted, actor.actor())
            .user(entry.user_id)
            .new_value(snapshot(&entry)?);
        if let Some(previous) = previous {
            audit = audit.old_value(snapshot(&previous)?);
        }
        self.audit.record(&tx, audit).await?;
        tx.commit().await?;

        info!(expires_at = ?entry.expires_at, "override granted");
        Ok(entry)
    }

    /// Remove an override; `false` when there was none. Only a removal is audited.
    #[instrument(skip_all, fields(company_id = %company_id, user_id = %user_id, permission_id = %permission_id))]
    pub async fn revoke_override(
        &self,
        company_id: CompanyId,
        user_id: UserId,
        permission_id: PermissionId,
        actor: &Principal,
    ) -> Result<bool, RbacError> {
        scoped_company(actor, company_id)?;
        self.load_user(company_id, user_id).await?;

        let tx = self.store.begin().await?;
        if !tx.delete_override(user_id, permission_id).await? {
            return Ok(false);
        }
        self.audit
            .record(
                &tx,
                NewAuditEntry::new(company_id, AuditAction::OverrideRevoked, actor.actor())
                    .user(user_id)
                    .old_value(json!({ "permission_id": permission_id })),
            )
            .await?;
        tx.commit().await?;

        info!("override revoked");
        Ok(true)
    }

    /// Every override row of the user, expired ones included and flagged.
    pub async fn list_overrides(
        &self,
        company_id: CompanyId,
        user_id: UserId,
        actor: &Principal,
    ) -> Result<Vec<OverrideView>, RbacError> {
        scoped_company(actor, company_id)?;
        self.load_user(company_id, user_id).await?;

        let now = self.clock.now();
        let mut views = Vec::new();
        for entry in self.store.list_overrides_for_user(user_id).await? {
            let Some(catalog) = self.store.find_permission(entry.permission_id).await? else {
                continue;
            };
            views.push(OverrideView {
                is_active: entry.is_active_at(now),
                module_key: catalog.module.module_key,
                permission_key: catalog.permission.permission_key,
                entry,
            });
        }
        Ok(views)
    }

    /// Delete rows whose expiry has passed, across every company.
    /// Resolution never depends on this.
    pub async fn purge_expired(&self) -> Result<u64, RbacError> {
        let purged = self.store.purge_expired_overrides(self.clock.now(), None).await?;
        if purged > 0 {
            info!(purged, "expired overrides purged");
        }
        Ok(purged)
    }

    /// [`purge_expired`](Self::purge_expired) limited to one company's users.
    pub async fn purge_expired_in(&self, company_id: CompanyId, actor: &Principal) -> Result<u64, RbacError> {
        scoped_company(actor, company_id)?;
        let purged = self
            .store
            .purge_expired_overrides(self.clock.now(), Some(company_id))
            .await?;
        if purged > 0 {
            info!(%company_id, purged, "expired overrides purged");
        }
        Ok(purged)
    }

    async fn load_user(&self, company_id: CompanyId, user_id: UserId) -> Result<CompanyUser, RbacError> {
        self.store
            .find_user(user_id)
            .await?
            .filter(|u| u.company_id == company_id)
            .ok_or_else(|| RbacError::not_found("user"))
    }
}
