//! The permission resolution engine.
//!
//! Resolution order, first match wins:
//! 1. owner bypass,
//! 2. a binding on the user's (active) role to an active permission of an active module,
//! 3. a granted, unexpired override for the user.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use bizhub_auth::{EffectivePermissions, PermissionRef, Principal, is_owner_of};
use bizhub_core::{Clock, CompanyId, PermissionId, UserId};

use crate::store::{RbacReader, RbacStore, StoreResult};

pub struct PermissionResolver<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for PermissionResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S: RbacStore> PermissionResolver<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn has_permission(&self, principal: &Principal, permission: &PermissionRef) -> StoreResult<bool> {
        has_permission_in(&*self.store, principal, permission, self.now()).await
    }

    /// Logical OR, short-circuiting on the first granted pair.
    pub async fn has_any(&self, principal: &Principal, permissions: &[PermissionRef]) -> StoreResult<bool> {
        let now = self.now();
        for permission in permissions {
            if has_permission_in(&*self.store, principal, permission, now).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Logical AND; the first pair that does not resolve, if any.
    pub async fn first_missing(
        &self,
        principal: &Principal,
        permissions: &[PermissionRef],
    ) -> StoreResult<Option<PermissionRef>> {
        let now = self.now();
        for permission in permissions {
            if !has_permission_in(&*self.store, principal, permission, now).await? {
                return Ok(Some(permission.clone()));
            }
        }
        Ok(None)
    }

    pub async fn has_all(&self, principal: &Principal, permissions: &[PermissionRef]) -> StoreResult<bool> {
        Ok(self.first_missing(principal, permissions).await?.is_none())
    }

    /// The full resolved set: wildcard for owners, otherwise the union of
    /// role-bound and override-granted keys.
    pub async fn effective_permissions(&self, principal: &Principal) -> StoreResult<EffectivePermissions> {
        let user_id = match principal {
            Principal::Owner { .. } => return Ok(EffectivePermissions::All),
            Principal::CompanyUser { user_id, .. } => *user_id,
        };
        effective_for_user(&*self.store, user_id, self.now()).await
    }

    /// Whether `principal` may hand `permission_id` on to a role or user.
    pub async fn can_grant_permission(
        &self,
        principal: &Principal,
        permission_id: PermissionId,
        company_id: CompanyId,
    ) -> StoreResult<bool> {
        can_grant_in(&*self.store, principal, permission_id, company_id).await
    }
}

pub(crate) async fn has_permission_in<R: RbacReader + ?Sized>(
    reader: &R,
    principal: &Principal,
    permission: &PermissionRef,
    now: DateTime<Utc>,
) -> StoreResult<bool> {
    let user_id = match principal {
        Principal::Owner { .. } => return Ok(true),
        Principal::CompanyUser { user_id, .. } => *user_id,
    };

    let Some(entry) = reader
        .find_module_and_permission_by_keys(permission.module(), permission.permission())
        .await?
    else {
        debug!(permission = %permission, "permission not in catalog");
        return Ok(false);
    };
    let permission_id = entry.permission.id;

    let role_id = reader.find_user(user_id).await?.and_then(|u| u.assigned_role_id);
    if let Some(role_id) = role_id {
        if reader.role_has_binding(role_id, permission_id).await? {
            return Ok(true);
        }
    }

    Ok(reader
        .find_active_override(user_id, permission_id, now)
        .await?
        .is_some())
}

pub(crate) async fn effective_for_user<R: RbacReader + ?Sized>(
    reader: &R,
    user_id: UserId,
    now: DateTime<Utc>,
) -> StoreResult<EffectivePermissions> {
    let mut keys: BTreeSet<PermissionRef> = BTreeSet::new();

    if let Some(role_id) = reader.find_user(user_id).await?.and_then(|u| u.assigned_role_id) {
        keys.extend(reader.role_permission_keys(role_id).await?);
    }
    keys.extend(reader.active_override_keys(user_id, now).await?);

    Ok(EffectivePermissions::Keys(keys))
}

pub(crate) async fn can_grant_in<R: RbacReader + ?Sized>(
    reader: &R,
    principal: &Principal,
    permission_id: PermissionId,
    company_id: CompanyId,
) -> StoreResult<bool> {
    let user_id = match principal {
        Principal::Owner { .. } => return Ok(true),
        Principal::CompanyUser { user_id, .. } => *user_id,
    };

    if let Some(company) = reader.find_company(company_id).await? {
        if is_owner_of(principal, &company) {
            return Ok(true);
        }
    }

    let Some(role_id) = reader.find_user(user_id).await?.and_then(|u| u.assigned_role_id) else {
        return Ok(false);
    };
    let role_active = reader
        .find_role(company_id, role_id)
        .await?
        .is_some_and(|r| r.is_active);
    if !role_active {
        return Ok(false);
    }

    Ok(reader
        .find_binding(role_id, permission_id)
        .await?
        .is_some_and(|b| b.can_grant))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizhub_auth::{CreateRole, GrantOverride};
    use chrono::Duration;
    use proptest::prelude::*;

    use crate::rbac::test_support::Fixture;

    fn orders_view_all() -> PermissionRef {
        PermissionRef::from_static("orders", "view_all_orders")
    }

    #[tokio::test]
    async fn role_then_override_lifecycle() {
        let fx = Fixture::new().await;
        let perm = orders_view_all();
        let permission_id = fx.permission_id(&perm).await;
        let resolver = fx.services.resolver();
        let user = fx.user_with_role(None).await;
        let user_id = fx.user_id(&user);

        let role = fx
            .services
            .roles()
            .create_role(
                fx.company_id,
                CreateRole {
                    role_key: "viewer".to_string(),
                    role_name: "Viewer".to_string(),
                    description: None,
                    parent_role_id: None,
                    hierarchy_level: None,
                    is_system_role: false,
                    permission_ids: vec![permission_id],
                },
                &fx.owner,
            )
            .await
            .unwrap()
            .role;
        assert!(!resolver.has_permission(&user, &perm).await.unwrap());

        fx.services
            .assignments()
            .assign_role(fx.company_id, user_id, role.id, &fx.owner)
            .await
            .unwrap();
        assert!(resolver.has_permission(&user, &perm).await.unwrap());

        fx.services
            .assignments()
            .revoke_role(fx.company_id, user_id, &fx.owner)
            .await
            .unwrap();
        assert!(!resolver.has_permission(&user, &perm).await.unwrap());

        fx.services
            .overrides()
            .grant_override(
                fx.company_id,
                GrantOverride {
                    user_id,
                    permission_id,
                    expires_at: Some(fx.clock.now() + Duration::hours(1)),
                    reason: Some("covering a shift".to_string()),
                },
                &fx.owner,
            )
            .await
            .unwrap();
        assert!(resolver.has_permission(&user, &perm).await.unwrap());

        fx.clock.advance(Duration::hours(2));
        assert!(!resolver.has_permission(&user, &perm).await.unwrap());
        assert_eq!(fx.store.override_count().unwrap(), 1);

        assert_eq!(fx.services.overrides().purge_expired().await.unwrap(), 1);
        assert_eq!(fx.store.override_count().unwrap(), 0);
        assert!(!resolver.has_permission(&user, &perm).await.unwrap());
    }

    #[tokio::test]
    async fn owner_bypasses_without_any_rows() {
        let fx = Fixture::new().await;
        let resolver = fx.services.resolver();
        let unknown = PermissionRef::new("nowhere", "nothing");

        assert!(resolver.has_permission(&fx.owner, &unknown).await.unwrap());
        assert_eq!(
            resolver.effective_permissions(&fx.owner).await.unwrap(),
            EffectivePermissions::All
        );
    }

    #[tokio::test]
    async fn role_binding_grants_only_its_holders() {
        let fx = Fixture::new().await;
        let create_product = PermissionRef::from_static("products", "create_product");
        let with = fx.role_with(&[&create_product]).await;
        let without = fx.role_with(&[]).await;

        let alice = fx.user_with_role(Some(with)).await;
        let bob = fx.user_with_role(Some(without)).await;

        let resolver = fx.services.resolver();
        assert!(resolver.has_permission(&alice, &create_product).await.unwrap());
        assert!(!resolver.has_permission(&bob, &create_product).await.unwrap());
    }

    #[tokio::test]
    async fn inactive_permission_stops_role_grant() {
        let fx = Fixture::new().await;
        let perm = orders_view_all();
        let role = fx.role_with(&[&perm]).await;
        let user = fx.user_with_role(Some(role)).await;

        fx.store
            .set_permission_active(fx.permission_id(&perm).await, false)
            .unwrap();

        assert!(!fx.services.resolver().has_permission(&user, &perm).await.unwrap());
    }

    #[tokio::test]
    async fn override_expires_lazily() {
        let fx = Fixture::new().await;
        let perm = PermissionRef::from_static("payments", "view_payments");
        let user = fx.user_with_role(None).await;
        fx.grant_override(&user, &perm, Some(Duration::hours(1))).await;

        let resolver = fx.services.resolver();
        assert!(resolver.has_permission(&user, &perm).await.unwrap());

        fx.clock.advance(Duration::hours(2));
        assert!(!resolver.has_permission(&user, &perm).await.unwrap());
        assert_eq!(fx.store.override_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn any_and_all_report_the_failing_pair() {
        let fx = Fixture::new().await;
        let ab = PermissionRef::from_static("clients", "view_clients");
        let cd = PermissionRef::from_static("bills", "view_bills");
        let role = fx.role_with(&[&ab]).await;
        let user = fx.user_with_role(Some(role)).await;

        let resolver = fx.services.resolver();
        let pairs = [ab.clone(), cd.clone()];
        assert!(resolver.has_any(&user, &pairs).await.unwrap());
        assert!(!resolver.has_all(&user, &pairs).await.unwrap());
        assert_eq!(resolver.first_missing(&user, &pairs).await.unwrap(), Some(cd));
    }

    #[tokio::test]
    async fn effective_set_unions_role_and_overrides() {
        let fx = Fixture::new().await;
        let from_role = PermissionRef::from_static("orders", "view_orders");
        let from_override = PermissionRef::from_static("reports", "view_reports");
        let role = fx.role_with(&[&from_role]).await;
        let user = fx.user_with_role(Some(role)).await;
        fx.grant_override(&user, &from_override, None).await;

        let set = fx.services.resolver().effective_permissions(&user).await.unwrap();
        assert_eq!(set.keys(), vec!["orders.view_orders", "reports.view_reports"]);
    }

    #[tokio::test]
    async fn delegation_requires_can_grant_flag() {
        let fx = Fixture::new().await;
        let perm = orders_view_all();
        let role = fx.role_with(&[&perm]).await;
        let user = fx.user_with_role(Some(role)).await;
        let permission_id = fx.permission_id(&perm).await;
        let resolver = fx.services.resolver();

        assert!(!resolver.can_grant_permission(&user, permission_id, fx.company_id).await.unwrap());
        assert!(resolver.can_grant_permission(&fx.owner, permission_id, fx.company_id).await.unwrap());

        fx.set_can_grant(role, permission_id).await;
        assert!(resolver.can_grant_permission(&user, permission_id, fx.company_id).await.unwrap());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

        #[test]
        fn owner_bypass_holds_for_any_key(module in "[a-z_]{1,16}", permission in "[a-z_]{1,24}") {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let granted = rt.block_on(async {
                let fx = Fixture::new().await;
                fx.services
                    .resolver()
                    .has_permission(&fx.owner, &PermissionRef::new(module, permission))
                    .await
                    .unwrap()
            });
            prop_assert!(granted);
        }
    }
}
