use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;

use bizhub_auth::{
    AuditFilter, AuditLogEntry, AuditPage, BoundPermission, CatalogEntry, CatalogModule, Company,
    CompanyUser, Module, OwnerAccount, Pagination, Permission, PermissionOverride, PermissionRef,
    Role, RoleAssignment, RolePermission,
};
use bizhub_core::{CompanyId, ModuleId, OwnerId, PermissionId, RoleId, UserId};

use super::{RbacReader, RbacStore, RbacTx, ROLE_KEY_CONSTRAINT, StoreError, StoreResult};

#[derive(Debug, Default, Clone)]
struct State {
    owners: HashMap<OwnerId, OwnerAccount>,
    companies: HashMap<CompanyId, Company>,
    users: HashMap<UserId, CompanyUser>,
    modules: HashMap<ModuleId, Module>,
    permissions: HashMap<PermissionId, Permission>,
    roles: HashMap<RoleId, Role>,
    bindings: BTreeMap<(RoleId, PermissionId), RolePermission>,
    overrides: BTreeMap<(UserId, PermissionId), PermissionOverride>,
    /// Append order.
    audit: Vec<AuditLogEntry>,
}

impl State {
    fn entry(&self, permission_id: PermissionId) -> Option<CatalogEntry> {
        let permission = self.permissions.get(&permission_id)?;
        let module = self.modules.get(&permission.module_id)?;
        Some(CatalogEntry {
            module: module.clone(),
            permission: permission.clone(),
        })
    }

    fn entry_by_keys(&self, module_key: &str, permission_key: &str) -> Option<CatalogEntry> {
        let module = self.modules.values().find(|m| m.module_key == module_key)?;
        let permission = self
            .permissions
            .values()
            .find(|p| p.module_id == module.id && p.permission_key == permission_key)?;
        Some(CatalogEntry {
            module: module.clone(),
            permission: permission.clone(),
        })
    }

    fn catalog(&self) -> Vec<CatalogModule> {
        let mut modules: Vec<CatalogModule> = self
            .modules
            .values()
            .map(|m| {
                let mut permissions: Vec<Permission> = self
                    .permissions
                    .values()
                    .filter(|p| p.module_id == m.id)
                    .cloned()
                    .collect();
                permissions.sort_by(|a, b| a.permission_key.cmp(&b.permission_key));
                CatalogModule {
                    module: m.clone(),
                    permissions,
                }
            })
            .collect();
        modules.sort_by(|a, b| {
            a.module
                .sort_order
                .cmp(&b.module.sort_order)
                .then_with(|| a.module.module_key.cmp(&b.module.module_key))
        });
        modules
    }

    fn role_in(&self, company_id: CompanyId, role_id: RoleId) -> Option<&Role> {
        self.roles.get(&role_id).filter(|r| r.company_id == company_id)
    }

    fn bound(&self, role_id: RoleId) -> Vec<BoundPermission> {
        self.bindings
            .range((role_id, PermissionId::nil())..)
            .take_while(|((r, _), _)| *r == role_id)
            .filter_map(|(_, b)| {
                let entry = self.entry(b.permission_id)?;
                Some(BoundPermission {
                    permission_id: b.permission_id,
                    module_key: entry.module.module_key,
                    permission_key: entry.permission.permission_key,
                    permission_name: entry.permission.permission_name,
                    can_grant: b.can_grant,
                    granted_at: b.granted_at,
                })
            })
            .collect()
    }

    fn role_grants(&self, role_id: RoleId, permission_id: PermissionId) -> bool {
        let role_active = self.roles.get(&role_id).is_some_and(|r| r.is_active);
        role_active
            && self.bindings.contains_key(&(role_id, permission_id))
            && self.entry(permission_id).is_some_and(|e| e.is_active())
    }

    fn active_override(
        &self,
        user_id: UserId,
        permission_id: PermissionId,
        now: DateTime<Utc>,
    ) -> Option<PermissionOverride> {
        self.overrides
            .get(&(user_id, permission_id))
            .filter(|o| o.is_active_at(now))
            .cloned()
    }

    fn overrides_for(&self, user_id: UserId) -> impl Iterator<Item = &PermissionOverride> {
        self.overrides
            .range((user_id, PermissionId::nil())..)
            .take_while(move |((u, _), _)| *u == user_id)
            .map(|(_, o)| o)
    }

    /// Fold a committed transaction into the live state.
    ///
    /// Transactions only own roles, bindings, overrides and the audit trail;
    /// identity and catalog rows may have moved on since `begin`, so only the
    /// assignment columns written by the transaction are copied onto them.
    fn apply(&mut self, staged: State, assignments: BTreeMap<UserId, Option<RoleAssignment>>) {
        self.roles = staged.roles;
        self.bindings = staged.bindings;
        self.overrides = staged.overrides;
        self.audit = staged.audit;
        for (user_id, assignment) in assignments {
            if let Some(user) = self.users.get_mut(&user_id) {
                *user = user.with_assignment(assignment);
            }
        }
    }

    fn audit_page(&self, company_id: CompanyId, filter: &AuditFilter, pagination: Pagination) -> AuditPage {
        let mut matching: Vec<&AuditLogEntry> = self
            .audit
            .iter()
            .rev()
            .filter(|e| e.company_id == company_id && filter.matches(e))
            .collect();
        // Stable: equal timestamps keep newest-appended first.
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len();
        let entries = matching
            .into_iter()
            .skip(pagination.offset)
            .take(pagination.limit)
            .cloned()
            .collect();
        AuditPage::new(entries, total, pagination)
    }
}

/// In-memory RBAC store.
///
/// Intended for tests/dev. Transactions are serialized by a writer lock and
/// work on a private copy of the state that is merged back on commit. The
/// seeding helpers below bypass the writer lock and stay visible across
/// concurrent commits.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRbacStore {
    state: Arc<RwLock<State>>,
    writer: Arc<tokio::sync::Mutex<()>>,
}

impl InMemoryRbacStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<R>(&self, f: impl FnOnce(&State) -> R) -> StoreResult<R> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&state))
    }

    fn write<R>(&self, f: impl FnOnce(&mut State) -> R) -> StoreResult<R> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&mut state))
    }

    pub fn insert_owner(&self, owner: OwnerAccount) -> StoreResult<()> {
        self.write(|s| {
            s.owners.insert(owner.id, owner);
        })
    }

    pub fn insert_company(&self, company: Company) -> StoreResult<()> {
        self.write(|s| {
            s.companies.insert(company.id, company);
        })
    }

    pub fn insert_user(&self, user: CompanyUser) -> StoreResult<()> {
        self.write(|s| {
            s.users.insert(user.id, user);
        })
    }

    pub fn set_company_frozen(&self, company_id: CompanyId, frozen: bool) -> StoreResult<()> {
        self.write(|s| {
            if let Some(c) = s.companies.get_mut(&company_id) {
                c.is_frozen = frozen;
            }
        })
    }

    pub fn set_user_active(&self, user_id: UserId, active: bool) -> StoreResult<()> {
        self.write(|s| {
            if let Some(u) = s.users.get_mut(&user_id) {
                u.is_active = active;
            }
        })
    }

    pub fn set_permission_active(&self, permission_id: PermissionId, active: bool) -> StoreResult<()> {
        self.write(|s| {
            if let Some(p) = s.permissions.get_mut(&permission_id) {
                p.is_active = active;
            }
        })
    }

    pub fn seed_catalog(&self, catalog: Vec<CatalogModule>) -> StoreResult<()> {
        self.write(|s| {
            for entry in catalog {
                for permission in entry.permissions {
                    s.permissions.insert(permission.id, permission);
                }
                s.modules.insert(entry.module.id, entry.module);
            }
        })
    }

    pub fn binding_count(&self, role_id: RoleId) -> StoreResult<usize> {
        self.read(|s| s.bound(role_id).len())
    }

    pub fn override_count(&self) -> StoreResult<usize> {
        self.read(|s| s.overrides.len())
    }

    pub fn audit_len(&self) -> StoreResult<usize> {
        self.read(|s| s.audit.len())
    }
}

/// A staged copy of the store; dropped without commit, it vanishes.
pub struct InMemoryTx {
    shared: Arc<RwLock<State>>,
    staged: Mutex<State>,
    assignments: Mutex<BTreeMap<UserId, Option<RoleAssignment>>>,
    _writer: OwnedMutexGuard<()>,
}

impl InMemoryTx {
    fn read<R>(&self, f: impl FnOnce(&State) -> R) -> StoreResult<R> {
        let state = self.staged.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&state))
    }

    fn write<R>(&self, f: impl FnOnce(&mut State) -> StoreResult<R>) -> StoreResult<R> {
        let mut state = self.staged.lock().map_err(|_| StoreError::Poisoned)?;
        f(&mut state)
    }
}

macro_rules! in_memory_reader {
    ($ty:ty) => {
        #[async_trait]
        impl RbacReader for $ty {
            async fn find_owner(&self, owner_id: OwnerId) -> StoreResult<Option<OwnerAccount>> {
                self.read(|s| s.owners.get(&owner_id).cloned())
            }

            async fn find_company(&self, company_id: CompanyId) -> StoreResult<Option<Company>> {
                self.read(|s| s.companies.get(&company_id).cloned())
            }

            async fn find_user(&self, user_id: UserId) -> StoreResult<Option<CompanyUser>> {
                self.read(|s| s.users.get(&user_id).cloned())
            }

            async fn find_module_and_permission_by_keys(
                &self,
                module_key: &str,
                permission_key: &str,
            ) -> StoreResult<Option<CatalogEntry>> {
                self.read(|s| s.entry_by_keys(module_key, permission_key))
            }

            async fn find_permission(&self, permission_id: PermissionId) -> StoreResult<Option<CatalogEntry>> {
                self.read(|s| s.entry(permission_id))
            }

            async fn list_catalog(&self) -> StoreResult<Vec<CatalogModule>> {
                self.read(State::catalog)
            }

            async fn find_role(&self, company_id: CompanyId, role_id: RoleId) -> StoreResult<Option<Role>> {
                self.read(|s| s.role_in(company_id, role_id).cloned())
            }

            async fn find_role_by_key(&self, company_id: CompanyId, role_key: &str) -> StoreResult<Option<Role>> {
                self.read(|s| {
                    s.roles
                        .values()
                        .find(|r| r.company_id == company_id && r.role_key == role_key)
                        .cloned()
                })
            }

            async fn list_roles(&self, company_id: CompanyId) -> StoreResult<Vec<Role>> {
                self.read(|s| {
                    let mut roles: Vec<Role> = s
                        .roles
                        .values()
                        .filter(|r| r.company_id == company_id)
                        .cloned()
                        .collect();
                    roles.sort_by(|a, b| {
                        a.hierarchy_level
                            .cmp(&b.hierarchy_level)
                            .then_with(|| a.role_name.cmp(&b.role_name))
                    });
                    roles
                })
            }

            async fn find_bindings_for_role(&self, role_id: RoleId) -> StoreResult<Vec<BoundPermission>> {
                self.read(|s| s.bound(role_id))
            }

            async fn find_binding(
                &self,
                role_id: RoleId,
                permission_id: PermissionId,
            ) -> StoreResult<Option<RolePermission>> {
                self.read(|s| s.bindings.get(&(role_id, permission_id)).cloned())
            }

            async fn role_has_binding(&self, role_id: RoleId, permission_id: PermissionId) -> StoreResult<bool> {
                self.read(|s| s.role_grants(role_id, permission_id))
            }

            async fn count_users_with_role(&self, role_id: RoleId) -> StoreResult<u64> {
                self.read(|s| {
                    s.users
                        .values()
                        .filter(|u| u.assigned_role_id == Some(role_id))
                        .count() as u64
                })
            }

            async fn find_active_override(
                &self,
                user_id: UserId,
                permission_id: PermissionId,
                now: DateTime<Utc>,
            ) -> StoreResult<Option<PermissionOverride>> {
                self.read(|s| s.active_override(user_id, permission_id, now))
            }

            async fn list_overrides_for_user(&self, user_id: UserId) -> StoreResult<Vec<PermissionOverride>> {
                self.read(|s| s.overrides_for(user_id).cloned().collect())
            }

            async fn role_permission_keys(&self, role_id: RoleId) -> StoreResult<Vec<PermissionRef>> {
                self.read(|s| {
                    s.bound(role_id)
                        .into_iter()
                        .filter(|b| s.role_grants(role_id, b.permission_id))
                        .map(|b| b.reference())
                        .collect()
                })
            }

            async fn active_override_keys(
                &self,
                user_id: UserId,
                now: DateTime<Utc>,
            ) -> StoreResult<Vec<PermissionRef>> {
                self.read(|s| {
                    s.overrides_for(user_id)
                        .filter(|o| o.is_active_at(now))
                        .filter_map(|o| s.entry(o.permission_id))
                        .map(|e| e.reference())
                        .collect()
                })
            }

            async fn query_audit_entries(
                &self,
                company_id: CompanyId,
                filter: &AuditFilter,
                pagination: Pagination,
            ) -> StoreResult<AuditPage> {
                self.read(|s| s.audit_page(company_id, filter, pagination))
            }
        }
    };
}

in_memory_reader!(InMemoryRbacStore);
in_memory_reader!(InMemoryTx);

#[async_trait]
impl RbacTx for InMemoryTx {
    async fn insert_role(&self, role: &Role) -> StoreResult<()> {
        self.write(|s| {
            let taken = s
                .roles
                .values()
                .any(|r| r.company_id == role.company_id && r.role_key == role.role_key);
            if taken {
                return Err(StoreError::UniqueViolation(ROLE_KEY_CONSTRAINT.to_string()));
            }
            s.roles.insert(role.id, role.clone());
            Ok(())
        })
    }

    async fn update_role(&self, role: &Role) -> StoreResult<()> {
        self.write(|s| match s.roles.get_mut(&role.id) {
            Some(existing) if existing.company_id == role.company_id => {
                *existing = role.clone();
                Ok(())
            }
            _ => Err(StoreError::Database(format!("role {} does not exist", role.id))),
        })
    }

    async fn delete_role(&self, company_id: CompanyId, role_id: RoleId) -> StoreResult<bool> {
        self.write(|s| {
            if s.role_in(company_id, role_id).is_none() {
                return Ok(false);
            }
            s.roles.remove(&role_id);
            s.bindings.retain(|(r, _), _| *r != role_id);
            for role in s.roles.values_mut() {
                if role.parent_role_id == Some(role_id) {
                    role.parent_role_id = None;
                }
            }
            Ok(true)
        })
    }

    async fn insert_binding(&self, binding: &RolePermission) -> StoreResult<bool> {
        self.write(|s| {
            let key = (binding.role_id, binding.permission_id);
            if s.bindings.contains_key(&key) {
                return Ok(false);
            }
            s.bindings.insert(key, binding.clone());
            Ok(true)
        })
    }

    async fn delete_bindings(&self, role_id: RoleId, permission_ids: &[PermissionId]) -> StoreResult<u64> {
        self.write(|s| {
            let removed = permission_ids
                .iter()
                .filter(|p| s.bindings.remove(&(role_id, **p)).is_some())
                .count();
            Ok(removed as u64)
        })
    }

    async fn delete_all_bindings(&self, role_id: RoleId) -> StoreResult<u64> {
        self.write(|s| {
            let before = s.bindings.len();
            s.bindings.retain(|(r, _), _| *r != role_id);
            Ok((before - s.bindings.len()) as u64)
        })
    }

    async fn upsert_override(&self, entry: &PermissionOverride) -> StoreResult<()> {
        self.write(|s| {
            s.overrides
                .insert((entry.user_id, entry.permission_id), entry.clone());
            Ok(())
        })
    }

    async fn delete_override(&self, user_id: UserId, permission_id: PermissionId) -> StoreResult<bool> {
        self.write(|s| Ok(s.overrides.remove(&(user_id, permission_id)).is_some()))
    }

    async fn update_user_role_assignment(
        &self,
        user_id: UserId,
        assignment: Option<RoleAssignment>,
    ) -> StoreResult<()> {
        self.write(|s| {
            let user = s
                .users
                .get_mut(&user_id)
                .ok_or_else(|| StoreError::Database(format!("user {user_id} does not exist")))?;
            *user = user.with_assignment(assignment);
            Ok(())
        })?;
        self.assignments
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .insert(user_id, assignment);
        Ok(())
    }

    async fn append_audit_entry(&self, entry: &AuditLogEntry) -> StoreResult<()> {
        self.write(|s| {
            s.audit.push(entry.clone());
            Ok(())
        })
    }

    async fn commit(self) -> StoreResult<()> {
        let staged = self.staged.into_inner().map_err(|_| StoreError::Poisoned)?;
        let assignments = self.assignments.into_inner().map_err(|_| StoreError::Poisoned)?;
        let mut shared = self.shared.write().map_err(|_| StoreError::Poisoned)?;
        shared.apply(staged, assignments);
        Ok(())
    }
}

#[async_trait]
impl RbacStore for InMemoryRbacStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> StoreResult<InMemoryTx> {
        let writer = self.writer.clone().lock_owned().await;
        let staged = self.read(State::clone)?;
        Ok(InMemoryTx {
            shared: self.state.clone(),
            staged: Mutex::new(staged),
            assignments: Mutex::new(BTreeMap::new()),
            _writer: writer,
        })
    }

    async fn purge_expired_overrides(&self, now: DateTime<Utc>, company_id: Option<CompanyId>) -> StoreResult<u64> {
        let _writer = self.writer.lock().await;
        self.write(|s| {
            let in_scope = |user_id: &UserId| match company_id {
                None => true,
                Some(company_id) => s.users.get(user_id).is_some_and(|u| u.company_id == company_id),
            };
            let expired: Vec<(UserId, PermissionId)> = s
                .overrides
                .iter()
                .filter(|(_, o)| o.expires_at.is_some_and(|at| at <= now))
                .filter(|((user_id, _), _)| in_scope(user_id))
                .map(|(key, _)| *key)
                .collect();
            for key in &expired {
                s.overrides.remove(key);
            }
            expired.len() as u64
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizhub_auth::{Actor, NewAuditEntry, AuditAction, default_catalog};
    use chrono::Duration;
    use uuid::Uuid;

    fn role(company_id: CompanyId, key: &str) -> Role {
        let now = Utc::now();
        Role {
            id: RoleId::new(),
            company_id,
            role_key: key.to_string(),
            role_name: key.to_string(),
            description: None,
            parent_role_id: None,
            hierarchy_level: 0,
            is_system_role: false,
            is_active: true,
            created_by: Actor::Owner(OwnerId::new()),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryRbacStore::new();
        let company_id = CompanyId::new();
        let r = role(company_id, "manager");

        {
            let tx = store.begin().await.unwrap();
            tx.insert_role(&r).await.unwrap();
            assert!(tx.find_role(company_id, r.id).await.unwrap().is_some());
        }

        assert!(store.find_role(company_id, r.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = InMemoryRbacStore::new();
        let company_id = CompanyId::new();
        let r = role(company_id, "manager");

        let tx = store.begin().await.unwrap();
        tx.insert_role(&r).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.find_role(company_id, r.id).await.unwrap(), Some(r));
    }

    #[tokio::test]
    async fn commit_keeps_identity_writes_made_while_open() {
        let store = InMemoryRbacStore::new();
        let company_id = CompanyId::new();
        let user_id = UserId::new();
        let r = role(company_id, "manager");
        store
            .insert_company(Company {
                id: company_id,
                owner_id: OwnerId::new(),
                name: "Acme".to_string(),
                is_active: true,
                is_frozen: false,
            })
            .unwrap();
        store
            .insert_user(CompanyUser {
                id: user_id,
                company_id,
                email: "clerk@example.com".to_string(),
                assigned_role_id: None,
                role_assigned_at: None,
                role_assigned_by: None,
                is_active: true,
            })
            .unwrap();

        let tx = store.begin().await.unwrap();
        tx.insert_role(&r).await.unwrap();
        let assignment = RoleAssignment {
            role_id: r.id,
            assigned_at: Utc::now(),
            assigned_by: r.created_by,
        };
        tx.update_user_role_assignment(user_id, Some(assignment)).await.unwrap();

        let late_company = CompanyId::new();
        store
            .insert_company(Company {
                id: late_company,
                owner_id: OwnerId::new(),
                name: "Globex".to_string(),
                is_active: true,
                is_frozen: false,
            })
            .unwrap();
        store.set_company_frozen(company_id, true).unwrap();
        store.set_user_active(user_id, false).unwrap();
        tx.commit().await.unwrap();

        assert!(store.find_company(late_company).await.unwrap().is_some());
        assert!(store.find_company(company_id).await.unwrap().unwrap().is_frozen);
        let user = store.find_user(user_id).await.unwrap().unwrap();
        assert!(!user.is_active);
        assert_eq!(user.assignment(), Some(assignment));
        assert!(store.find_role(company_id, r.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn role_key_is_unique_per_company() {
        let store = InMemoryRbacStore::new();
        let company_id = CompanyId::new();

        let tx = store.begin().await.unwrap();
        tx.insert_role(&role(company_id, "manager")).await.unwrap();
        let err = tx.insert_role(&role(company_id, "manager")).await.unwrap_err();
        assert_eq!(err, StoreError::UniqueViolation(ROLE_KEY_CONSTRAINT.to_string()));

        tx.insert_role(&role(CompanyId::new(), "manager")).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_binding_is_reported_not_inserted() {
        let store = InMemoryRbacStore::new();
        store.seed_catalog(default_catalog()).unwrap();
        let entry = store
            .find_module_and_permission_by_keys("orders", "view_all_orders")
            .await
            .unwrap()
            .unwrap();
        let company_id = CompanyId::new();
        let r = role(company_id, "manager");

        let binding = RolePermission {
            role_id: r.id,
            permission_id: entry.permission.id,
            can_grant: false,
            granted_by: r.created_by,
            granted_at: Utc::now(),
        };

        let tx = store.begin().await.unwrap();
        tx.insert_role(&r).await.unwrap();
        assert!(tx.insert_binding(&binding).await.unwrap());
        assert!(!tx.insert_binding(&binding).await.unwrap());
        tx.commit().await.unwrap();

        assert_eq!(store.binding_count(r.id).unwrap(), 1);
        assert!(store.role_has_binding(r.id, entry.permission.id).await.unwrap());

        store.set_permission_active(entry.permission.id, false).unwrap();
        assert!(!store.role_has_binding(r.id, entry.permission.id).await.unwrap());
        assert!(store.role_permission_keys(r.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn purge_only_removes_expired_overrides() {
        let store = InMemoryRbacStore::new();
        let now = Utc::now();
        let user_id = UserId::new();
        let make = |expires_at| PermissionOverride {
            user_id,
            permission_id: PermissionId::new(),
            is_granted: true,
            expires_at,
            override_reason: None,
            overridden_by: Actor::Owner(OwnerId::new()),
            created_at: now,
        };

        let tx = store.begin().await.unwrap();
        tx.upsert_override(&make(None)).await.unwrap();
        tx.upsert_override(&make(Some(now - Duration::minutes(1)))).await.unwrap();
        tx.upsert_override(&make(Some(now + Duration::minutes(1)))).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.purge_expired_overrides(now, None).await.unwrap(), 1);
        assert_eq!(store.override_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn audit_is_newest_first_and_company_scoped() {
        let store = InMemoryRbacStore::new();
        let company_id = CompanyId::new();
        let actor = Actor::Owner(OwnerId::new());
        let now = Utc::now();

        let tx = store.begin().await.unwrap();
        for (i, action) in [AuditAction::RoleCreated, AuditAction::RoleUpdated, AuditAction::RoleDeleted]
            .into_iter()
            .enumerate()
        {
            let entry = NewAuditEntry::new(company_id, action, actor)
                .recorded(Uuid::now_v7(), now + Duration::seconds(i as i64));
            tx.append_audit_entry(&entry).await.unwrap();
        }
        let other = NewAuditEntry::new(CompanyId::new(), AuditAction::RoleCreated, actor)
            .recorded(Uuid::now_v7(), now);
        tx.append_audit_entry(&other).await.unwrap();
        tx.commit().await.unwrap();

        let page = store
            .query_audit_entries(company_id, &AuditFilter::default(), Pagination::new(2, 0))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert!(page.has_more);
        assert_eq!(page.entries[0].action, AuditAction::RoleDeleted);
        assert_eq!(page.entries[1].action, AuditAction::RoleUpdated);
    }
}
