//! Persistence contracts for the RBAC engine.
//!
//! The engine consumes storage only through these traits. Reads happen
//! either directly on the store or inside a transaction; every mutation
//! happens inside a transaction so a role/binding change and its audit
//! entry become visible together or not at all. Dropping a transaction
//! without calling [`RbacTx::commit`] rolls it back.

mod in_memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use bizhub_auth::{
    AuditFilter, AuditLogEntry, AuditPage, BoundPermission, CatalogEntry, CatalogModule, Company,
    CompanyUser, OwnerAccount, Pagination, PermissionOverride, PermissionRef, RbacError, Role,
    RoleAssignment, RolePermission,
};
use bizhub_core::{CompanyId, OwnerId, PermissionId, RoleId, UserId};

pub use in_memory::{InMemoryRbacStore, InMemoryTx};
pub use postgres::{PostgresRbacStore, PostgresTx};

/// Name of the uniqueness constraint on `(company_id, role_key)`.
pub const ROLE_KEY_CONSTRAINT: &str = "roles_company_key_unique";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write; carries the constraint name.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("database error: {0}")]
    Database(String),

    /// A stored row could not be mapped back into a domain record.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Collapse a backing-store failure to the generic check error, logging the detail.
impl From<StoreError> for RbacError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "rbac store operation failed");
        RbacError::PermissionCheck
    }
}

#[async_trait]
pub trait RbacReader: Send + Sync {
    async fn find_owner(&self, owner_id: OwnerId) -> StoreResult<Option<OwnerAccount>>;

    async fn find_company(&self, company_id: CompanyId) -> StoreResult<Option<Company>>;

    async fn find_user(&self, user_id: UserId) -> StoreResult<Option<CompanyUser>>;

    /// Catalog lookup by stable keys, regardless of active flags.
    async fn find_module_and_permission_by_keys(
        &self,
        module_key: &str,
        permission_key: &str,
    ) -> StoreResult<Option<CatalogEntry>>;

    async fn find_permission(&self, permission_id: PermissionId) -> StoreResult<Option<CatalogEntry>>;

    /// Every module with its permissions, ordered by `sort_order`.
    async fn list_catalog(&self) -> StoreResult<Vec<CatalogModule>>;

    async fn find_role(&self, company_id: CompanyId, role_id: RoleId) -> StoreResult<Option<Role>>;

    async fn find_role_by_key(&self, company_id: CompanyId, role_key: &str) -> StoreResult<Option<Role>>;

    async fn list_roles(&self, company_id: CompanyId) -> StoreResult<Vec<Role>>;

    async fn find_bindings_for_role(&self, role_id: RoleId) -> StoreResult<Vec<BoundPermission>>;

    async fn find_binding(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> StoreResult<Option<RolePermission>>;

    /// True when the role is active, the permission and its module are
    /// active, and a binding row exists for the pair.
    async fn role_has_binding(&self, role_id: RoleId, permission_id: PermissionId) -> StoreResult<bool>;

    async fn count_users_with_role(&self, role_id: RoleId) -> StoreResult<u64>;

    /// The override for the pair if it is granted and unexpired at `now`.
    async fn find_active_override(
        &self,
        user_id: UserId,
        permission_id: PermissionId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PermissionOverride>>;

    async fn list_overrides_for_user(&self, user_id: UserId) -> StoreResult<Vec<PermissionOverride>>;

    /// Keys granted through the role, under the same rules as [`Self::role_has_binding`].
    async fn role_permission_keys(&self, role_id: RoleId) -> StoreResult<Vec<PermissionRef>>;

    /// Keys granted through overrides active at `now`.
    async fn active_override_keys(&self, user_id: UserId, now: DateTime<Utc>) -> StoreResult<Vec<PermissionRef>>;

    /// Newest first.
    async fn query_audit_entries(
        &self,
        company_id: CompanyId,
        filter: &AuditFilter,
        pagination: Pagination,
    ) -> StoreResult<AuditPage>;
}

#[async_trait]
pub trait RbacTx: RbacReader {
    /// Fails with [`StoreError::UniqueViolation`] on a duplicate `(company_id, role_key)`.
    async fn insert_role(&self, role: &Role) -> StoreResult<()>;

    async fn update_role(&self, role: &Role) -> StoreResult<()>;

    /// Children pointing at the deleted role lose their parent link.
    async fn delete_role(&self, company_id: CompanyId, role_id: RoleId) -> StoreResult<bool>;

    /// Returns `false` when the pair was already bound.
    async fn insert_binding(&self, binding: &RolePermission) -> StoreResult<bool>;

    async fn delete_bindings(&self, role_id: RoleId, permission_ids: &[PermissionId]) -> StoreResult<u64>;

    async fn delete_all_bindings(&self, role_id: RoleId) -> StoreResult<u64>;

    async fn upsert_override(&self, entry: &PermissionOverride) -> StoreResult<()>;

    async fn delete_override(&self, user_id: UserId, permission_id: PermissionId) -> StoreResult<bool>;

    async fn update_user_role_assignment(
        &self,
        user_id: UserId,
        assignment: Option<RoleAssignment>,
    ) -> StoreResult<()>;

    async fn append_audit_entry(&self, entry: &AuditLogEntry) -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>
    where
        Self: Sized;
}

#[async_trait]
pub trait RbacStore: RbacReader + 'static {
    type Tx: RbacTx;

    async fn begin(&self) -> StoreResult<Self::Tx>;

    /// Maintenance sweep; the resolver never depends on it having run.
    ///
    /// `company_id` limits the sweep to that company's users; `None` sweeps
    /// every company.
    async fn purge_expired_overrides(&self, now: DateTime<Utc>, company_id: Option<CompanyId>) -> StoreResult<u64>;
}
