//! Postgres-backed RBAC store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `UniqueViolation(constraint)` |
//! | Database (other) | Any other | `Database` |
//! | Other | N/A | `Database` |
//!
//! Row-mapping failures (unknown actor kinds, unknown audit actions) surface
//! as `Corrupt`.
//!
//! ## Company Isolation
//!
//! Role queries always carry `company_id` in the WHERE clause. Bindings,
//! overrides and assignments are reached through a role or user the caller
//! has already resolved inside its company.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{Span, instrument};
use uuid::Uuid;

use bizhub_auth::{
    Actor, AuditAction, AuditFilter, AuditLogEntry, AuditPage, BoundPermission, CatalogEntry,
    CatalogModule, Company, CompanyUser, Module, OwnerAccount, Pagination, Permission,
    PermissionOverride, PermissionRef, Role, RoleAssignment, RolePermission,
};
use bizhub_core::{CompanyId, ModuleId, OwnerId, PermissionId, RoleId, UserId};

use super::{RbacReader, RbacStore, RbacTx, StoreError, StoreResult};

const SCHEMA: &str = include_str!("../../migrations/0001_rbac.sql");

/// Postgres RBAC store.
///
/// Uniqueness of `(company_id, role_key)`, `(role_id, permission_id)` and
/// `(user_id, permission_id)` is enforced by the schema, so concurrent
/// writers race on constraints rather than on pre-checks.
#[derive(Debug, Clone)]
pub struct PostgresRbacStore {
    pool: Arc<PgPool>,
}

impl PostgresRbacStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the schema. Idempotent.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    /// Insert catalog rows that are not present yet, matched by key.
    #[instrument(skip(self, catalog), fields(modules = catalog.len()), err)]
    pub async fn seed_catalog(&self, catalog: &[CatalogModule]) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for entry in catalog {
            let m = &entry.module;
            let module_id: Uuid = sqlx::query_scalar(
                r#"
                INSERT INTO modules (id, module_key, module_name, module_group, sort_order, is_active)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (module_key) DO UPDATE SET module_key = EXCLUDED.module_key
                RETURNING id
                "#,
            )
            .bind(*m.id.as_uuid())
            .bind(&m.module_key)
            .bind(&m.module_name)
            .bind(&m.module_group)
            .bind(m.sort_order)
            .bind(m.is_active)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("seed_module", e))?;

            for p in &entry.permissions {
                sqlx::query(
                    r#"
                    INSERT INTO permissions (id, module_id, permission_key, permission_name, description, is_active)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ON CONFLICT (module_id, permission_key) DO NOTHING
                    "#,
                )
                .bind(*p.id.as_uuid())
                .bind(module_id)
                .bind(&p.permission_key)
                .bind(&p.permission_name)
                .bind(&p.description)
                .bind(p.is_active)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("seed_permission", e))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn connection(&self) -> StoreResult<PoolConnection<Postgres>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))
    }
}

/// An open Postgres transaction. Dropping it without commit rolls back.
pub struct PostgresTx {
    tx: Mutex<Transaction<'static, Postgres>>,
}

impl PostgresTx {
    async fn connection(&self) -> StoreResult<MutexGuard<'_, Transaction<'static, Postgres>>> {
        Ok(self.tx.lock().await)
    }
}

macro_rules! pg_reader {
    ($ty:ty) => {
        #[async_trait]
        impl RbacReader for $ty {
            async fn find_owner(&self, owner_id: OwnerId) -> StoreResult<Option<OwnerAccount>> {
                let mut conn = self.connection().await?;
                queries::find_owner(&mut conn, owner_id).await
            }

            async fn find_company(&self, company_id: CompanyId) -> StoreResult<Option<Company>> {
                let mut conn = self.connection().await?;
                queries::find_company(&mut conn, company_id).await
            }

            async fn find_user(&self, user_id: UserId) -> StoreResult<Option<CompanyUser>> {
                let mut conn = self.connection().await?;
                queries::find_user(&mut conn, user_id).await
            }

            async fn find_module_and_permission_by_keys(
                &self,
                module_key: &str,
                permission_key: &str,
            ) -> StoreResult<Option<CatalogEntry>> {
                let mut conn = self.connection().await?;
                queries::entry_by_keys(&mut conn, module_key, permission_key).await
            }

            async fn find_permission(&self, permission_id: PermissionId) -> StoreResult<Option<CatalogEntry>> {
                let mut conn = self.connection().await?;
                queries::entry_by_id(&mut conn, permission_id).await
            }

            async fn list_catalog(&self) -> StoreResult<Vec<CatalogModule>> {
                let mut conn = self.connection().await?;
                queries::list_catalog(&mut conn).await
            }

            async fn find_role(&self, company_id: CompanyId, role_id: RoleId) -> StoreResult<Option<Role>> {
                let mut conn = self.connection().await?;
                queries::find_role(&mut conn, company_id, role_id).await
            }

            async fn find_role_by_key(&self, company_id: CompanyId, role_key: &str) -> StoreResult<Option<Role>> {
                let mut conn = self.connection().await?;
                queries::find_role_by_key(&mut conn, company_id, role_key).await
            }

            async fn list_roles(&self, company_id: CompanyId) -> StoreResult<Vec<Role>> {
                let mut conn = self.connection().await?;
                queries::list_roles(&mut conn, company_id).await
            }

            async fn find_bindings_for_role(&self, role_id: RoleId) -> StoreResult<Vec<BoundPermission>> {
                let mut conn = self.connection().await?;
                queries::bindings_for_role(&mut conn, role_id).await
            }

            async fn find_binding(
                &self,
                role_id: RoleId,
                permission_id: PermissionId,
            ) -> StoreResult<Option<RolePermission>> {
                let mut conn = self.connection().await?;
                queries::find_binding(&mut conn, role_id, permission_id).await
            }

            async fn role_has_binding(&self, role_id: RoleId, permission_id: PermissionId) -> StoreResult<bool> {
                let mut conn = self.connection().await?;
                queries::role_has_binding(&mut conn, role_id, permission_id).await
            }

            async fn count_users_with_role(&self, role_id: RoleId) -> StoreResult<u64> {
                let mut conn = self.connection().await?;
                queries::count_users_with_role(&mut conn, role_id).await
            }

            async fn find_active_override(
                &self,
                user_id: UserId,
                permission_id: PermissionId,
                now: DateTime<Utc>,
            ) -> StoreResult<Option<PermissionOverride>> {
                let mut conn = self.connection().await?;
                queries::find_active_override(&mut conn, user_id, permission_id, now).await
            }

            async fn list_overrides_for_user(&self, user_id: UserId) -> StoreResult<Vec<PermissionOverride>> {
                let mut conn = self.connection().await?;
                queries::overrides_for_user(&mut conn, user_id).await
            }

            async fn role_permission_keys(&self, role_id: RoleId) -> StoreResult<Vec<PermissionRef>> {
                let mut conn = self.connection().await?;
                queries::role_permission_keys(&mut conn, role_id).await
            }

            async fn active_override_keys(
                &self,
                user_id: UserId,
                now: DateTime<Utc>,
            ) -> StoreResult<Vec<PermissionRef>> {
                let mut conn = self.connection().await?;
                queries::active_override_keys(&mut conn, user_id, now).await
            }

            async fn query_audit_entries(
                &self,
                company_id: CompanyId,
                filter: &AuditFilter,
                pagination: Pagination,
            ) -> StoreResult<AuditPage> {
                let mut conn = self.connection().await?;
                queries::query_audit(&mut conn, company_id, filter, pagination).await
            }
        }
    };
}

pg_reader!(PostgresRbacStore);
pg_reader!(PostgresTx);

#[async_trait]
impl RbacTx for PostgresTx {
    #[instrument(skip(self, role), fields(company_id = %role.company_id, role_key = %role.role_key), err)]
    async fn insert_role(&self, role: &Role) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        sqlx::query(
            r#"
            INSERT INTO roles (
                id, company_id, role_key, role_name, description, parent_role_id,
                hierarchy_level, is_system_role, is_active,
                created_by_kind, created_by_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(*role.id.as_uuid())
        .bind(*role.company_id.as_uuid())
        .bind(&role.role_key)
        .bind(&role.role_name)
        .bind(&role.description)
        .bind(role.parent_role_id.map(|p| *p.as_uuid()))
        .bind(role.hierarchy_level)
        .bind(role.is_system_role)
        .bind(role.is_active)
        .bind(role.created_by.kind().as_str())
        .bind(role.created_by.as_uuid())
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&mut **conn)
        .await
        .map_err(|e| map_sqlx_error("insert_role", e))?;
        Ok(())
    }

    #[instrument(skip(self, role), fields(role_id = %role.id), err)]
    async fn update_role(&self, role: &Role) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        sqlx::query(
            r#"
            UPDATE roles
            SET role_name = $3,
                description = $4,
                parent_role_id = $5,
                hierarchy_level = $6,
                is_active = $7,
                updated_at = $8
            WHERE id = $1 AND company_id = $2
            "#,
        )
        .bind(*role.id.as_uuid())
        .bind(*role.company_id.as_uuid())
        .bind(&role.role_name)
        .bind(&role.description)
        .bind(role.parent_role_id.map(|p| *p.as_uuid()))
        .bind(role.hierarchy_level)
        .bind(role.is_active)
        .bind(role.updated_at)
        .execute(&mut **conn)
        .await
        .map_err(|e| map_sqlx_error("update_role", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(company_id = %company_id, role_id = %role_id), err)]
    async fn delete_role(&self, company_id: CompanyId, role_id: RoleId) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let result = sqlx::query("DELETE FROM roles WHERE id = $1 AND company_id = $2")
            .bind(*role_id.as_uuid())
            .bind(*company_id.as_uuid())
            .execute(&mut **conn)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, binding), fields(role_id = %binding.role_id, permission_id = %binding.permission_id), err)]
    async fn insert_binding(&self, binding: &RolePermission) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id, can_grant, granted_by_kind, granted_by_id, granted_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (role_id, permission_id) DO NOTHING
            "#,
        )
        .bind(*binding.role_id.as_uuid())
        .bind(*binding.permission_id.as_uuid())
        .bind(binding.can_grant)
        .bind(binding.granted_by.kind().as_str())
        .bind(binding.granted_by.as_uuid())
        .bind(binding.granted_at)
        .execute(&mut **conn)
        .await
        .map_err(|e| map_sqlx_error("insert_binding", e))?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self, permission_ids), fields(role_id = %role_id, requested = permission_ids.len()), err)]
    async fn delete_bindings(&self, role_id: RoleId, permission_ids: &[PermissionId]) -> StoreResult<u64> {
        let ids: Vec<Uuid> = permission_ids.iter().map(|p| *p.as_uuid()).collect();
        let mut conn = self.connection().await?;
        let result = sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = ANY($2)")
            .bind(*role_id.as_uuid())
            .bind(ids)
            .execute(&mut **conn)
            .await
            .map_err(|e| map_sqlx_error("delete_bindings", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(role_id = %role_id), err)]
    async fn delete_all_bindings(&self, role_id: RoleId) -> StoreResult<u64> {
        let mut conn = self.connection().await?;
        let result = sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(*role_id.as_uuid())
            .execute(&mut **conn)
            .await
            .map_err(|e| map_sqlx_error("delete_all_bindings", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, entry), fields(user_id = %entry.user_id, permission_id = %entry.permission_id), err)]
    async fn upsert_override(&self, entry: &PermissionOverride) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        sqlx::query(
            r#"
            INSERT INTO permission_overrides (
                user_id, permission_id, is_granted, expires_at, override_reason,
                overridden_by_kind, overridden_by_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, permission_id) DO UPDATE
            SET is_granted = EXCLUDED.is_granted,
                expires_at = EXCLUDED.expires_at,
                override_reason = EXCLUDED.override_reason,
                overridden_by_kind = EXCLUDED.overridden_by_kind,
                overridden_by_id = EXCLUDED.overridden_by_id,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(*entry.user_id.as_uuid())
        .bind(*entry.permission_id.as_uuid())
        .bind(entry.is_granted)
        .bind(entry.expires_at)
        .bind(&entry.override_reason)
        .bind(entry.overridden_by.kind().as_str())
        .bind(entry.overridden_by.as_uuid())
        .bind(entry.created_at)
        .execute(&mut **conn)
        .await
        .map_err(|e| map_sqlx_error("upsert_override", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id, permission_id = %permission_id), err)]
    async fn delete_override(&self, user_id: UserId, permission_id: PermissionId) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let result = sqlx::query("DELETE FROM permission_overrides WHERE user_id = $1 AND permission_id = $2")
            .bind(*user_id.as_uuid())
            .bind(*permission_id.as_uuid())
            .execute(&mut **conn)
            .await
            .map_err(|e| map_sqlx_error("delete_override", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, assignment), fields(user_id = %user_id), err)]
    async fn update_user_role_assignment(
        &self,
        user_id: UserId,
        assignment: Option<RoleAssignment>,
    ) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        sqlx::query(
            r#"
            UPDATE company_users
            SET assigned_role_id = $2,
                role_assigned_at = $3,
                role_assigned_by_kind = $4,
                role_assigned_by_id = $5
            WHERE id = $1
            "#,
        )
        .bind(*user_id.as_uuid())
        .bind(assignment.map(|a| *a.role_id.as_uuid()))
        .bind(assignment.map(|a| a.assigned_at))
        .bind(assignment.map(|a| a.assigned_by.kind().as_str()))
        .bind(assignment.map(|a| a.assigned_by.as_uuid()))
        .execute(&mut **conn)
        .await
        .map_err(|e| map_sqlx_error("update_user_role_assignment", e))?;
        Ok(())
    }

    #[instrument(skip(self, entry), fields(company_id = %entry.company_id, action = %entry.action), err)]
    async fn append_audit_entry(&self, entry: &AuditLogEntry) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        sqlx::query(
            r#"
            INSERT INTO rbac_audit_log (
                id, company_id, action_type, performed_by_kind, performed_by_id,
                target_role_id, target_user_id, old_value, new_value, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id)
        .bind(*entry.company_id.as_uuid())
        .bind(entry.action.as_str())
        .bind(entry.performed_by.kind().as_str())
        .bind(entry.performed_by.as_uuid())
        .bind(entry.target_role_id.map(|r| *r.as_uuid()))
        .bind(entry.target_user_id.map(|u| *u.as_uuid()))
        .bind(&entry.old_value)
        .bind(&entry.new_value)
        .bind(entry.created_at)
        .execute(&mut **conn)
        .await
        .map_err(|e| map_sqlx_error("append_audit_entry", e))?;
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx
            .into_inner()
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

#[async_trait]
impl RbacStore for PostgresRbacStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> StoreResult<PostgresTx> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresTx { tx: Mutex::new(tx) })
    }

    #[instrument(skip(self), fields(purged = tracing::field::Empty), err)]
    async fn purge_expired_overrides(&self, now: DateTime<Utc>, company_id: Option<CompanyId>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM permission_overrides o
            WHERE o.expires_at IS NOT NULL
              AND o.expires_at <= $1
              AND ($2::uuid IS NULL OR EXISTS (
                  SELECT 1 FROM company_users u WHERE u.id = o.user_id AND u.company_id = $2
              ))
            "#,
        )
        .bind(now)
        .bind(company_id.map(Uuid::from))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("purge_expired_overrides", e))?;

        Span::current().record("purged", result.rows_affected());
        Ok(result.rows_affected())
    }
}

mod queries {
    use super::*;

    pub(super) async fn find_owner(conn: &mut PgConnection, owner_id: OwnerId) -> StoreResult<Option<OwnerAccount>> {
        let row = sqlx::query("SELECT id, email, is_active FROM owners WHERE id = $1")
            .bind(*owner_id.as_uuid())
            .fetch_optional(conn)
            .await
            .map_err(|e| map_sqlx_error("find_owner", e))?;

        row.map(|r| {
            Ok(OwnerAccount {
                id: OwnerId::from_uuid(get(&r, "id")?),
                email: get(&r, "email")?,
                is_active: get(&r, "is_active")?,
            })
        })
        .transpose()
    }

    pub(super) async fn find_company(conn: &mut PgConnection, company_id: CompanyId) -> StoreResult<Option<Company>> {
        let row = sqlx::query("SELECT id, owner_id, name, is_active, is_frozen FROM companies WHERE id = $1")
            .bind(*company_id.as_uuid())
            .fetch_optional(conn)
            .await
            .map_err(|e| map_sqlx_error("find_company", e))?;

        row.map(|r| {
            Ok(Company {
                id: CompanyId::from_uuid(get(&r, "id")?),
                owner_id: OwnerId::from_uuid(get(&r, "owner_id")?),
                name: get(&r, "name")?,
                is_active: get(&r, "is_active")?,
                is_frozen: get(&r, "is_frozen")?,
            })
        })
        .transpose()
    }

    pub(super) async fn find_user(conn: &mut PgConnection, user_id: UserId) -> StoreResult<Option<CompanyUser>> {
        let row = sqlx::query(
            r#"
            SELECT id, company_id, email, assigned_role_id, role_assigned_at,
                   role_assigned_by_kind, role_assigned_by_id, is_active
            FROM company_users
            WHERE id = $1
            "#,
        )
        .bind(*user_id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("find_user", e))?;

        row.map(|r| {
            let assigned_by = match (
                get::<Option<String>>(&r, "role_assigned_by_kind")?,
                get::<Option<Uuid>>(&r, "role_assigned_by_id")?,
            ) {
                (Some(kind), Some(id)) => Some(actor_from_parts(&kind, id)?),
                _ => None,
            };
            Ok(CompanyUser {
                id: UserId::from_uuid(get(&r, "id")?),
                company_id: CompanyId::from_uuid(get(&r, "company_id")?),
                email: get(&r, "email")?,
                assigned_role_id: get::<Option<Uuid>>(&r, "assigned_role_id")?.map(RoleId::from_uuid),
                role_assigned_at: get(&r, "role_assigned_at")?,
                role_assigned_by: assigned_by,
                is_active: get(&r, "is_active")?,
            })
        })
        .transpose()
    }

    const ENTRY_COLUMNS: &str = r#"
        m.id AS module_id, m.module_key, m.module_name, m.module_group, m.sort_order,
        m.is_active AS module_active,
        p.id AS permission_id, p.permission_key, p.permission_name, p.description,
        p.is_active AS permission_active
    "#;

    pub(super) async fn entry_by_keys(
        conn: &mut PgConnection,
        module_key: &str,
        permission_key: &str,
    ) -> StoreResult<Option<CatalogEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM permissions p JOIN modules m ON m.id = p.module_id \
             WHERE m.module_key = $1 AND p.permission_key = $2"
        );
        let row = sqlx::query(&sql)
            .bind(module_key)
            .bind(permission_key)
            .fetch_optional(conn)
            .await
            .map_err(|e| map_sqlx_error("find_module_and_permission_by_keys", e))?;

        row.map(|r| entry_from_row(&r)).transpose()
    }

    pub(super) async fn entry_by_id(
        conn: &mut PgConnection,
        permission_id: PermissionId,
    ) -> StoreResult<Option<CatalogEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM permissions p JOIN modules m ON m.id = p.module_id WHERE p.id = $1"
        );
        let row = sqlx::query(&sql)
            .bind(*permission_id.as_uuid())
            .fetch_optional(conn)
            .await
            .map_err(|e| map_sqlx_error("find_permission", e))?;

        row.map(|r| entry_from_row(&r)).transpose()
    }

    pub(super) async fn list_catalog(conn: &mut PgConnection) -> StoreResult<Vec<CatalogModule>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM permissions p JOIN modules m ON m.id = p.module_id \
             ORDER BY m.sort_order, m.module_key, p.permission_key"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(conn)
            .await
            .map_err(|e| map_sqlx_error("list_catalog", e))?;

        let mut modules: Vec<CatalogModule> = Vec::new();
        for row in rows {
            let entry = entry_from_row(&row)?;
            match modules.last_mut() {
                Some(last) if last.module.id == entry.module.id => last.permissions.push(entry.permission),
                _ => modules.push(CatalogModule {
                    module: entry.module,
                    permissions: vec![entry.permission],
                }),
            }
        }
        Ok(modules)
    }

    const ROLE_COLUMNS: &str = r#"
        id, company_id, role_key, role_name, description, parent_role_id, hierarchy_level,
        is_system_role, is_active, created_by_kind, created_by_id, created_at, updated_at
    "#;

    pub(super) async fn find_role(
        conn: &mut PgConnection,
        company_id: CompanyId,
        role_id: RoleId,
    ) -> StoreResult<Option<Role>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1 AND company_id = $2");
        let row = sqlx::query(&sql)
            .bind(*role_id.as_uuid())
            .bind(*company_id.as_uuid())
            .fetch_optional(conn)
            .await
            .map_err(|e| map_sqlx_error("find_role", e))?;

        row.map(|r| role_from_row(&r)).transpose()
    }

    pub(super) async fn find_role_by_key(
        conn: &mut PgConnection,
        company_id: CompanyId,
        role_key: &str,
    ) -> StoreResult<Option<Role>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE company_id = $1 AND role_key = $2");
        let row = sqlx::query(&sql)
            .bind(*company_id.as_uuid())
            .bind(role_key)
            .fetch_optional(conn)
            .await
            .map_err(|e| map_sqlx_error("find_role_by_key", e))?;

        row.map(|r| role_from_row(&r)).transpose()
    }

    pub(super) async fn list_roles(conn: &mut PgConnection, company_id: CompanyId) -> StoreResult<Vec<Role>> {
        let sql = format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE company_id = $1 ORDER BY hierarchy_level, role_name"
        );
        let rows = sqlx::query(&sql)
            .bind(*company_id.as_uuid())
            .fetch_all(conn)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;

        rows.iter().map(role_from_row).collect()
    }

    pub(super) async fn bindings_for_role(conn: &mut PgConnection, role_id: RoleId) -> StoreResult<Vec<BoundPermission>> {
        let rows = sqlx::query(
            r#"
            SELECT rp.permission_id, m.module_key, p.permission_key, p.permission_name,
                   rp.can_grant, rp.granted_at
            FROM role_permissions rp
            JOIN permissions p ON p.id = rp.permission_id
            JOIN modules m ON m.id = p.module_id
            WHERE rp.role_id = $1
            ORDER BY m.sort_order, p.permission_key
            "#,
        )
        .bind(*role_id.as_uuid())
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("find_bindings_for_role", e))?;

        rows.iter()
            .map(|r| {
                Ok(BoundPermission {
                    permission_id: PermissionId::from_uuid(get(r, "permission_id")?),
                    module_key: get(r, "module_key")?,
                    permission_key: get(r, "permission_key")?,
                    permission_name: get(r, "permission_name")?,
                    can_grant: get(r, "can_grant")?,
                    granted_at: get(r, "granted_at")?,
                })
            })
            .collect()
    }

    pub(super) async fn find_binding(
        conn: &mut PgConnection,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> StoreResult<Option<RolePermission>> {
        let row = sqlx::query(
            r#"
            SELECT role_id, permission_id, can_grant, granted_by_kind, granted_by_id, granted_at
            FROM role_permissions
            WHERE role_id = $1 AND permission_id = $2
            "#,
        )
        .bind(*role_id.as_uuid())
        .bind(*permission_id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("find_binding", e))?;

        row.map(|r| {
            Ok(RolePermission {
                role_id: RoleId::from_uuid(get(&r, "role_id")?),
                permission_id: PermissionId::from_uuid(get(&r, "permission_id")?),
                can_grant: get(&r, "can_grant")?,
                granted_by: actor(&r, "granted_by")?,
                granted_at: get(&r, "granted_at")?,
            })
        })
        .transpose()
    }

    pub(super) async fn role_has_binding(
        conn: &mut PgConnection,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> StoreResult<bool> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM role_permissions rp
                JOIN roles r ON r.id = rp.role_id
                JOIN permissions p ON p.id = rp.permission_id
                JOIN modules m ON m.id = p.module_id
                WHERE rp.role_id = $1
                  AND rp.permission_id = $2
                  AND r.is_active
                  AND p.is_active
                  AND m.is_active
            )
            "#,
        )
        .bind(*role_id.as_uuid())
        .bind(*permission_id.as_uuid())
        .fetch_one(conn)
        .await
        .map_err(|e| map_sqlx_error("role_has_binding", e))
    }

    pub(super) async fn count_users_with_role(conn: &mut PgConnection, role_id: RoleId) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM company_users WHERE assigned_role_id = $1")
            .bind(*role_id.as_uuid())
            .fetch_one(conn)
            .await
            .map_err(|e| map_sqlx_error("count_users_with_role", e))?;
        Ok(count.max(0) as u64)
    }

    const OVERRIDE_COLUMNS: &str = r#"
        user_id, permission_id, is_granted, expires_at, override_reason,
        overridden_by_kind, overridden_by_id, created_at
    "#;

    pub(super) async fn find_active_override(
        conn: &mut PgConnection,
        user_id: UserId,
        permission_id: PermissionId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PermissionOverride>> {
        let sql = format!(
            "SELECT {OVERRIDE_COLUMNS} FROM permission_overrides \
             WHERE user_id = $1 AND permission_id = $2 AND is_granted \
               AND (expires_at IS NULL OR expires_at > $3)"
        );
        let row = sqlx::query(&sql)
            .bind(*user_id.as_uuid())
            .bind(*permission_id.as_uuid())
            .bind(now)
            .fetch_optional(conn)
            .await
            .map_err(|e| map_sqlx_error("find_active_override", e))?;

        row.map(|r| override_from_row(&r)).transpose()
    }

    pub(super) async fn overrides_for_user(
        conn: &mut PgConnection,
        user_id: UserId,
    ) -> StoreResult<Vec<PermissionOverride>> {
        let sql = format!(
            "SELECT {OVERRIDE_COLUMNS} FROM permission_overrides WHERE user_id = $1 ORDER BY created_at"
        );
        let rows = sqlx::query(&sql)
            .bind(*user_id.as_uuid())
            .fetch_all(conn)
            .await
            .map_err(|e| map_sqlx_error("list_overrides_for_user", e))?;

        rows.iter().map(override_from_row).collect()
    }

    pub(super) async fn role_permission_keys(conn: &mut PgConnection, role_id: RoleId) -> StoreResult<Vec<PermissionRef>> {
        let rows = sqlx::query(
            r#"
            SELECT m.module_key, p.permission_key
            FROM role_permissions rp
            JOIN roles r ON r.id = rp.role_id
            JOIN permissions p ON p.id = rp.permission_id
            JOIN modules m ON m.id = p.module_id
            WHERE rp.role_id = $1 AND r.is_active AND p.is_active AND m.is_active
            "#,
        )
        .bind(*role_id.as_uuid())
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("role_permission_keys", e))?;

        rows.iter().map(key_from_row).collect()
    }

    pub(super) async fn active_override_keys(
        conn: &mut PgConnection,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<PermissionRef>> {
        let rows = sqlx::query(
            r#"
            SELECT m.module_key, p.permission_key
            FROM permission_overrides o
            JOIN permissions p ON p.id = o.permission_id
            JOIN modules m ON m.id = p.module_id
            WHERE o.user_id = $1 AND o.is_granted AND (o.expires_at IS NULL OR o.expires_at > $2)
            "#,
        )
        .bind(*user_id.as_uuid())
        .bind(now)
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("active_override_keys", e))?;

        rows.iter().map(key_from_row).collect()
    }

    const AUDIT_PREDICATE: &str = r#"
        company_id = $1
        AND ($2::text IS NULL OR action_type = $2)
        AND ($3::uuid IS NULL OR target_user_id = $3)
        AND ($4::uuid IS NULL OR target_role_id = $4)
        AND ($5::timestamptz IS NULL OR created_at >= $5)
        AND ($6::timestamptz IS NULL OR created_at < $6)
    "#;

    pub(super) async fn query_audit(
        conn: &mut PgConnection,
        company_id: CompanyId,
        filter: &AuditFilter,
        pagination: Pagination,
    ) -> StoreResult<AuditPage> {
        let action = filter.action.map(|a| a.as_str());
        let target_user = filter.target_user_id.map(|u| *u.as_uuid());
        let target_role = filter.target_role_id.map(|r| *r.as_uuid());

        let count_sql = format!("SELECT COUNT(*) FROM rbac_audit_log WHERE {AUDIT_PREDICATE}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(*company_id.as_uuid())
            .bind(action)
            .bind(target_user)
            .bind(target_role)
            .bind(filter.created_after)
            .bind(filter.created_before)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("count_audit_entries", e))?;

        let page_sql = format!(
            "SELECT id, company_id, action_type, performed_by_kind, performed_by_id, \
                    target_role_id, target_user_id, old_value, new_value, created_at \
             FROM rbac_audit_log WHERE {AUDIT_PREDICATE} \
             ORDER BY created_at DESC, id DESC LIMIT $7 OFFSET $8"
        );
        let rows = sqlx::query(&page_sql)
            .bind(*company_id.as_uuid())
            .bind(action)
            .bind(target_user)
            .bind(target_role)
            .bind(filter.created_after)
            .bind(filter.created_before)
            .bind(sql_count(pagination.limit))
            .bind(sql_count(pagination.offset))
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("query_audit_entries", e))?;

        let entries = rows
            .iter()
            .map(audit_from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(AuditPage::new(entries, total.max(0) as usize, pagination))
    }

    fn get<'r, T>(row: &'r PgRow, column: &str) -> StoreResult<T>
    where
        T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
    {
        row.try_get(column)
            .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
    }

    fn actor_from_parts(kind: &str, id: Uuid) -> StoreResult<Actor> {
        Actor::from_parts(kind, id).ok_or_else(|| StoreError::Corrupt(format!("unknown actor kind '{kind}'")))
    }

    /// Read an actor stored as `<prefix>_kind` / `<prefix>_id` columns.
    fn actor(row: &PgRow, prefix: &str) -> StoreResult<Actor> {
        let kind: String = get(row, &format!("{prefix}_kind"))?;
        let id: Uuid = get(row, &format!("{prefix}_id"))?;
        actor_from_parts(&kind, id)
    }

    fn entry_from_row(row: &PgRow) -> StoreResult<CatalogEntry> {
        let module_id = ModuleId::from_uuid(get(row, "module_id")?);
        Ok(CatalogEntry {
            module: Module {
                id: module_id,
                module_key: get(row, "module_key")?,
                module_name: get(row, "module_name")?,
                module_group: get(row, "module_group")?,
                sort_order: get(row, "sort_order")?,
                is_active: get(row, "module_active")?,
            },
            permission: Permission {
                id: PermissionId::from_uuid(get(row, "permission_id")?),
                module_id,
                permission_key: get(row, "permission_key")?,
                permission_name: get(row, "permission_name")?,
                description: get(row, "description")?,
                is_active: get(row, "permission_active")?,
            },
        })
    }

    fn role_from_row(row: &PgRow) -> StoreResult<Role> {
        Ok(Role {
            id: RoleId::from_uuid(get(row, "id")?),
            company_id: CompanyId::from_uuid(get(row, "company_id")?),
            role_key: get(row, "role_key")?,
            role_name: get(row, "role_name")?,
            description: get(row, "description")?,
            parent_role_id: get::<Option<Uuid>>(row, "parent_role_id")?.map(RoleId::from_uuid),
            hierarchy_level: get(row, "hierarchy_level")?,
            is_system_role: get(row, "is_system_role")?,
            is_active: get(row, "is_active")?,
            created_by: actor(row, "created_by")?,
            created_at: get(row, "created_at")?,
            updated_at: get(row, "updated_at")?,
        })
    }

    fn override_from_row(row: &PgRow) -> StoreResult<PermissionOverride> {
        Ok(PermissionOverride {
            user_id: UserId::from_uuid(get(row, "user_id")?),
            permission_id: PermissionId::from_uuid(get(row, "permission_id")?),
            is_granted: get(row, "is_granted")?,
            expires_at: get(row, "expires_at")?,
            override_reason: get(row, "override_reason")?,
            overridden_by: actor(row, "overridden_by")?,
            created_at: get(row, "created_at")?,
        })
    }

    fn key_from_row(row: &PgRow) -> StoreResult<PermissionRef> {
        let module: String = get(row, "module_key")?;
        let permission: String = get(row, "permission_key")?;
        Ok(PermissionRef::new(module, permission))
    }

    fn audit_from_row(row: &PgRow) -> StoreResult<AuditLogEntry> {
        let action: String = get(row, "action_type")?;
        let action: AuditAction = action
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("{e}")))?;

        Ok(AuditLogEntry {
            id: get(row, "id")?,
            company_id: CompanyId::from_uuid(get(row, "company_id")?),
            action,
            performed_by: actor(row, "performed_by")?,
            target_role_id: get::<Option<Uuid>>(row, "target_role_id")?.map(RoleId::from_uuid),
            target_user_id: get::<Option<Uuid>>(row, "target_user_id")?.map(UserId::from_uuid),
            old_value: get(row, "old_value")?,
            new_value: get(row, "new_value")?,
            created_at: get(row, "created_at")?,
        })
    }
}

/// `LIMIT`/`OFFSET` operand; offsets past `i64::MAX` read as "past the end".
fn sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Map SQLx errors to store errors, keeping the constraint name of unique violations.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                StoreError::UniqueViolation(
                    db_err
                        .constraint()
                        .map(str::to_string)
                        .unwrap_or_else(|| operation.to_string()),
                )
            } else {
                StoreError::Database(format!("database error in {}: {}", operation, db_err.message()))
            }
        }
        sqlx::Error::PoolClosed => StoreError::Database(format!("connection pool closed in {operation}")),
        _ => StoreError::Database(format!("sqlx error in {operation}: {err}")),
    }
}
