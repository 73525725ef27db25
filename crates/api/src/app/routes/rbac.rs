//! Role, binding, catalog and audit endpoints.
//!
//! Every handler passes through a gate before touching a service; the
//! services re-check company scope and their own management permission.

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use bizhub_auth::permissions::rbac;
use bizhub_auth::{
    AssignOutcome, AuditPage, CatalogGroup, CloneRole, CreateRole, RevokeOutcome, Role,
    RoleComparison, RoleDetail, RoleNode, RolePatch, RoleSummary,
};
use bizhub_core::{CompanyId, RoleId};
use bizhub_infra::{RbacServices, RbacStore};

use crate::app::dto::{
    AssignPermissionsRequest, AuditQuery, CompareRolesRequest, PurgedResponse,
    RevokePermissionsRequest,
};
use crate::app::errors::ApiError;
use crate::context::Caller;

pub fn router<S: RbacStore>() -> Router {
    Router::new()
        .route("/permissions", get(list_catalog::<S>))
        .route("/roles", get(list_roles::<S>).post(create_role::<S>))
        .route("/roles/hierarchy", get(role_hierarchy::<S>))
        .route("/roles/compare", post(compare_roles::<S>))
        .route(
            "/roles/:role_id",
            get(get_role::<S>).patch(update_role::<S>).delete(delete_role::<S>),
        )
        .route("/roles/:role_id/clone", post(clone_role::<S>))
        .route("/roles/:role_id/permissions", post(assign_permissions::<S>))
        .route("/roles/:role_id/permissions/revoke", post(revoke_permissions::<S>))
        .route("/audit", get(audit_log::<S>))
        .route("/overrides/purge", post(purge_overrides::<S>))
}

/// GET /companies/:company_id/rbac/permissions
pub async fn list_catalog<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
    Path(_company_id): Path<CompanyId>,
) -> Result<Json<Vec<CatalogGroup>>, ApiError> {
    services.gate().require_permission(caller.principal(), &rbac::VIEW_ROLES).await?;
    Ok(Json(services.catalog().list().await?))
}

pub async fn list_roles<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
    Path(company_id): Path<CompanyId>,
) -> Result<Json<Vec<RoleSummary>>, ApiError> {
    let principal = services
        .gate()
        .require_permission(caller.principal(), &rbac::VIEW_ROLES)
        .await?;
    Ok(Json(services.roles().list_roles(company_id, principal).await?))
}

pub async fn create_role<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
    Path(company_id): Path<CompanyId>,
    Json(body): Json<CreateRole>,
) -> Result<(StatusCode, Json<RoleSummary>), ApiError> {
    let principal = services
        .gate()
        .require_permission(caller.principal(), &rbac::MANAGE_ROLES)
        .await?;
    let created = services.roles().create_role(company_id, body, principal).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn role_hierarchy<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
    Path(company_id): Path<CompanyId>,
) -> Result<Json<Vec<RoleNode>>, ApiError> {
    let principal = services
        .gate()
        .require_permission(caller.principal(), &rbac::VIEW_ROLES)
        .await?;
    Ok(Json(services.roles().role_hierarchy(company_id, principal).await?))
}

pub async fn compare_roles<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
    Path(company_id): Path<CompanyId>,
    Json(body): Json<CompareRolesRequest>,
) -> Result<Json<RoleComparison>, ApiError> {
    let principal = services
        .gate()
        .require_permission(caller.principal(), &rbac::VIEW_ROLES)
        .await?;
    Ok(Json(
        services
            .roles()
            .compare_roles(company_id, &body.role_ids, principal)
            .await?,
    ))
}

pub async fn get_role<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
    Path((company_id, role_id)): Path<(CompanyId, RoleId)>,
) -> Result<Json<RoleDetail>, ApiError> {
    let principal = services
        .gate()
        .require_permission(caller.principal(), &rbac::VIEW_ROLES)
        .await?;
    Ok(Json(services.roles().get_role(company_id, role_id, principal).await?))
}

pub async fn update_role<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
    Path((company_id, role_id)): Path<(CompanyId, RoleId)>,
    Json(patch): Json<RolePatch>,
) -> Result<Json<Role>, ApiError> {
    let principal = services
        .gate()
        .require_permission(caller.principal(), &rbac::MANAGE_ROLES)
        .await?;
    Ok(Json(
        services
            .roles()
            .update_role(company_id, role_id, patch, principal)
            .await?,
    ))
}

pub async fn delete_role<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
    Path((company_id, role_id)): Path<(CompanyId, RoleId)>,
) -> Result<StatusCode, ApiError> {
    let principal = services
        .gate()
        .require_permission(caller.principal(), &rbac::MANAGE_ROLES)
        .await?;
    services.roles().delete_role(company_id, role_id, principal).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clone_role<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
    Path((company_id, role_id)): Path<(CompanyId, RoleId)>,
    Json(body): Json<CloneRole>,
) -> Result<(StatusCode, Json<RoleSummary>), ApiError> {
    let principal = services
        .gate()
        .require_permission(caller.principal(), &rbac::MANAGE_ROLES)
        .await?;
    let cloned = services
        .roles()
        .clone_role(company_id, role_id, body, principal)
        .await?;
    Ok((StatusCode::CREATED, Json(cloned)))
}

pub async fn assign_permissions<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
    Path((company_id, role_id)): Path<(CompanyId, RoleId)>,
    Json(body): Json<AssignPermissionsRequest>,
) -> Result<Json<AssignOutcome>, ApiError> {
    let principal = services
        .gate()
        .require_permission(caller.principal(), &rbac::MANAGE_ROLES)
        .await?;
    Ok(Json(
        services
            .roles()
            .assign_permissions(company_id, role_id, &body.permission_ids, body.can_grant, principal)
            .await?,
    ))
}

pub async fn revoke_permissions<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
    Path((company_id, role_id)): Path<(CompanyId, RoleId)>,
    Json(body): Json<RevokePermissionsRequest>,
) -> Result<Json<RevokeOutcome>, ApiError> {
    let principal = services
        .gate()
        .require_permission(caller.principal(), &rbac::MANAGE_ROLES)
        .await?;
    Ok(Json(
        services
            .roles()
            .revoke_permissions(company_id, role_id, &body.permission_ids, principal)
            .await?,
    ))
}

/// GET /companies/:company_id/rbac/audit?action=&target_user_id=&created_after=&limit=&offset=
pub async fn audit_log<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
    Path(company_id): Path<CompanyId>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditPage>, ApiError> {
    let principal = services
        .gate()
        .require_permission(caller.principal(), &rbac::VIEW_AUDIT_LOG)
        .await?;
    let (filter, pagination) = query.into_parts();
    Ok(Json(
        services
            .audit()
            .query(company_id, &filter, pagination, principal)
            .await?,
    ))
}

/// POST /companies/:company_id/rbac/overrides/purge - owner-only sweep of this company's expired overrides.
pub async fn purge_overrides<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
    Path(company_id): Path<CompanyId>,
) -> Result<Json<PurgedResponse>, ApiError> {
    let principal = services
        .gate()
        .require_owner(caller.principal(), Some(company_id))
        .await?;
    let purged = services
        .overrides()
        .purge_expired_in(company_id, principal)
        .await?;
    Ok(Json(PurgedResponse { purged }))
}
