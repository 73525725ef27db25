//! Per-user endpoints: role assignment, overrides, resolved permissions.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};

use bizhub_auth::permissions::rbac;
use bizhub_auth::{CompanyUser, GrantOverride, OverrideView, PermissionOverride};
use bizhub_core::{CompanyId, PermissionId, UserId};
use bizhub_infra::{RbacServices, RbacStore};

use crate::app::dto::{AssignRoleRequest, GrantOverrideRequest, PermissionsResponse, RevokedResponse};
use crate::app::errors::ApiError;
use crate::context::Caller;

pub fn router<S: RbacStore>() -> Router {
    Router::new()
        .route(
            "/users/:user_id/role",
            axum::routing::put(assign_role::<S>).delete(revoke_role::<S>),
        )
        .route("/users/:user_id/permissions", get(user_permissions::<S>))
        .route(
            "/users/:user_id/overrides",
            get(list_overrides::<S>).post(grant_override::<S>),
        )
        .route(
            "/users/:user_id/overrides/:permission_id",
            delete(revoke_override::<S>),
        )
}

/// PUT /companies/:company_id/rbac/users/:user_id/role
pub async fn assign_role<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
    Path((company_id, user_id)): Path<(CompanyId, UserId)>,
    Json(body): Json<AssignRoleRequest>,
) -> Result<Json<CompanyUser>, ApiError> {
    let principal = services
        .gate()
        .require_permission(caller.principal(), &rbac::ASSIGN_ROLES)
        .await?;
    Ok(Json(
        services
            .assignments()
            .assign_role(company_id, user_id, body.role_id, principal)
            .await?,
    ))
}

pub async fn revoke_role<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
    Path((company_id, user_id)): Path<(CompanyId, UserId)>,
) -> Result<Json<CompanyUser>, ApiError> {
    let principal = services
        .gate()
        .require_permission(caller.principal(), &rbac::ASSIGN_ROLES)
        .await?;
    Ok(Json(
        services
            .assignments()
            .revoke_role(company_id, user_id, principal)
            .await?,
    ))
}

pub async fn user_permissions<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
    Path((company_id, user_id)): Path<(CompanyId, UserId)>,
) -> Result<Json<PermissionsResponse>, ApiError> {
    let principal = services
        .gate()
        .require_permission(caller.principal(), &rbac::VIEW_USERS)
        .await?;
    let set = services
        .assignments()
        .user_permissions(company_id, user_id, principal)
        .await?;
    Ok(Json(set.into()))
}

pub async fn list_overrides<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
    Path((company_id, user_id)): Path<(CompanyId, UserId)>,
) -> Result<Json<Vec<OverrideView>>, ApiError> {
    let principal = services
        .gate()
        .require_permission(caller.principal(), &rbac::VIEW_USERS)
        .await?;
    Ok(Json(
        services
            .overrides()
            .list_overrides(company_id, user_id, principal)
            .await?,
    ))
}

pub async fn grant_override<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
    Path((company_id, user_id)): Path<(CompanyId, UserId)>,
    Json(body): Json<GrantOverrideRequest>,
) -> Result<(StatusCode, Json<PermissionOverride>), ApiError> {
    let principal = services
        .gate()
        .require_permission(caller.principal(), &rbac::MANAGE_OVERRIDES)
        .await?;
    let input = GrantOverride {
        user_id,
        permission_id: body.permission_id,
        expires_at: body.expires_at,
        reason: body.reason,
    };
    let granted = services
        .overrides()
        .grant_override(company_id, input, principal)
        .await?;
    Ok((StatusCode::CREATED, Json(granted)))
}

pub async fn revoke_override<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
    Path((company_id, user_id, permission_id)): Path<(CompanyId, UserId, PermissionId)>,
) -> Result<Json<RevokedResponse>, ApiError> {
    let principal = services
        .gate()
        .require_permission(caller.principal(), &rbac::MANAGE_OVERRIDES)
        .await?;
    let revoked = services
        .overrides()
        .revoke_override(company_id, user_id, permission_id, principal)
        .await?;
    Ok(Json(RevokedResponse { revoked }))
}
