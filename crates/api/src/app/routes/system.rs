use axum::{extract::Extension, http::StatusCode, Json};

use bizhub_auth::Principal;
use bizhub_infra::{RbacServices, RbacStore};

use crate::app::dto::PermissionsResponse;
use crate::app::errors::ApiError;
use crate::context::Caller;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /me
pub async fn me<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Principal>, ApiError> {
    let principal = services.gate().require_authenticated(caller.principal())?;
    Ok(Json(principal.clone()))
}

/// GET /me/permissions - the caller's resolved capability list.
pub async fn my_permissions<S: RbacStore>(
    Extension(services): Extension<RbacServices<S>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<PermissionsResponse>, ApiError> {
    let gate = services.gate();
    let principal = gate.require_authenticated(caller.principal())?;
    let set = gate.attach_user_permissions(principal).await?;
    Ok(Json(set.into()))
}
