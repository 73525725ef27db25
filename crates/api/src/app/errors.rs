use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use bizhub_auth::{DenialCode, RbacError};

/// An [`RbacError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub RbacError);

impl From<RbacError> for ApiError {
    fn from(err: RbacError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let denial = self.0.denial();
        (status_for(denial.code), Json(denial)).into_response()
    }
}

pub fn status_for(code: DenialCode) -> StatusCode {
    match code {
        DenialCode::Unauthorized
        | DenialCode::InvalidCredential
        | DenialCode::ExpiredCredential
        | DenialCode::PrincipalNotFound => StatusCode::UNAUTHORIZED,
        DenialCode::CompanyFrozen
        | DenialCode::UserInactive
        | DenialCode::PermissionDenied
        | DenialCode::OwnerRequired
        | DenialCode::Forbidden => StatusCode::FORBIDDEN,
        DenialCode::NotFound => StatusCode::NOT_FOUND,
        DenialCode::DuplicateRoleKey | DenialCode::RoleInUse => StatusCode::CONFLICT,
        DenialCode::BadRequest => StatusCode::BAD_REQUEST,
        DenialCode::PermissionCheckError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_expected_statuses() {
        assert_eq!(status_for(DenialCode::ExpiredCredential), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(DenialCode::CompanyFrozen), StatusCode::FORBIDDEN);
        assert_eq!(status_for(DenialCode::RoleInUse), StatusCode::CONFLICT);
        assert_eq!(status_for(DenialCode::PermissionCheckError), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
