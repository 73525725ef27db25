use serde::{Deserialize, Serialize};
use thiserror::Error;

use bizhub_core::{DomainError, RoleId};

use crate::claims::TokenValidationError;
use crate::PermissionRef;

/// Principal resolution failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid credential")]
    InvalidCredential,

    #[error("credential has expired")]
    ExpiredCredential,

    #[error("principal not found")]
    PrincipalNotFound,

    /// Backing store failed while looking up the subject.
    #[error("principal lookup unavailable")]
    Unavailable,
}

impl From<TokenValidationError> for AuthError {
    fn from(value: TokenValidationError) -> Self {
        match value {
            TokenValidationError::Expired => AuthError::ExpiredCredential,
            TokenValidationError::NotYetValid
            | TokenValidationError::InvalidTimeWindow
            | TokenValidationError::UnexpectedCompany
            | TokenValidationError::Malformed(_) => AuthError::InvalidCredential,
        }
    }
}

/// Every failure an RBAC gate or management operation can return.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RbacError {
    #[error("authentication required")]
    Unauthorized,

    #[error("invalid credential")]
    InvalidCredential,

    #[error("credential has expired")]
    ExpiredCredential,

    #[error("principal not found")]
    PrincipalNotFound,

    #[error("company is frozen")]
    CompanyFrozen,

    #[error("user account is inactive")]
    UserInactive,

    /// `required` lists what the gate asked for; `missing` names the first
    /// unmet requirement of an all-of gate.
    #[error("permission denied")]
    PermissionDenied {
        required: Vec<PermissionRef>,
        missing: Option<PermissionRef>,
    },

    #[error("owner access required")]
    OwnerRequired,

    #[error("{0} not found")]
    NotFound(String),

    #[error("role key '{0}' already exists")]
    DuplicateRoleKey(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("role {role_id} is assigned to {user_count} user(s)")]
    RoleInUse { role_id: RoleId, user_count: u64 },

    #[error("bad request: {0}")]
    BadRequest(String),

    /// A backing-store failure while evaluating or applying a check.
    #[error("permission check failed")]
    PermissionCheck,
}

impl RbacError {
    pub fn denied(required: PermissionRef) -> Self {
        RbacError::PermissionDenied {
            missing: Some(required.clone()),
            required: vec![required],
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        RbacError::NotFound(what.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        RbacError::Forbidden(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        RbacError::BadRequest(msg.into())
    }

    pub fn code(&self) -> DenialCode {
        match self {
            RbacError::Unauthorized => DenialCode::Unauthorized,
            RbacError::InvalidCredential => DenialCode::InvalidCredential,
            RbacError::ExpiredCredential => DenialCode::ExpiredCredential,
            RbacError::PrincipalNotFound => DenialCode::PrincipalNotFound,
            RbacError::CompanyFrozen => DenialCode::CompanyFrozen,
            RbacError::UserInactive => DenialCode::UserInactive,
            RbacError::PermissionDenied { .. } => DenialCode::PermissionDenied,
            RbacError::OwnerRequired => DenialCode::OwnerRequired,
            RbacError::NotFound(_) => DenialCode::NotFound,
            RbacError::DuplicateRoleKey(_) => DenialCode::DuplicateRoleKey,
            RbacError::Forbidden(_) => DenialCode::Forbidden,
            RbacError::RoleInUse { .. } => DenialCode::RoleInUse,
            RbacError::BadRequest(_) => DenialCode::BadRequest,
            RbacError::PermissionCheck => DenialCode::PermissionCheckError,
        }
    }

    /// Structured, caller-facing description of this failure.
    pub fn denial(&self) -> Denial {
        let (required_permission, required_any_of, missing_permission) = match self {
            RbacError::PermissionDenied { required, missing } => match required.as_slice() {
                [single] => (Some(single.clone()), Vec::new(), missing.clone()),
                _ => (None, required.clone(), missing.clone()),
            },
            _ => (None, Vec::new(), None),
        };

        let message = match self {
            RbacError::PermissionDenied {
                missing: Some(missing),
                ..
            } => format!("missing permission '{missing}'"),
            RbacError::PermissionDenied { required, .. } => {
                let keys: Vec<String> = required.iter().map(PermissionRef::key).collect();
                format!("requires one of: {}", keys.join(", "))
            }
            other => other.to_string(),
        };

        Denial {
            code: self.code(),
            message,
            required_permission,
            required_any_of,
            missing_permission,
        }
    }
}

impl From<AuthError> for RbacError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredential => RbacError::InvalidCredential,
            AuthError::ExpiredCredential => RbacError::ExpiredCredential,
            AuthError::PrincipalNotFound => RbacError::PrincipalNotFound,
            AuthError::Unavailable => RbacError::PermissionCheck,
        }
    }
}

impl From<DomainError> for RbacError {
    fn from(value: DomainError) -> Self {
        RbacError::BadRequest(value.to_string())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialCode {
    Unauthorized,
    InvalidCredential,
    ExpiredCredential,
    PrincipalNotFound,
    CompanyFrozen,
    UserInactive,
    PermissionDenied,
    OwnerRequired,
    NotFound,
    DuplicateRoleKey,
    Forbidden,
    RoleInUse,
    BadRequest,
    PermissionCheckError,
}

/// Outbound denial payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denial {
    pub code: DenialCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_permission: Option<PermissionRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_any_of: Vec<PermissionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_permission: Option<PermissionRef>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::rbac;

    #[test]
    fn single_permission_denial_names_it() {
        let denial = RbacError::denied(rbac::MANAGE_ROLES).denial();
        assert_eq!(denial.code, DenialCode::PermissionDenied);
        assert_eq!(denial.required_permission, Some(rbac::MANAGE_ROLES));
        assert_eq!(denial.missing_permission, Some(rbac::MANAGE_ROLES));
        assert_eq!(denial.message, "missing permission 'roles.manage_roles'");
    }

    #[test]
    fn any_of_denial_lists_alternatives() {
        let err = RbacError::PermissionDenied {
            required: vec![rbac::VIEW_ROLES, rbac::MANAGE_ROLES],
            missing: None,
        };
        let denial = err.denial();
        assert_eq!(denial.required_permission, None);
        assert_eq!(denial.required_any_of.len(), 2);

        let json = serde_json::to_value(&denial).unwrap();
        assert_eq!(json["code"], "permission_denied");
        assert_eq!(json["required_any_of"][0]["module"], "roles");
        assert!(json.get("missing_permission").is_none());
    }

    #[test]
    fn store_failures_do_not_leak() {
        let denial = RbacError::from(AuthError::Unavailable).denial();
        assert_eq!(denial.code, DenialCode::PermissionCheckError);
        assert_eq!(denial.message, "permission check failed");
    }

    #[test]
    fn token_errors_collapse_to_credential_kinds() {
        assert_eq!(
            AuthError::from(TokenValidationError::Expired),
            AuthError::ExpiredCredential
        );
        assert_eq!(
            AuthError::from(TokenValidationError::Malformed("x".into())),
            AuthError::InvalidCredential
        );
    }
}
