use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bizhub_auth::{AuditAction, AuditFilter, EffectivePermissions, Pagination};
use bizhub_core::{PermissionId, RoleId, UserId};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AssignPermissionsRequest {
    pub permission_ids: Vec<PermissionId>,
    #[serde(default)]
    pub can_grant: bool,
}

#[derive(Debug, Deserialize)]
pub struct RevokePermissionsRequest {
    pub permission_ids: Vec<PermissionId>,
}

#[derive(Debug, Deserialize)]
pub struct CompareRolesRequest {
    pub role_ids: Vec<RoleId>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role_id: RoleId,
}

#[derive(Debug, Deserialize)]
pub struct GrantOverrideRequest {
    pub permission_id: PermissionId,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `GET .../audit` query string.
#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub action: Option<AuditAction>,
    pub target_user_id: Option<UserId>,
    pub target_role_id: Option<RoleId>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl AuditQuery {
    pub fn into_parts(self) -> (AuditFilter, Pagination) {
        let defaults = Pagination::default();
        let pagination = Pagination::new(
            self.limit.unwrap_or(defaults.limit),
            self.offset.unwrap_or(defaults.offset),
        );
        let filter = AuditFilter {
            action: self.action,
            target_user_id: self.target_user_id,
            target_role_id: self.target_role_id,
            created_after: self.created_after,
            created_before: self.created_before,
        };
        (filter, pagination)
    }
}

// -------------------------
// Response DTOs
// -------------------------

/// Flat capability list for UI consumers.
#[derive(Debug, Serialize)]
pub struct PermissionsResponse {
    pub is_owner: bool,
    pub permissions: Vec<String>,
}

impl From<EffectivePermissions> for PermissionsResponse {
    fn from(set: EffectivePermissions) -> Self {
        Self {
            is_owner: matches!(set, EffectivePermissions::All),
            permissions: set.keys(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RevokedResponse {
    pub revoked: bool,
}

#[derive(Debug, Serialize)]
pub struct PurgedResponse {
    pub purged: u64,
}
