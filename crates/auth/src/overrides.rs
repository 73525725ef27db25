use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bizhub_core::{PermissionId, UserId};

use crate::Actor;

/// A user-specific grant (or denial) of one permission, independent of role.
///
/// At most one row exists per `(user_id, permission_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOverride {
    pub user_id: UserId,
    pub permission_id: PermissionId,
    pub is_granted: bool,
    /// `None` means the override never expires.
    pub expires_at: Option<DateTime<Utc>>,
    pub override_reason: Option<String>,
    pub overridden_by: Actor,
    pub created_at: DateTime<Utc>,
}

impl PermissionOverride {
    /// Expired rows are treated as absent; nothing has to delete them.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_granted && self.expires_at.is_none_or(|at| at > now)
    }
}

/// Input for granting an override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantOverride {
    pub user_id: UserId,
    pub permission_id: PermissionId,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Administrative listing row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideView {
    #[serde(flatten)]
    pub entry: PermissionOverride,
    pub module_key: String,
    pub permission_key: String,
    pub is_active: bool,
}
