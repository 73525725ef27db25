use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use bizhub_core::{CompanyId, DomainError, PermissionId, RoleId};

use crate::{Actor, PermissionRef};

/// A named, company-scoped bundle of permission bindings.
///
/// # Invariants
/// - `role_key` is unique within `company_id` and immutable after creation.
/// - `parent_role_id` is display-only hierarchy; permissions are never inherited.
/// - System roles can be neither updated nor deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub company_id: CompanyId,
    pub role_key: String,
    pub role_name: String,
    pub description: Option<String>,
    pub parent_role_id: Option<RoleId>,
    pub hierarchy_level: i32,
    pub is_system_role: bool,
    pub is_active: bool,
    pub created_by: Actor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role keys are lowercase `[a-z0-9_]`, starting with a letter.
pub fn validate_role_key(key: &str) -> Result<(), DomainError> {
    let mut chars = key.chars();
    let Some(first) = chars.next() else {
        return Err(DomainError::validation("role key cannot be empty"));
    };
    if !first.is_ascii_lowercase() {
        return Err(DomainError::validation("role key must start with a lowercase letter"));
    }
    if key.len() > 64 {
        return Err(DomainError::validation("role key must be at most 64 characters"));
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        return Err(DomainError::validation(
            "role key may only contain lowercase letters, digits and underscores",
        ));
    }
    Ok(())
}

pub fn validate_role_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("role name cannot be empty"));
    }
    Ok(())
}

/// Input for creating a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRole {
    pub role_key: String,
    pub role_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_role_id: Option<RoleId>,
    #[serde(default)]
    pub hierarchy_level: Option<i32>,
    #[serde(default)]
    pub is_system_role: bool,
    #[serde(default)]
    pub permission_ids: Vec<PermissionId>,
}

/// Partial update of a role's mutable fields.
///
/// `role_key`, `company_id`, `created_by`, `created_at` and `is_system_role`
/// are not representable here; payloads naming them are rejected on decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RolePatch {
    #[serde(default)]
    pub role_name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_role_id: Option<Option<RoleId>>,
    #[serde(default)]
    pub hierarchy_level: Option<i32>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl RolePatch {
    pub fn is_empty(&self) -> bool {
        self == &RolePatch::default()
    }

    /// Apply onto `role`, returning the updated copy.
    pub fn applied_to(&self, role: &Role, now: DateTime<Utc>) -> Role {
        let mut updated = role.clone();
        if let Some(name) = &self.role_name {
            updated.role_name = name.trim().to_string();
        }
        if let Some(description) = &self.description {
            updated.description = description.clone();
        }
        if let Some(parent) = self.parent_role_id {
            updated.parent_role_id = parent;
        }
        if let Some(level) = self.hierarchy_level {
            updated.hierarchy_level = level;
        }
        if let Some(active) = self.is_active {
            updated.is_active = active;
        }
        updated.updated_at = now;
        updated
    }
}

/// Binding of one catalog permission to one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermission {
    pub role_id: RoleId,
    pub permission_id: PermissionId,
    /// Holders of this binding may grant the same permission onwards.
    pub can_grant: bool,
    pub granted_by: Actor,
    pub granted_at: DateTime<Utc>,
}

/// A binding joined with the catalog keys it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundPermission {
    pub permission_id: PermissionId,
    pub module_key: String,
    pub permission_key: String,
    pub permission_name: String,
    pub can_grant: bool,
    pub granted_at: DateTime<Utc>,
}

impl BoundPermission {
    pub fn reference(&self) -> PermissionRef {
        PermissionRef::new(self.module_key.clone(), self.permission_key.clone())
    }
}

/// Role listing row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleSummary {
    #[serde(flatten)]
    pub role: Role,
    pub permission_count: u64,
    pub user_count: u64,
}

/// A role with its bound permissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDetail {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<BoundPermission>,
}

impl RoleDetail {
    pub fn permission_count(&self) -> usize {
        self.permissions.len()
    }
}

/// Side-by-side view of several roles for external diffing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleComparison {
    pub roles: Vec<RoleDetail>,
    /// `module.permission` keys bound to every compared role.
    pub common_permissions: Vec<String>,
}

impl RoleComparison {
    pub fn new(roles: Vec<RoleDetail>) -> Self {
        let mut sets = roles.iter().map(|r| {
            r.permissions
                .iter()
                .map(|p| p.reference().key())
                .collect::<BTreeSet<String>>()
        });

        let common = match sets.next() {
            Some(first) => sets.fold(first, |acc, s| acc.intersection(&s).cloned().collect()),
            None => BTreeSet::new(),
        };

        Self {
            roles,
            common_permissions: common.into_iter().collect(),
        }
    }
}

/// Input for cloning a role under a new key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneRole {
    pub role_key: String,
    pub role_name: String,
    /// Keep each binding's `can_grant` flag; otherwise every copy is non-delegable.
    #[serde(default)]
    pub include_can_grant: bool,
}

/// Why a requested permission was not bound.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyBound,
    NotGrantable,
    UnknownPermission,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPermission {
    pub permission_id: PermissionId,
    pub reason: SkipReason,
}

/// Result of a bulk permission assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignOutcome {
    pub assigned: u64,
    pub skipped: u64,
    pub assigned_permissions: Vec<PermissionId>,
    pub skipped_permissions: Vec<SkippedPermission>,
}

impl AssignOutcome {
    pub fn bound(&mut self, permission_id: PermissionId) {
        self.assigned += 1;
        self.assigned_permissions.push(permission_id);
    }

    pub fn skip(&mut self, permission_id: PermissionId, reason: SkipReason) {
        self.skipped += 1;
        self.skipped_permissions.push(SkippedPermission {
            permission_id,
            reason,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeOutcome {
    pub removed: u64,
}
