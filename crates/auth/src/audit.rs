//! Audit trail records for RBAC mutations.
//!
//! Entries are append-only: nothing in the application layer updates or
//! deletes them. Snapshots are opaque JSON values.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use bizhub_core::{CompanyId, DomainError, RoleId, UserId};

use crate::Actor;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    RoleCreated,
    RoleUpdated,
    RoleDeleted,
    PermissionGranted,
    PermissionRevoked,
    UserRoleAssigned,
    UserRoleRevoked,
    OverrideGranted,
    OverrideRevoked,
}

impl AuditAction {
    pub const ALL: [AuditAction; 9] = [
        AuditAction::RoleCreated,
        AuditAction::RoleUpdated,
        AuditAction::RoleDeleted,
        AuditAction::PermissionGranted,
        AuditAction::PermissionRevoked,
        AuditAction::UserRoleAssigned,
        AuditAction::UserRoleRevoked,
        AuditAction::OverrideGranted,
        AuditAction::OverrideRevoked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::RoleCreated => "ROLE_CREATED",
            AuditAction::RoleUpdated => "ROLE_UPDATED",
            AuditAction::RoleDeleted => "ROLE_DELETED",
            AuditAction::PermissionGranted => "PERMISSION_GRANTED",
            AuditAction::PermissionRevoked => "PERMISSION_REVOKED",
            AuditAction::UserRoleAssigned => "USER_ROLE_ASSIGNED",
            AuditAction::UserRoleRevoked => "USER_ROLE_REVOKED",
            AuditAction::OverrideGranted => "OVERRIDE_GRANTED",
            AuditAction::OverrideRevoked => "OVERRIDE_REVOKED",
        }
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown audit action '{s}'")))
    }
}

/// An entry about to be appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub company_id: CompanyId,
    pub action: AuditAction,
    pub performed_by: Actor,
    pub target_role_id: Option<RoleId>,
    pub target_user_id: Option<UserId>,
    pub old_value: Option<JsonValue>,
    pub new_value: Option<JsonValue>,
}

impl NewAuditEntry {
    pub fn new(company_id: CompanyId, action: AuditAction, performed_by: Actor) -> Self {
        Self {
            company_id,
            action,
            performed_by,
            target_role_id: None,
            target_user_id: None,
            old_value: None,
            new_value: None,
        }
    }

    pub fn role(mut self, role_id: RoleId) -> Self {
        self.target_role_id = Some(role_id);
        self
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.target_user_id = Some(user_id);
        self
    }

    pub fn old_value(mut self, value: JsonValue) -> Self {
        self.old_value = Some(value);
        self
    }

    pub fn new_value(mut self, value: JsonValue) -> Self {
        self.new_value = Some(value);
        self
    }

    /// Stamp the entry as stored.
    pub fn recorded(self, id: Uuid, created_at: DateTime<Utc>) -> AuditLogEntry {
        AuditLogEntry {
            id,
            company_id: self.company_id,
            action: self.action,
            performed_by: self.performed_by,
            target_role_id: self.target_role_id,
            target_user_id: self.target_user_id,
            old_value: self.old_value,
            new_value: self.new_value,
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub company_id: CompanyId,
    pub action: AuditAction,
    pub performed_by: Actor,
    pub target_role_id: Option<RoleId>,
    pub target_user_id: Option<UserId>,
    pub old_value: Option<JsonValue>,
    pub new_value: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

/// Audit query filters. All set filters must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    #[serde(default)]
    pub action: Option<AuditAction>,
    #[serde(default)]
    pub target_user_id: Option<UserId>,
    #[serde(default)]
    pub target_role_id: Option<RoleId>,
    /// Inclusive lower bound on `created_at`.
    #[serde(default)]
    pub created_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    #[serde(default)]
    pub created_before: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.action.is_none_or(|a| a == entry.action)
            && self.target_user_id.is_none_or(|u| entry.target_user_id == Some(u))
            && self.target_role_id.is_none_or(|r| entry.target_role_id == Some(r))
            && self.created_after.is_none_or(|t| entry.created_at >= t)
            && self.created_before.is_none_or(|t| entry.created_at < t)
    }
}

/// Pagination parameters for audit queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of entries to return (default: 50, max: 1000).
    pub limit: usize,
    /// Number of entries to skip.
    pub offset: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub const MAX_LIMIT: usize = 1000;

    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            offset,
        }
    }
}

/// One page of audit entries, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditPage {
    pub entries: Vec<AuditLogEntry>,
    /// Total matching entries, before pagination.
    pub total: usize,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl AuditPage {
    pub fn new(entries: Vec<AuditLogEntry>, total: usize, pagination: Pagination) -> Self {
        let has_more = pagination.offset.saturating_add(entries.len()) < total;
        Self {
            entries,
            total,
            pagination,
            has_more,
        }
    }
}
