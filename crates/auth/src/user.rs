//! Identity records the authorization core reads.
//!
//! Owners, companies and company users are created and maintained by the
//! surrounding system (signup, company setup, user management). This crate
//! only reads them, and only ever writes the role assignment columns of a
//! [`CompanyUser`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bizhub_core::{CompanyId, OwnerId, RoleId, UserId};

use crate::Actor;

/// A super-user account outside every company's user table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerAccount {
    pub id: OwnerId,
    pub email: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    /// Registered owner; consulted by the legacy owner-equivalence checks.
    pub owner_id: OwnerId,
    pub name: String,
    pub is_active: bool,
    /// Suspended companies block every operation except the owner's.
    pub is_frozen: bool,
}

/// A user belonging to exactly one company, holding at most one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyUser {
    pub id: UserId,
    pub company_id: CompanyId,
    pub email: String,
    pub assigned_role_id: Option<RoleId>,
    pub role_assigned_at: Option<DateTime<Utc>>,
    pub role_assigned_by: Option<Actor>,
    pub is_active: bool,
}

impl CompanyUser {
    pub fn assignment(&self) -> Option<RoleAssignment> {
        Some(RoleAssignment {
            role_id: self.assigned_role_id?,
            assigned_at: self.role_assigned_at?,
            assigned_by: self.role_assigned_by?,
        })
    }

    /// Copy of this user with the assignment columns replaced.
    pub fn with_assignment(&self, assignment: Option<RoleAssignment>) -> Self {
        let mut user = self.clone();
        user.assigned_role_id = assignment.map(|a| a.role_id);
        user.role_assigned_at = assignment.map(|a| a.assigned_at);
        user.role_assigned_by = assignment.map(|a| a.assigned_by);
        user
    }
}

/// The three columns written together by role assignment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role_id: RoleId,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: Actor,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> CompanyUser {
        CompanyUser {
            id: UserId::new(),
            company_id: CompanyId::new(),
            email: "clerk@example.com".to_string(),
            assigned_role_id: None,
            role_assigned_at: None,
            role_assigned_by: None,
            is_active: true,
        }
    }

    #[test]
    fn assignment_columns_move_together() {
        let assignment = RoleAssignment {
            role_id: RoleId::new(),
            assigned_at: Utc::now(),
            assigned_by: Actor::Owner(OwnerId::new()),
        };

        let assigned = user().with_assignment(Some(assignment));
        assert_eq!(assigned.assignment(), Some(assignment));

        let cleared = assigned.with_assignment(None);
        assert_eq!(cleared.assigned_role_id, None);
        assert_eq!(cleared.role_assigned_at, None);
        assert_eq!(cleared.role_assigned_by, None);
    }
}
