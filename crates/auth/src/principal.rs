use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bizhub_core::{CompanyId, OwnerId, UserId};

/// Which identity space a principal comes from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    Owner,
    CompanyUser,
}

impl PrincipalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::Owner => "owner",
            PrincipalKind::CompanyUser => "company_user",
        }
    }
}

impl core::fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved identity of the caller for one request.
///
/// Constructed fresh per request from a verified credential and never
/// persisted. Owners live outside every company's user table, so the two
/// shapes are kept apart at the type level and every consumer has to match
/// on both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    Owner {
        owner_id: OwnerId,
        is_active: bool,
    },
    CompanyUser {
        user_id: UserId,
        company_id: CompanyId,
        is_active: bool,
    },
}

impl Principal {
    pub fn owner(owner_id: OwnerId) -> Self {
        Principal::Owner {
            owner_id,
            is_active: true,
        }
    }

    pub fn company_user(user_id: UserId, company_id: CompanyId) -> Self {
        Principal::CompanyUser {
            user_id,
            company_id,
            is_active: true,
        }
    }

    pub fn kind(&self) -> PrincipalKind {
        match self {
            Principal::Owner { .. } => PrincipalKind::Owner,
            Principal::CompanyUser { .. } => PrincipalKind::CompanyUser,
        }
    }

    pub fn is_owner(&self) -> bool {
        matches!(self, Principal::Owner { .. })
    }

    pub fn is_active(&self) -> bool {
        match self {
            Principal::Owner { is_active, .. } | Principal::CompanyUser { is_active, .. } => {
                *is_active
            }
        }
    }

    /// Owning company; `None` for owners.
    pub fn company_id(&self) -> Option<CompanyId> {
        match self {
            Principal::Owner { .. } => None,
            Principal::CompanyUser { company_id, .. } => Some(*company_id),
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Principal::Owner { .. } => None,
            Principal::CompanyUser { user_id, .. } => Some(*user_id),
        }
    }

    /// Raw subject identifier, regardless of identity space.
    pub fn subject(&self) -> Uuid {
        match self {
            Principal::Owner { owner_id, .. } => *owner_id.as_uuid(),
            Principal::CompanyUser { user_id, .. } => *user_id.as_uuid(),
        }
    }

    /// The actor recorded in audit entries and `*_by` columns.
    pub fn actor(&self) -> Actor {
        match self {
            Principal::Owner { owner_id, .. } => Actor::Owner(*owner_id),
            Principal::CompanyUser { user_id, .. } => Actor::User(*user_id),
        }
    }
}

/// Who performed a mutation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Owner(OwnerId),
    User(UserId),
}

impl Actor {
    pub fn kind(&self) -> PrincipalKind {
        match self {
            Actor::Owner(_) => PrincipalKind::Owner,
            Actor::User(_) => PrincipalKind::CompanyUser,
        }
    }

    pub fn as_uuid(&self) -> Uuid {
        match self {
            Actor::Owner(id) => *id.as_uuid(),
            Actor::User(id) => *id.as_uuid(),
        }
    }

    /// Rebuild an actor from its storage columns (`kind`, `id`).
    pub fn from_parts(kind: &str, id: Uuid) -> Option<Self> {
        match kind {
            "owner" => Some(Actor::Owner(OwnerId::from_uuid(id))),
            "company_user" => Some(Actor::User(UserId::from_uuid(id))),
            _ => None,
        }
    }
}

impl core::fmt::Display for Actor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.as_uuid())
    }
}
