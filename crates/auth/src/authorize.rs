use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use bizhub_core::CompanyId;

use crate::{Company, PermissionRef, Principal, RbacError, WILDCARD_KEY};

/// A principal's resolved permission set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "permissions", rename_all = "snake_case")]
pub enum EffectivePermissions {
    /// Owner bypass.
    All,
    Keys(BTreeSet<PermissionRef>),
}

impl EffectivePermissions {
    pub fn contains(&self, permission: &PermissionRef) -> bool {
        match self {
            EffectivePermissions::All => true,
            EffectivePermissions::Keys(keys) => keys.contains(permission),
        }
    }

    /// Flat `"module.permission"` keys, or `["*.*"]` for owners.
    pub fn keys(&self) -> Vec<String> {
        match self {
            EffectivePermissions::All => vec![WILDCARD_KEY.to_string()],
            EffectivePermissions::Keys(keys) => keys.iter().map(PermissionRef::key).collect(),
        }
    }
}

/// Check that `principal` may act inside `company_id`.
///
/// Owners bypass company scoping. A company user asking about another
/// company sees `NotFound` rather than a denial.
pub fn scoped_company(principal: &Principal, company_id: CompanyId) -> Result<(), RbacError> {
    match principal {
        Principal::Owner { .. } => Ok(()),
        Principal::CompanyUser {
            company_id: own, ..
        } if *own == company_id => Ok(()),
        Principal::CompanyUser { .. } => Err(RbacError::not_found("company")),
    }
}

/// Owner kind, or the registered owner of `company` (legacy equivalence).
pub fn is_owner_of(principal: &Principal, company: &Company) -> bool {
    match principal {
        Principal::Owner { .. } => true,
        Principal::CompanyUser { user_id, .. } => user_id.as_uuid() == company.owner_id.as_uuid(),
    }
}
