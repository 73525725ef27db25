use std::borrow::Cow;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use bizhub_core::DomainError;

/// Flat `<module>.<permission>` key exposed to UI consumers for owners.
pub const WILDCARD_KEY: &str = "*.*";

/// Reference to a catalog permission by its stable keys.
///
/// Permissions are flat `(module_key, permission_key)` pairs, rendered as
/// `"module.permission"` (e.g. `"products.create_product"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionRef {
    pub module: Cow<'static, str>,
    pub permission: Cow<'static, str>,
}

impl PermissionRef {
    pub const fn from_static(module: &'static str, permission: &'static str) -> Self {
        Self {
            module: Cow::Borrowed(module),
            permission: Cow::Borrowed(permission),
        }
    }

    pub fn new(module: impl Into<Cow<'static, str>>, permission: impl Into<Cow<'static, str>>) -> Self {
        Self {
            module: module.into(),
            permission: permission.into(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn permission(&self) -> &str {
        &self.permission
    }

    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl core::fmt::Display for PermissionRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.module, self.permission)
    }
}

impl FromStr for PermissionRef {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (module, permission) = s
            .split_once('.')
            .ok_or_else(|| DomainError::validation(format!("permission key '{s}' must be 'module.permission'")))?;

        if module.is_empty() || permission.is_empty() || permission.contains('.') {
            return Err(DomainError::validation(format!(
                "permission key '{s}' must be 'module.permission'"
            )));
        }

        Ok(Self::new(module.to_string(), permission.to_string()))
    }
}

/// Permissions the RBAC management surface itself is gated on.
pub mod rbac {
    use super::PermissionRef;

    pub const VIEW_ROLES: PermissionRef = PermissionRef::from_static("roles", "view_roles");
    pub const MANAGE_ROLES: PermissionRef = PermissionRef::from_static("roles", "manage_roles");
    pub const VIEW_AUDIT_LOG: PermissionRef = PermissionRef::from_static("roles", "view_audit_log");
    pub const VIEW_USERS: PermissionRef = PermissionRef::from_static("users", "view_users");
    pub const ASSIGN_ROLES: PermissionRef = PermissionRef::from_static("users", "assign_roles");
    pub const MANAGE_OVERRIDES: PermissionRef =
        PermissionRef::from_static("users", "manage_permissions");
}
