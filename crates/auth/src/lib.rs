//! `bizhub-auth` — pure authentication/authorization model.
//!
//! This crate is decoupled from HTTP and storage: it defines who is asking
//! (`Principal`), what can be asked for (`PermissionRef`, catalog records),
//! the RBAC records the engine reads and writes, and the error taxonomy
//! every gate reports through.

pub mod audit;
pub mod authorize;
pub mod catalog;
pub mod claims;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod overrides;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod token;
pub mod user;

pub use audit::{AuditAction, AuditFilter, AuditLogEntry, AuditPage, NewAuditEntry, Pagination};
pub use authorize::{EffectivePermissions, is_owner_of, scoped_company};
pub use catalog::{
    CatalogEntry, CatalogGroup, CatalogModule, Module, Permission, default_catalog, group_catalog,
};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use config::AuthConfig;
pub use error::{AuthError, Denial, DenialCode, RbacError};
pub use hierarchy::{RoleNode, build_hierarchy};
pub use overrides::{GrantOverride, OverrideView, PermissionOverride};
pub use permissions::{PermissionRef, WILDCARD_KEY};
pub use principal::{Actor, Principal, PrincipalKind};
pub use roles::{
    AssignOutcome, BoundPermission, CloneRole, CreateRole, RevokeOutcome, Role, RoleComparison,
    RoleDetail, RolePatch, RolePermission, RoleSummary, SkipReason, SkippedPermission,
    validate_role_key, validate_role_name,
};
pub use token::{Hs256JwtIssuer, Hs256JwtValidator, JwtValidator, TokenIssueError};
pub use user::{Company, CompanyUser, OwnerAccount, RoleAssignment};
