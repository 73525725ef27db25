//! The RBAC engine: principal resolution, permission resolution, the
//! authorization gates and the management services built on them.

mod assignment;
mod audit;
mod catalog;
mod gate;
mod overrides;
mod principal;
mod resolver;
mod roles;
mod services;

#[cfg(test)]
mod test_support;

pub use assignment::AssignmentService;
pub use audit::AuditLog;
pub use catalog::PermissionCatalog;
pub use gate::Gatekeeper;
pub use overrides::OverrideService;
pub use principal::PrincipalResolver;
pub use resolver::PermissionResolver;
pub use roles::RoleService;
pub use services::RbacServices;
