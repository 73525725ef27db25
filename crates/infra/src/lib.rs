//! Infrastructure layer: RBAC storage backends and the services running on them.

pub mod rbac;
pub mod store;

pub use rbac::{
    AssignmentService, AuditLog, Gatekeeper, OverrideService, PermissionCatalog,
    PermissionResolver, PrincipalResolver, RbacServices, RoleService,
};
pub use store::{
    InMemoryRbacStore, PostgresRbacStore, RbacReader, RbacStore, RbacTx, StoreError, StoreResult,
};
