use std::sync::Arc;

use bizhub_auth::JwtValidator;
use bizhub_core::Clock;

use super::{
    AssignmentService, AuditLog, Gatekeeper, OverrideService, PermissionCatalog,
    PermissionResolver, PrincipalResolver, RoleService,
};
use crate::store::RbacStore;

/// Every RBAC service wired over one store and one clock.
pub struct RbacServices<S> {
    principals: PrincipalResolver<S>,
    resolver: PermissionResolver<S>,
    gate: Gatekeeper<S>,
    roles: RoleService<S>,
    overrides: OverrideService<S>,
    assignments: AssignmentService<S>,
    audit: AuditLog<S>,
    catalog: PermissionCatalog<S>,
}

impl<S> Clone for RbacServices<S> {
    fn clone(&self) -> Self {
        Self {
            principals: self.principals.clone(),
            resolver: self.resolver.clone(),
            gate: self.gate.clone(),
            roles: self.roles.clone(),
            overrides: self.overrides.clone(),
            assignments: self.assignments.clone(),
            audit: self.audit.clone(),
            catalog: self.catalog.clone(),
        }
    }
}

impl<S: RbacStore> RbacServices<S> {
    pub fn new(store: Arc<S>, validator: Arc<dyn JwtValidator>, clock: Arc<dyn Clock>) -> Self {
        let resolver = PermissionResolver::new(store.clone(), clock.clone());
        let audit = AuditLog::new(store.clone(), clock.clone());

        Self {
            principals: PrincipalResolver::new(validator, store.clone(), clock.clone()),
            gate: Gatekeeper::new(store.clone(), resolver.clone()),
            roles: RoleService::new(store.clone(), clock.clone(), resolver.clone(), audit.clone()),
            overrides: OverrideService::new(store.clone(), clock.clone(), resolver.clone(), audit.clone()),
            assignments: AssignmentService::new(store.clone(), clock, resolver.clone(), audit.clone()),
            catalog: PermissionCatalog::new(store),
            resolver,
            audit,
        }
    }

    pub fn principals(&self) -> &PrincipalResolver<S> {
        &self.principals
    }

    pub fn resolver(&self) -> &PermissionResolver<S> {
        &self.resolver
    }

    pub fn gate(&self) -> &Gatekeeper<S> {
        &self.gate
    }

    pub fn roles(&self) -> &RoleService<S> {
        &self.roles
    }

    pub fn overrides(&self) -> &OverrideService<S> {
        &self.overrides
    }

    pub fn assignments(&self) -> &AssignmentService<S> {
        &self.assignments
    }

    pub fn audit(&self) -> &AuditLog<S> {
        &self.audit
    }

    pub fn catalog(&self) -> &PermissionCatalog<S> {
        &self.catalog
    }
}
