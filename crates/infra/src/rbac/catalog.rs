use std::sync::Arc;

use bizhub_auth::{CatalogEntry, CatalogGroup, PermissionRef, RbacError, group_catalog};
use bizhub_core::PermissionId;

use crate::store::RbacStore;

/// Read access to the module/permission registry.
pub struct PermissionCatalog<S> {
    store: Arc<S>,
}

impl<S> Clone for PermissionCatalog<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: RbacStore> PermissionCatalog<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Modules grouped by `module_group`, ordered by `sort_order`.
    pub async fn list(&self) -> Result<Vec<CatalogGroup>, RbacError> {
        Ok(group_catalog(self.store.list_catalog().await?))
    }

    pub async fn find(&self, permission_id: PermissionId) -> Result<CatalogEntry, RbacError> {
        self.store
            .find_permission(permission_id)
            .await?
            .ok_or_else(|| RbacError::not_found("permission"))
    }

    pub async fn find_by_key(&self, permission: &PermissionRef) -> Result<CatalogEntry, RbacError> {
        self.store
            .find_module_and_permission_by_keys(permission.module(), permission.permission())
            .await?
            .ok_or_else(|| RbacError::not_found("permission"))
    }
}
