use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use bizhub_auth::{AuditFilter, AuditLogEntry, AuditPage, NewAuditEntry, Pagination, Principal, RbacError, scoped_company};
use bizhub_core::{Clock, CompanyId};

use crate::store::{RbacStore, RbacTx, StoreError, StoreResult};

/// Append-only RBAC audit trail.
///
/// Entries are written through the caller's transaction so they commit or
/// roll back together with the mutation they describe.
pub struct AuditLog<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for AuditLog<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S: RbacStore> AuditLog<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn record(&self, tx: &S::Tx, entry: NewAuditEntry) -> Result<AuditLogEntry, RbacError> {
        let entry = entry.recorded(Uuid::now_v7(), self.clock.now());
        tx.append_audit_entry(&entry).await?;
        Ok(entry)
    }

    /// Newest first. Company users only ever see their own company.
    pub async fn query(
        &self,
        company_id: CompanyId,
        filter: &AuditFilter,
        pagination: Pagination,
        actor: &Principal,
    ) -> Result<AuditPage, RbacError> {
        scoped_company(actor, company_id)?;
        if let (Some(after), Some(before)) = (filter.created_after, filter.created_before) {
            if after > before {
                return Err(RbacError::bad_request("created_after must not be later than created_before"));
            }
        }
        Ok(self.store.query_audit_entries(company_id, filter, pagination).await?)
    }
}

/// Opaque JSON snapshot of a record.
pub(crate) fn snapshot<T: Serialize>(value: &T) -> StoreResult<JsonValue> {
    serde_json::to_value(value).map_err(|e| StoreError::Corrupt(format!("audit snapshot: {e}")))
}
