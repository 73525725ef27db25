//! Seeded in-memory world shared by the service tests.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use bizhub_auth::{
    Company, CompanyUser, Hs256JwtValidator, OwnerAccount, PermissionOverride, PermissionRef,
    Principal, Role, RoleAssignment, RolePermission, default_catalog,
};
use bizhub_core::{Clock, CompanyId, ManualClock, OwnerId, PermissionId, RoleId, UserId};

use super::RbacServices;
use crate::store::{InMemoryRbacStore, RbacReader, RbacStore, RbacTx};

pub(crate) const TEST_SECRET: &str = "rbac-test-secret";

pub(crate) struct Fixture {
    pub store: Arc<InMemoryRbacStore>,
    pub clock: Arc<ManualClock>,
    pub services: RbacServices<InMemoryRbacStore>,
    pub company_id: CompanyId,
    pub owner: Principal,
}

impl Fixture {
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryRbacStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        store.seed_catalog(default_catalog()).unwrap();

        let owner_id = OwnerId::new();
        store
            .insert_owner(OwnerAccount {
                id: owner_id,
                email: "owner@example.com".to_string(),
                is_active: true,
            })
            .unwrap();

        let company_id = CompanyId::new();
        store
            .insert_company(Company {
                id: company_id,
                owner_id,
                name: "Acme".to_string(),
                is_active: true,
                is_frozen: false,
            })
            .unwrap();

        let services = RbacServices::new(
            store.clone(),
            Arc::new(Hs256JwtValidator::new(TEST_SECRET)),
            clock.clone(),
        );

        Self {
            store,
            clock,
            services,
            company_id,
            owner: Principal::owner(owner_id),
        }
    }

    /// A fresh active role in the fixture company bound to `permissions`.
    pub async fn role_with(&self, permissions: &[&PermissionRef]) -> RoleId {
        let now = self.clock.now();
        let role = Role {
            id: RoleId::new(),
            company_id: self.company_id,
            role_key: format!("role_{}", Uuid::now_v7().simple()),
            role_name: "Test role".to_string(),
            description: None,
            parent_role_id: None,
            hierarchy_level: 0,
            is_system_role: false,
            is_active: true,
            created_by: self.owner.actor(),
            created_at: now,
            updated_at: now,
        };

        let tx = self.store.begin().await.unwrap();
        tx.insert_role(&role).await.unwrap();
        for permission in permissions {
            let permission_id = self.permission_id(permission).await;
            tx.insert_binding(&RolePermission {
                role_id: role.id,
                permission_id,
                can_grant: false,
                granted_by: self.owner.actor(),
                granted_at: now,
            })
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();
        role.id
    }

    pub async fn user_with_role(&self, role_id: Option<RoleId>) -> Principal {
        self.insert_user(UserId::new(), self.company_id, role_id)
    }

    /// A company user whose id equals the company's registered owner id.
    pub async fn legacy_owner_user(&self) -> Principal {
        let owner_uuid = self.owner.subject();
        self.insert_user(UserId::from_uuid(owner_uuid), self.company_id, None)
    }

    /// An active user of a second, unrelated company.
    pub async fn user_in_other_company(&self) -> Principal {
        let company_id = CompanyId::new();
        self.store
            .insert_company(Company {
                id: company_id,
                owner_id: OwnerId::new(),
                name: "Globex".to_string(),
                is_active: true,
                is_frozen: false,
            })
            .unwrap();
        self.insert_user(UserId::new(), company_id, None)
    }

    pub fn user_id(&self, principal: &Principal) -> UserId {
        principal.user_id().unwrap()
    }

    pub async fn permission_id(&self, permission: &PermissionRef) -> PermissionId {
        self.store
            .find_module_and_permission_by_keys(permission.module(), permission.permission())
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("{permission} not in catalog"))
            .permission
            .id
    }

    pub async fn grant_override(&self, principal: &Principal, permission: &PermissionRef, expires_in: Option<Duration>) {
        let now = self.clock.now();
        let entry = PermissionOverride {
            user_id: self.user_id(principal),
            permission_id: self.permission_id(permission).await,
            is_granted: true,
            expires_at: expires_in.map(|d| now + d),
            override_reason: None,
            overridden_by: self.owner.actor(),
            created_at: now,
        };

        let tx = self.store.begin().await.unwrap();
        tx.upsert_override(&entry).await.unwrap();
        tx.commit().await.unwrap();
    }

    /// Flip the delegation flag on an existing binding.
    pub async fn set_can_grant(&self, role_id: RoleId, permission_id: PermissionId) {
        let tx = self.store.begin().await.unwrap();
        let mut binding = tx
            .find_binding(role_id, permission_id)
            .await
            .unwrap()
            .expect("binding exists");
        binding.can_grant = true;
        tx.delete_bindings(role_id, &[permission_id]).await.unwrap();
        tx.insert_binding(&binding).await.unwrap();
        tx.commit().await.unwrap();
    }

    fn insert_user(&self, user_id: UserId, company_id: CompanyId, role_id: Option<RoleId>) -> Principal {
        let assignment = role_id.map(|role_id| RoleAssignment {
            role_id,
            assigned_at: Utc::now(),
            assigned_by: self.owner.actor(),
        });
        let user = CompanyUser {
            id: user_id,
            company_id,
            email: format!("{user_id}@example.com"),
            assigned_role_id: None,
            role_assigned_at: None,
            role_assigned_by: None,
            is_active: true,
        }
        .with_assignment(assignment);
        self.store.insert_user(user).unwrap();
        Principal::company_user(user_id, company_id)
    }
}
