//! Static registry of modules and the permissions they expose.
//!
//! Catalog rows are created by setup/migrations and are essentially
//! immutable at runtime; everything else references them by key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use bizhub_core::{ModuleId, PermissionId};

use crate::PermissionRef;

/// A named functional area (e.g. "products", "payments").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub module_key: String,
    pub module_name: String,
    pub module_group: String,
    pub sort_order: i32,
    pub is_active: bool,
}

/// An action within exactly one module (e.g. "create_product").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub module_id: ModuleId,
    pub permission_key: String,
    pub permission_name: String,
    pub description: Option<String>,
    pub is_active: bool,
}

/// A permission together with the module that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub module: Module,
    pub permission: Permission,
}

impl CatalogEntry {
    pub fn reference(&self) -> PermissionRef {
        PermissionRef::new(
            self.module.module_key.clone(),
            self.permission.permission_key.clone(),
        )
    }

    /// Both the module and the permission are switched on.
    pub fn is_active(&self) -> bool {
        self.module.is_active && self.permission.is_active
    }
}

/// A module with its permissions, as listed to administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogModule {
    pub module: Module,
    pub permissions: Vec<Permission>,
}

/// UI grouping of modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogGroup {
    pub group: String,
    pub modules: Vec<CatalogModule>,
}

/// Group modules by `module_group`, modules ordered by `sort_order` then key.
pub fn group_catalog(mut modules: Vec<CatalogModule>) -> Vec<CatalogGroup> {
    modules.sort_by(|a, b| {
        a.module
            .sort_order
            .cmp(&b.module.sort_order)
            .then_with(|| a.module.module_key.cmp(&b.module.module_key))
    });

    let mut order: Vec<String> = Vec::new();
    let mut groups: BTreeMap<String, Vec<CatalogModule>> = BTreeMap::new();
    for m in modules {
        let group = m.module.module_group.clone();
        if !groups.contains_key(&group) {
            order.push(group.clone());
        }
        groups.entry(group).or_default().push(m);
    }

    order
        .into_iter()
        .filter_map(|group| {
            let modules = groups.remove(&group)?;
            Some(CatalogGroup { group, modules })
        })
        .collect()
}

struct ModuleSeed {
    key: &'static str,
    name: &'static str,
    group: &'static str,
    permissions: &'static [(&'static str, &'static str)],
}

const SEED: &[ModuleSeed] = &[
    ModuleSeed {
        key: "companies",
        name: "Company Settings",
        group: "Administration",
        permissions: &[
            ("view_company", "View company profile"),
            ("edit_company", "Edit company profile"),
        ],
    },
    ModuleSeed {
        key: "users",
        name: "Users",
        group: "Administration",
        permissions: &[
            ("view_users", "View users"),
            ("create_user", "Create users"),
            ("edit_user", "Edit users"),
            ("delete_user", "Delete users"),
            ("assign_roles", "Assign roles to users"),
            ("manage_permissions", "Grant temporary permission overrides"),
        ],
    },
    ModuleSeed {
        key: "roles",
        name: "Roles & Permissions",
        group: "Administration",
        permissions: &[
            ("view_roles", "View roles"),
            ("manage_roles", "Create, edit and delete roles"),
            ("view_audit_log", "View the permission audit log"),
        ],
    },
    ModuleSeed {
        key: "clients",
        name: "Clients",
        group: "Sales",
        permissions: &[
            ("view_clients", "View clients"),
            ("create_client", "Create clients"),
            ("edit_client", "Edit clients"),
            ("delete_client", "Delete clients"),
        ],
    },
    ModuleSeed {
        key: "orders",
        name: "Orders",
        group: "Sales",
        permissions: &[
            ("view_orders", "View own orders"),
            ("view_all_orders", "View all orders"),
            ("create_order", "Create orders"),
            ("edit_order", "Edit orders"),
            ("delete_order", "Delete orders"),
        ],
    },
    ModuleSeed {
        key: "products",
        name: "Products",
        group: "Sales",
        permissions: &[
            ("view_products", "View products"),
            ("create_product", "Create products"),
            ("edit_product", "Edit products"),
            ("delete_product", "Delete products"),
        ],
    },
    ModuleSeed {
        key: "bills",
        name: "Bills",
        group: "Finance",
        permissions: &[
            ("view_bills", "View bills"),
            ("create_bill", "Create bills"),
            ("edit_bill", "Edit bills"),
            ("delete_bill", "Delete bills"),
        ],
    },
    ModuleSeed {
        key: "payments",
        name: "Payments",
        group: "Finance",
        permissions: &[
            ("view_payments", "View payments"),
            ("record_payment", "Record payments"),
            ("refund_payment", "Refund payments"),
        ],
    },
    ModuleSeed {
        key: "employees",
        name: "Employees",
        group: "People",
        permissions: &[
            ("view_employees", "View employees"),
            ("create_employee", "Create employees"),
            ("edit_employee", "Edit employees"),
            ("delete_employee", "Delete employees"),
        ],
    },
    ModuleSeed {
        key: "salaries",
        name: "Salaries",
        group: "People",
        permissions: &[
            ("view_salaries", "View salaries"),
            ("manage_salaries", "Create and edit salaries"),
        ],
    },
    ModuleSeed {
        key: "reports",
        name: "Reports",
        group: "Insights",
        permissions: &[("view_reports", "View reports"), ("export_reports", "Export reports")],
    },
];

/// The system's module/permission catalog with freshly generated ids.
///
/// Loaded into the in-memory store directly; the Postgres store upserts the
/// same keys at startup, keeping ids already on disk.
pub fn default_catalog() -> Vec<CatalogModule> {
    SEED.iter()
        .enumerate()
        .map(|(idx, seed)| {
            let module = Module {
                id: ModuleId::new(),
                module_key: seed.key.to_string(),
                module_name: seed.name.to_string(),
                module_group: seed.group.to_string(),
                sort_order: (idx as i32 + 1) * 10,
                is_active: true,
            };
            let permissions = seed
                .permissions
                .iter()
                .map(|(key, name)| Permission {
                    id: PermissionId::new(),
                    module_id: module.id,
                    permission_key: key.to_string(),
                    permission_name: name.to_string(),
                    description: None,
                    is_active: true,
                })
                .collect();
            CatalogModule {
                module,
                permissions,
            }
        })
        .collect()
}
