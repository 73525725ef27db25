//! Display-only role tree built from `parent_role_id` links.
//!
//! Nothing here implies permission inheritance.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use bizhub_core::RoleId;

use crate::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleNode {
    #[serde(flatten)]
    pub role: Role,
    pub children: Vec<RoleNode>,
}

/// Build a forest from a company's roles.
///
/// Roots are roles whose parent is null or does not resolve among `roles`.
/// Roles caught in a parent cycle are unreachable from any root; each such
/// cycle is broken at its first-seen member, which becomes an extra root, so
/// every role appears exactly once. Siblings are ordered by
/// `(hierarchy_level, role_name)`.
pub fn build_hierarchy(roles: Vec<Role>) -> Vec<RoleNode> {
    let known: HashSet<RoleId> = roles.iter().map(|r| r.id).collect();

    let mut children: HashMap<RoleId, Vec<Role>> = HashMap::new();
    let mut roots: Vec<Role> = Vec::new();
    for role in roles {
        match role.parent_role_id {
            Some(parent) if known.contains(&parent) && parent != role.id => {
                children.entry(parent).or_default().push(role)
            }
            _ => roots.push(role),
        }
    }

    let mut visited: HashSet<RoleId> = HashSet::new();
    sort_siblings(&mut roots);
    let mut forest: Vec<RoleNode> = roots
        .into_iter()
        .map(|r| attach(r, &mut children, &mut visited))
        .collect();

    // Whatever is left is only reachable through a cycle.
    while let Some(parent) = next_orphan(&children) {
        let Some(mut members) = children.remove(&parent) else {
            break;
        };
        sort_siblings(&mut members);
        for role in members {
            if !visited.contains(&role.id) {
                forest.push(attach(role, &mut children, &mut visited));
            }
        }
    }

    forest
}

fn next_orphan(children: &HashMap<RoleId, Vec<Role>>) -> Option<RoleId> {
    children
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, _)| *k)
        .min()
}

fn attach(
    role: Role,
    children: &mut HashMap<RoleId, Vec<Role>>,
    visited: &mut HashSet<RoleId>,
) -> RoleNode {
    visited.insert(role.id);

    let mut kids = children.remove(&role.id).unwrap_or_default();
    sort_siblings(&mut kids);
    let mut nodes = Vec::with_capacity(kids.len());
    for kid in kids {
        if !visited.contains(&kid.id) {
            nodes.push(attach(kid, children, visited));
        }
    }

    RoleNode {
        role,
        children: nodes,
    }
}

fn sort_siblings(roles: &mut [Role]) {
    roles.sort_by(|a, b| {
        a.hierarchy_level
            .cmp(&b.hierarchy_level)
            .then_with(|| a.role_name.cmp(&b.role_name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizhub_core::{CompanyId, OwnerId};
    use chrono::Utc;

    use crate::Actor;

    fn role(name: &str, level: i32, parent: Option<RoleId>) -> Role {
        let now = Utc::now();
        Role {
            id: RoleId::new(),
            company_id: CompanyId::new(),
            role_key: name.to_lowercase(),
            role_name: name.to_string(),
            description: None,
            parent_role_id: parent,
            hierarchy_level: level,
            is_system_role: false,
            is_active: true,
            created_by: Actor::Owner(OwnerId::new()),
            created_at: now,
            updated_at: now,
        }
    }

    fn count(nodes: &[RoleNode]) -> usize {
        nodes.iter().map(|n| 1 + count(&n.children)).sum()
    }

    #[test]
    fn builds_forest_from_parent_links() {
        let admin = role("Admin", 0, None);
        let manager = role("Manager", 1, Some(admin.id));
        let clerk = role("Clerk", 2, Some(manager.id));
        let auditor = role("Auditor", 0, None);

        let forest = build_hierarchy(vec![clerk, manager, admin, auditor]);

        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].role.role_name, "Admin");
        assert_eq!(forest[1].role.role_name, "Auditor");
        assert_eq!(forest[0].children[0].role.role_name, "Manager");
        assert_eq!(forest[0].children[0].children[0].role.role_name, "Clerk");
    }

    #[test]
    fn dangling_parent_becomes_root() {
        let orphan = role("Orphan", 3, Some(RoleId::new()));
        let forest = build_hierarchy(vec![orphan]);
        assert_eq!(forest.len(), 1);
        assert!(forest[0].children.is_empty());
    }

    #[test]
    fn cycles_do_not_lose_roles() {
        let mut a = role("A", 0, None);
        let b = role("B", 0, Some(a.id));
        a.parent_role_id = Some(b.id);
        let root = role("Root", 0, None);

        let forest = build_hierarchy(vec![a, b, root]);
        assert_eq!(count(&forest), 3);
    }

    #[test]
    fn self_parent_is_a_root() {
        let mut a = role("Loop", 0, None);
        a.parent_role_id = Some(a.id);
        let forest = build_hierarchy(vec![a]);
        assert_eq!(forest.len(), 1);
    }
}
