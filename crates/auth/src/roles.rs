use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier used for RBAC.
///
/// Roles are opaque strings in tokens; [`permissions_for_roles`] maps them to
/// permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static role→permission policy. Unknown roles grant nothing.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    let mut out = Vec::new();
    for role in roles {
        let granted: &[&'static str] = match role.as_str() {
            "admin" => &["*"],
            "inventory_manager" => &["inventory.*"],
            "inventory_clerk" => &["inventory.read", "inventory.write"],
            "accountant" => &["accounting.*", "inventory.read"],
            _ => &[],
        };
        for name in granted {
            let perm = Permission::new(*name);
            if !out.contains(&perm) {
                out.push(perm);
            }
        }
    }
    out
}
