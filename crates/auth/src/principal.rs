use serde::{Deserialize, Serialize};

use stockwise_core::{DomainError, TenantId, UserId};

use crate::{Permission, Role, permissions_for_roles};

/// Token subject. Every principal acts as a user, so this is the same id that
/// ends up in audit stamps and on document `created_by` / `approved_by` fields.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(UserId);

impl PrincipalId {
    pub fn new() -> Self {
        Self(UserId::new())
    }

    pub fn user_id(&self) -> UserId {
        self.0
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<UserId> for PrincipalId {
    fn from(user: UserId) -> Self {
        Self(user)
    }
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

impl core::str::FromStr for PrincipalId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Roles held in one tenant, with the permissions they expand to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub tenant_id: TenantId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl TenantMembership {
    pub fn from_roles(tenant_id: TenantId, roles: Vec<Role>) -> Self {
        let permissions = permissions_for_roles(&roles);
        Self {
            tenant_id,
            roles,
            permissions,
        }
    }

    pub fn grants(&self, required: &Permission) -> bool {
        self.permissions.iter().any(|p| p.grants(required))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_is_the_audit_user() {
        let user = UserId::new();
        let principal = PrincipalId::from(user);
        assert_eq!(principal.user_id(), user);
        assert_eq!(principal.to_string(), user.to_string());
        assert!("nope".parse::<PrincipalId>().is_err());
    }

    #[test]
    fn membership_expands_roles() {
        let m = TenantMembership::from_roles(TenantId::new(), vec![Role::new("inventory_manager")]);
        assert!(m.grants(&Permission::INVENTORY_APPROVE));
        assert!(!m.grants(&Permission::ACCOUNTING_POST));
    }
}
