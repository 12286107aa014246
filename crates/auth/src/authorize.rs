use thiserror::Error;

use stockwise_core::{TenantId, UserId};

use crate::{JwtClaims, Permission, PrincipalId, Role, TenantMembership};

/// A fully resolved principal for authorization decisions.
///
/// Construction of this object is intentionally decoupled from storage and
/// transport: the API derives memberships from verified claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

impl Principal {
    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self {
            principal_id: claims.sub,
            active_tenant_id: claims.tenant_id,
            membership: TenantMembership::from_roles(claims.tenant_id, claims.roles.clone()),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.principal_id.user_id()
    }

    pub fn roles(&self) -> &[Role] {
        &self.membership.roles
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal within its active tenant context.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    if principal.membership.grants(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}
