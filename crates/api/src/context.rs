use stockwise_auth::{JwtClaims, Principal, PrincipalId, Role};
use stockwise_core::{TenantId, UserId};
use stockwise_infra::ServiceContext;

/// Tenant the request operates in. Always the token's tenant; there is no
/// header or path override.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext(TenantId);

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self(tenant_id)
    }

    pub fn tenant_id(&self) -> TenantId {
        self.0
    }
}

/// Caller resolved from verified claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext(Principal);

impl PrincipalContext {
    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self(Principal::from_claims(claims))
    }

    pub fn principal(&self) -> &Principal {
        &self.0
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.0.principal_id
    }

    pub fn user_id(&self) -> UserId {
        self.0.user_id()
    }

    pub fn roles(&self) -> &[Role] {
        self.0.roles()
    }
}

pub fn service_context(tenant: &TenantContext, principal: &PrincipalContext) -> ServiceContext {
    ServiceContext::new(tenant.tenant_id(), Some(principal.user_id()))
}
