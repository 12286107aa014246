use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockwise_core::TenantId;

use crate::{PrincipalId, Role};

/// How far ahead of our clock a token's `issued_at` may be, in seconds.
pub const CLOCK_SKEW_SECS: i64 = 30;

/// Verified bearer token contents. One token speaks for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: PrincipalId,
    pub tenant_id: TenantId,
    pub roles: Vec<Role>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl JwtClaims {
    pub fn issue(sub: PrincipalId, tenant_id: TenantId, roles: Vec<Role>, ttl: Duration) -> Self {
        let issued_at = Utc::now();
        Self {
            sub,
            tenant_id,
            roles,
            issued_at,
            expires_at: issued_at + ttl,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token expired at {0}")]
    Expired(DateTime<Utc>),

    #[error("token issued in the future ({0})")]
    NotYetValid(DateTime<Utc>),

    #[error("token expires before it is issued")]
    InvalidTimeWindow,
}

/// Time-window check on already-verified claims. `issued_at` gets
/// [`CLOCK_SKEW_SECS`] of slack; `expires_at` gets none.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        Err(TokenValidationError::InvalidTimeWindow)
    } else if claims.issued_at > now + Duration::seconds(CLOCK_SKEW_SECS) {
        Err(TokenValidationError::NotYetValid(claims.issued_at))
    } else if now >= claims.expires_at {
        Err(TokenValidationError::Expired(claims.expires_at))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(issued: DateTime<Utc>, ttl: Duration) -> JwtClaims {
        JwtClaims {
            sub: PrincipalId::new(),
            tenant_id: TenantId::new(),
            roles: vec![Role::new("inventory_clerk")],
            issued_at: issued,
            expires_at: issued + ttl,
        }
    }

    #[test]
    fn time_window_is_enforced() {
        let now = Utc::now();
        assert!(validate_claims(&claims(now, Duration::minutes(5)), now).is_ok());
        assert!(matches!(
            validate_claims(&claims(now - Duration::hours(1), Duration::minutes(5)), now),
            Err(TokenValidationError::Expired(_))
        ));
        assert!(matches!(
            validate_claims(&claims(now + Duration::hours(1), Duration::hours(2)), now),
            Err(TokenValidationError::NotYetValid(_))
        ));
        assert_eq!(
            validate_claims(&claims(now, Duration::zero()), now),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }

    #[test]
    fn small_clock_skew_is_tolerated() {
        let now = Utc::now();
        let ahead = claims(now + Duration::seconds(10), Duration::minutes(5));
        assert!(validate_claims(&ahead, now).is_ok());
    }

    #[test]
    fn issue_sets_the_window_from_ttl() {
        let c = JwtClaims::issue(
            PrincipalId::new(),
            TenantId::new(),
            vec![Role::new("accountant")],
            Duration::minutes(10),
        );
        assert_eq!(c.expires_at - c.issued_at, Duration::minutes(10));
        assert!(validate_claims(&c, Utc::now()).is_ok());
    }
}
