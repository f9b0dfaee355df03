//! Tenant Scoping
//! Mission: An admin sees its own leagues; a super-admin sees them all
//!
//! Built once per request from the validated JWT claims and consulted
//! before any league data is touched.

use crate::auth::models::{Claims, UserRole};
use crate::models::League;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantScope {
    /// Super-admin: every league.
    All,
    /// Regular admin: only leagues whose owner matches this username.
    Owned(String),
}

impl TenantScope {
    pub fn from_claims(claims: &Claims) -> Self {
        match claims.role {
            UserRole::SuperAdmin => TenantScope::All,
            UserRole::Admin => TenantScope::Owned(claims.username.clone()),
        }
    }

    pub fn allows(&self, league: &League) -> bool {
        match self {
            TenantScope::All => true,
            TenantScope::Owned(owner) => league.owner == *owner,
        }
    }
}
