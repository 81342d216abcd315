//! Process-local token revocation
//!
//! Tokens are stateless, so logout alone cannot invalidate them. The list
//! stores an issued-at cutoff per principal, in milliseconds: any token for
//! that principal issued at or before the cutoff is refused. Entries are
//! dropped once every token they could match has expired anyway.

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info};

use super::{Role, TenantId, TokenClaims, TOKEN_TTL_SECS};

const TOKEN_TTL_MILLIS: i64 = TOKEN_TTL_SECS * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Principal {
    tenant_id: i64,
    user_id: i64,
    role: Role,
}

/// Revocation cutoffs keyed by (tenant, user, role)
#[derive(Debug, Default)]
pub struct RevocationList {
    cutoffs: DashMap<Principal, i64>,
}

impl RevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke every token issued to the principal up to now
    pub fn revoke(&self, tenant_id: TenantId, user_id: i64, role: Role) {
        self.revoke_at(tenant_id, user_id, role, Utc::now().timestamp_millis());
    }

    /// `cutoff` is a unix time in milliseconds
    pub fn revoke_at(&self, tenant_id: TenantId, user_id: i64, role: Role, cutoff: i64) {
        let principal = Principal {
            tenant_id: tenant_id.get(),
            user_id,
            role,
        };
        self.cutoffs
            .entry(principal)
            .and_modify(|existing| *existing = (*existing).max(cutoff))
            .or_insert(cutoff);
        info!(
            "Revoked tokens for {} {} in tenant {} issued up to {}",
            role, user_id, tenant_id, cutoff
        );
        self.prune(Utc::now().timestamp_millis());
    }

    pub fn is_revoked(&self, claims: &TokenClaims) -> bool {
        let Some(tenant_id) = claims.identity.tenant_id else {
            return false;
        };
        let principal = Principal {
            tenant_id,
            user_id: claims.identity.user_id,
            role: claims.identity.role,
        };
        self.cutoffs
            .get(&principal)
            .is_some_and(|cutoff| claims.issued_at_millis() <= *cutoff)
    }

    /// Drop cutoffs older than the token lifetime; `now` is in milliseconds
    pub fn prune(&self, now: i64) {
        let before = self.cutoffs.len();
        self.cutoffs.retain(|_, cutoff| *cutoff + TOKEN_TTL_MILLIS > now);
        let removed = before.saturating_sub(self.cutoffs.len());
        if removed > 0 {
            debug!("Pruned {} expired revocation entries", removed);
        }
    }

    pub fn len(&self) -> usize {
        self.cutoffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cutoffs.is_empty()
    }
}
