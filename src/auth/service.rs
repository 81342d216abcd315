use tracing::{debug, warn};

use super::access::evaluate;
use super::{AccessDenied, AuthContext, Identity, RevocationList, Role, TenantId, TokenClaims, TokenCodec};
use crate::error::Result;

/// Token issuance and the access decision
///
/// Shared by the edge gate, the request extractors and the login and
/// verification handlers so every path applies identical checks.
pub struct AuthService {
    codec: TokenCodec,
    revocations: RevocationList,
}

impl AuthService {
    /// Fails when the signing secret is empty
    pub fn new(secret: &str) -> Result<Self> {
        Ok(Self {
            codec: TokenCodec::new(secret)?,
            revocations: RevocationList::new(),
        })
    }

    pub fn issue(&self, identity: &Identity) -> Result<String> {
        let token = self.codec.issue(identity)?;
        debug!(
            "Issued {} token for user {} in tenant {:?}",
            identity.role, identity.user_id, identity.tenant_id
        );
        Ok(token)
    }

    /// Signature, expiry and revocation. Activity and tenant are left to the caller.
    pub fn verify(&self, token: &str) -> Option<TokenClaims> {
        self.codec
            .verify(token)
            .filter(|claims| !self.revocations.is_revoked(claims))
    }

    /// Full access decision for a resource owned by `required`
    pub fn authorize(&self, token: Option<&str>, required: Role) -> std::result::Result<AuthContext, AccessDenied> {
        self.decide(token, Some(required))
    }

    /// Full access decision for a resource open to both roles
    pub fn identify(&self, token: Option<&str>) -> std::result::Result<AuthContext, AccessDenied> {
        self.decide(token, None)
    }

    fn decide(&self, token: Option<&str>, required: Option<Role>) -> std::result::Result<AuthContext, AccessDenied> {
        let token = token.ok_or(AccessDenied::MissingToken)?;
        let result = evaluate(self.codec.verify(token), required, |claims| {
            self.revocations.is_revoked(claims)
        });

        match &result {
            Err(AccessDenied::RoleMismatch { required, actual }) => warn!(
                "Security alert: {} token presented for {} resource",
                actual, required
            ),
            Err(denied) => debug!("Access denied: {}", denied),
            Ok(_) => {}
        }
        result
    }

    /// Invalidate every outstanding token of a principal
    pub fn revoke_user(&self, tenant_id: TenantId, user_id: i64, role: Role) {
        self.revocations.revoke(tenant_id, user_id, role);
    }

    pub fn revocations(&self) -> &RevocationList {
        &self.revocations
    }
}
