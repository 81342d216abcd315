//! Authentication and tenant isolation
//!
//! Identity tokens are HS256 JWTs carrying the tenant (customer) id, the
//! user id and a fixed role. Every layer that needs the caller's identity
//! (the edge gate, resource handlers, the verify endpoint) goes through
//! [`AuthService`] and receives the same [`AuthContext`].

pub mod access;
pub mod api_key;
pub mod directory;
pub mod middleware;
pub mod password;
pub mod revocation;
pub mod service;
pub mod token;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use access::{extract_token, is_valid_role_path};
pub use api_key::{ApiKeyRejected, ApiKeyService};
pub use directory::{AdminDirectory, DirectoryError, DirectoryUser, PulsePointDirectory, SignInOutcome};
pub use middleware::{edge_gate, logout_redirect, EdgeGate};
pub use revocation::RevocationList;
pub use service::AuthService;
pub use token::{token_ttl, Identity, TokenClaims, TokenCodec, TOKEN_TTL_SECS};

/// Cookie carrying the identity token
pub const AUTH_COOKIE: &str = "auth-token";
/// Response header telling the client to purge local credentials
pub const SESSION_CLEANUP_HEADER: &str = "x-session-cleanup";
/// Request headers added by the edge gate for downstream handlers
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The two roles a token can carry. Fixed at issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Agent => "agent",
        }
    }

    /// Path prefix owned by this role
    pub fn base_path(&self) -> &'static str {
        match self {
            Role::Admin => "/admin",
            Role::Agent => "/agent",
        }
    }

    pub fn dashboard_path(&self) -> &'static str {
        match self {
            Role::Admin => "/admin/dashboard",
            Role::Agent => "/agent/dashboard",
        }
    }

    /// Role owning a gated path, if any
    pub fn for_path(path: &str) -> Option<Role> {
        [Role::Admin, Role::Agent].into_iter().find(|role| {
            let base = role.base_path();
            path == base || path.strip_prefix(base).is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tenant (customer) identifier. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(i64);

impl TenantId {
    /// Returns `None` for zero or negative ids, which the system treats as absent.
    pub fn new(id: i64) -> Option<Self> {
        (id > 0).then_some(Self(id))
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Verified identity of the caller for one request.
///
/// Only [`AuthService`] constructs it, after signature, expiry, revocation,
/// tenant and activity checks have passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub tenant_id: TenantId,
    pub user_id: i64,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Identity as carried in the token payload
    pub fn identity(&self) -> Identity {
        Identity {
            tenant_id: Some(self.tenant_id.get()),
            user_id: self.user_id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
            is_active: self.is_active,
        }
    }
}

/// Reasons an access decision can deny a request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessDenied {
    #[error("No authentication token provided")]
    MissingToken,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token has been revoked")]
    Revoked,

    #[error("Token carries no tenant")]
    MissingTenant,

    #[error("Account is inactive")]
    Inactive,

    #[error("Role {actual} cannot access {required} resources")]
    RoleMismatch { required: Role, actual: Role },
}

impl AccessDenied {
    /// Failures where the caller holds a genuine token that must no longer be
    /// used here. Clients react by purging their credentials.
    pub fn forces_logout(&self) -> bool {
        matches!(
            self,
            AccessDenied::Revoked | AccessDenied::Inactive | AccessDenied::RoleMismatch { .. }
        )
    }
}
