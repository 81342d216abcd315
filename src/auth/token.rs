//! Identity token codec

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Role;
use crate::error::{Result, ScanAssetsError};

/// Absolute token lifetime in seconds (12 hours). Tokens are never refreshed.
pub const TOKEN_TTL_SECS: i64 = 12 * 60 * 60;

pub fn token_ttl() -> Duration {
    Duration::seconds(TOKEN_TTL_SECS)
}

/// Identity fields carried by a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Tenant id. Tokens without one are rejected by the access decision.
    #[serde(rename = "customerId", default)]
    pub tenant_id: Option<i64>,
    pub user_id: i64,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
    pub is_active: bool,
}

/// Decoded token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(flatten)]
    pub identity: Identity,
    pub iat: i64,
    pub exp: i64,
    /// Issue time in milliseconds; `iat` alone cannot order a token against
    /// a revocation made within the same second.
    #[serde(rename = "iatMs", default, skip_serializing_if = "Option::is_none")]
    pub iat_ms: Option<i64>,
}

impl TokenClaims {
    /// Issue time in milliseconds, falling back to `iat` for tokens without `iatMs`
    pub fn issued_at_millis(&self) -> i64 {
        self.iat_ms.unwrap_or(self.iat * 1000)
    }
}

/// Issues and verifies HS256 identity tokens
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    /// Create a codec from the signing secret. An empty secret is refused.
    pub fn new(secret: &str) -> Result<Self> {
        if secret.trim().is_empty() {
            return Err(ScanAssetsError::validation("token signing secret is empty"));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Issue a token valid for [`TOKEN_TTL_SECS`] from now
    pub fn issue(&self, identity: &Identity) -> Result<String> {
        self.issue_at(identity, Utc::now())
    }

    /// Issue a token as if the current time were `now`
    pub fn issue_at(&self, identity: &Identity, now: DateTime<Utc>) -> Result<String> {
        let claims = TokenClaims {
            identity: identity.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + TOKEN_TTL_SECS,
            iat_ms: Some(now.timestamp_millis()),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ScanAssetsError::internal(format!("failed to sign token: {}", e)))
    }

    /// Verify signature and expiry. Every failure collapses to `None`.
    pub fn verify(&self, token: &str) -> Option<TokenClaims> {
        match decode::<TokenClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!("Token verification failed: {:?}", e.kind());
                None
            }
        }
    }
}
