//! Tenant-scoped API keys
//!
//! One key per tenant grants anonymous read access to that tenant's
//! inventory feed. Rotation replaces the stored key in a single upsert, so
//! the previous key stops working immediately.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::{AuthContext, TenantId};
use crate::error::{Result, ScanAssetsError};
use crate::storage::{ApiKeyRecord, ApiKeyStore};

/// The feed never says which check failed
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("The API key is invalid.")]
pub struct ApiKeyRejected;

pub struct ApiKeyService {
    store: Arc<dyn ApiKeyStore>,
}

impl ApiKeyService {
    pub fn new(store: Arc<dyn ApiKeyStore>) -> Self {
        Self { store }
    }

    /// Issue a fresh key for the caller's tenant, replacing any existing one
    pub async fn generate(&self, ctx: &AuthContext) -> Result<ApiKeyRecord> {
        if !ctx.is_admin() {
            return Err(ScanAssetsError::auth("API keys can only be managed by admins"));
        }
        let key = Uuid::new_v4().to_string();
        let record = self.store.upsert_api_key(ctx.tenant_id, &key).await?;
        info!("API key rotated for tenant {} by user {}", ctx.tenant_id, ctx.user_id);
        Ok(record)
    }

    /// Current key of the caller's tenant, without rotating it
    pub async fn fetch_existing(&self, ctx: &AuthContext) -> Result<Option<ApiKeyRecord>> {
        if !ctx.is_admin() {
            return Err(ScanAssetsError::auth("API keys can only be managed by admins"));
        }
        Ok(self.store.get_api_key(ctx.tenant_id).await?)
    }

    /// Check a raw `(customer_id, apikey)` pair from the feed query string.
    ///
    /// Missing or malformed input, a mismatch and a storage failure are all
    /// the same rejection.
    pub async fn consume(
        &self,
        customer_id: Option<&str>,
        api_key: Option<&str>,
    ) -> std::result::Result<TenantId, ApiKeyRejected> {
        let (Some(customer_id), Some(api_key)) = (customer_id, api_key) else {
            warn!("Feed request without customer_id or apikey");
            return Err(ApiKeyRejected);
        };

        let api_key = api_key.trim();
        let tenant = customer_id
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(TenantId::new)
            .filter(|_| !api_key.is_empty())
            .ok_or_else(|| {
                warn!("Feed request with malformed customer_id or empty apikey");
                ApiKeyRejected
            })?;

        match self.store.api_key_matches(tenant, api_key).await {
            Ok(true) => Ok(tenant),
            Ok(false) => {
                warn!("Feed request with wrong API key for tenant {}", tenant);
                Err(ApiKeyRejected)
            }
            Err(e) => {
                warn!("API key lookup failed for tenant {}, rejecting: {}", tenant, e);
                Err(ApiKeyRejected)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::storage::{MemoryStore, StorageError, StorageResult};
    use async_trait::async_trait;
    use tokio_test::{assert_err, assert_ok};

    struct UnreachableKeys;

    #[async_trait]
    impl ApiKeyStore for UnreachableKeys {
        async fn upsert_api_key(&self, _: TenantId, _: &str) -> StorageResult<ApiKeyRecord> {
            Err(StorageError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn get_api_key(&self, _: TenantId) -> StorageResult<Option<ApiKeyRecord>> {
            Err(StorageError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn api_key_matches(&self, _: TenantId, _: &str) -> StorageResult<bool> {
            Err(StorageError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    fn ctx(tenant: i64, role: Role) -> AuthContext {
        AuthContext {
            tenant_id: TenantId::new(tenant).unwrap(),
            user_id: tenant,
            username: "owner@example.com".to_string(),
            email: None,
            role,
            is_active: true,
            issued_at: 0,
            expires_at: 0,
        }
    }

    fn service() -> ApiKeyService {
        ApiKeyService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_generate_twice_invalidates_first_key() {
        let service = service();
        let admin = ctx(11, Role::Admin);

        let first = service.generate(&admin).await.unwrap();
        let second = service.generate(&admin).await.unwrap();
        assert_ne!(first.api_key, second.api_key);

        assert_err!(service.consume(Some("11"), Some(&first.api_key)).await);
        let tenant = assert_ok!(service.consume(Some("11"), Some(&second.api_key)).await);
        assert_eq!(tenant.get(), 11);

        let existing = service.fetch_existing(&admin).await.unwrap().unwrap();
        assert_eq!(existing.api_key, second.api_key);
    }

    #[tokio::test]
    async fn test_key_bound_to_its_tenant() {
        let service = service();
        let key = service.generate(&ctx(11, Role::Admin)).await.unwrap();
        assert_eq!(service.consume(Some("12"), Some(&key.api_key)).await, Err(ApiKeyRejected));
    }

    #[tokio::test]
    async fn test_malformed_input_rejected() {
        let service = service();
        for (customer, key) in [
            (None, Some("k")),
            (Some("11"), None),
            (Some("eleven"), Some("k")),
            (Some("-11"), Some("k")),
            (Some("11"), Some("  ")),
        ] {
            assert_eq!(service.consume(customer, key).await, Err(ApiKeyRejected));
        }
    }

    #[tokio::test]
    async fn test_agents_cannot_manage_keys() {
        let service = service();
        let agent = ctx(11, Role::Agent);
        assert_err!(service.generate(&agent).await);
        assert_err!(service.fetch_existing(&agent).await);
    }

    #[tokio::test]
    async fn test_no_key_yet() {
        let service = service();
        assert!(service.fetch_existing(&ctx(11, Role::Admin)).await.unwrap().is_none());
        assert_err!(service.consume(Some("11"), Some("anything")).await);
    }

    #[tokio::test]
    async fn test_storage_failure_fails_closed() {
        let service = ApiKeyService::new(Arc::new(UnreachableKeys));
        assert_eq!(service.consume(Some("11"), Some("k")).await, Err(ApiKeyRejected));
        assert_err!(service.generate(&ctx(11, Role::Admin)).await);
    }
}
