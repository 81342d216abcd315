use std::sync::Arc;

use crate::auth::{AdminDirectory, ApiKeyService, AuthService, EdgeGate};
use crate::config::SecurityConfig;
use crate::error::Result;
use crate::storage::Storage;

/// Core application handle
///
/// The bridge between the protocol layer and the services behind it.
/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct AppHandle {
    /// Token issuance, verification and the access decision
    pub auth: Arc<AuthService>,

    pub api_keys: Arc<ApiKeyService>,

    /// Tenant-scoped persistence
    pub store: Arc<dyn Storage>,

    /// Admin identity provider
    pub directory: Arc<dyn AdminDirectory>,

    pub secure_cookies: bool,
}

impl AppHandle {
    /// Wire the services around a storage backend
    pub fn new<S>(store: Arc<S>, directory: Arc<dyn AdminDirectory>, security: &SecurityConfig) -> Result<Self>
    where
        S: Storage + 'static,
    {
        let auth = Arc::new(AuthService::new(&security.jwt_secret)?);
        let api_keys = Arc::new(ApiKeyService::new(store.clone()));

        Ok(Self {
            auth,
            api_keys,
            store,
            directory,
            secure_cookies: security.secure_cookies,
        })
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn store(&self) -> &dyn Storage {
        self.store.as_ref()
    }

    /// State for the edge gate middleware
    pub fn edge_gate(&self) -> EdgeGate {
        EdgeGate::new(self.auth.clone(), self.secure_cookies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::directory::StaticDirectory;
    use crate::storage::MemoryStore;

    fn security(secret: &str) -> SecurityConfig {
        SecurityConfig {
            jwt_secret: secret.to_string(),
            secure_cookies: false,
        }
    }

    fn directory() -> Arc<dyn AdminDirectory> {
        Arc::new(StaticDirectory {
            users: Vec::new(),
            unavailable: false,
        })
    }

    #[test]
    fn test_handle_shares_services() {
        let handle = AppHandle::new(Arc::new(MemoryStore::new()), directory(), &security("s")).unwrap();
        let clone = handle.clone();
        assert!(Arc::ptr_eq(&handle.auth, &clone.auth));
        assert!(Arc::ptr_eq(&handle.api_keys, &clone.api_keys));
        assert!(!handle.secure_cookies);
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(AppHandle::new(Arc::new(MemoryStore::new()), directory(), &security("")).is_err());
    }
}
