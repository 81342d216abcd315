use async_trait::async_trait;

use super::models::*;
use super::StorageResult;
use crate::auth::TenantId;

// Every tenant-owned lookup takes the tenant id first and filters on it.
// The only unscoped calls are the operator username lookups, because
// usernames are unique system-wide.

#[async_trait]
pub trait OperatorStore: Send + Sync {
    /// Unscoped lookup used by agent login
    async fn find_operator_by_username(&self, username: &str) -> StorageResult<Option<Operator>>;

    async fn username_exists(&self, username: &str) -> StorageResult<bool>;

    /// Fails with `StorageError::Duplicate` when the username is taken in any tenant
    async fn create_operator(&self, tenant: TenantId, operator: NewOperator) -> StorageResult<Operator>;

    async fn list_operators(&self, tenant: TenantId) -> StorageResult<Vec<Operator>>;

    async fn count_operators(&self, tenant: TenantId) -> StorageResult<OperatorCounts>;

    async fn get_operator(&self, tenant: TenantId, id: i64) -> StorageResult<Option<Operator>>;

    async fn update_operator(
        &self,
        tenant: TenantId,
        id: i64,
        update: OperatorUpdate,
    ) -> StorageResult<Option<Operator>>;

    /// Replace the password and clear the reset request and its note
    async fn reset_operator_password(
        &self,
        tenant: TenantId,
        id: i64,
        password_hash: String,
    ) -> StorageResult<Option<Operator>>;

    /// Flag a reset request by username. Returns false when no such operator.
    async fn request_password_reset(&self, username: &str, note: Option<String>) -> StorageResult<bool>;

    /// Refuses while inventory records reference the operator
    async fn delete_operator(&self, tenant: TenantId, id: i64) -> StorageResult<DeleteOutcome>;
}

#[async_trait]
pub trait LocationStore: Send + Sync {
    async fn list_locations(&self, tenant: TenantId) -> StorageResult<Vec<Location>>;

    async fn get_location(&self, tenant: TenantId, id: i64) -> StorageResult<Option<Location>>;

    /// Names are unique per tenant
    async fn create_location(&self, tenant: TenantId, name: &str) -> StorageResult<Location>;

    async fn rename_location(&self, tenant: TenantId, id: i64, name: &str) -> StorageResult<Option<Location>>;

    /// Refuses while inventory records reference the location
    async fn delete_location(&self, tenant: TenantId, id: i64) -> StorageResult<DeleteOutcome>;
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn create_asset(&self, tenant: TenantId, name: &str) -> StorageResult<Asset>;

    /// Asset, location and operator must belong to the same tenant
    async fn create_inventory(&self, tenant: TenantId, record: NewInventory) -> StorageResult<InventoryRecord>;

    async fn list_inventories(&self, tenant: TenantId, filter: &InventoryFilter) -> StorageResult<Vec<InventoryRecord>>;

    async fn get_inventory(&self, tenant: TenantId, id: i64) -> StorageResult<Option<InventoryRecord>>;

    async fn update_inventory(
        &self,
        tenant: TenantId,
        id: i64,
        update: InventoryUpdate,
    ) -> StorageResult<Option<InventoryRecord>>;

    async fn delete_inventory(&self, tenant: TenantId, id: i64) -> StorageResult<bool>;
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Insert or replace the tenant's key in one statement
    async fn upsert_api_key(&self, tenant: TenantId, api_key: &str) -> StorageResult<ApiKeyRecord>;

    async fn get_api_key(&self, tenant: TenantId) -> StorageResult<Option<ApiKeyRecord>>;

    async fn api_key_matches(&self, tenant: TenantId, api_key: &str) -> StorageResult<bool>;
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn get_client_name(&self, tenant: TenantId) -> StorageResult<Option<String>>;

    async fn set_client_name(&self, tenant: TenantId, name: &str) -> StorageResult<()>;
}

/// Everything the HTTP layer needs from persistence
#[async_trait]
pub trait Storage: OperatorStore + LocationStore + InventoryStore + ApiKeyStore + ClientStore {
    /// Backend readiness probe
    async fn ping(&self) -> StorageResult<()>;
}
