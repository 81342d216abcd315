use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::models::*;
use super::traits::*;
use super::{StorageError, StorageResult};
use crate::auth::TenantId;

#[derive(Debug, Clone)]
struct InventoryRow {
    customer_id: i64,
    asset_id: Option<i64>,
    location_id: Option<i64>,
    operator_id: Option<i64>,
    rfid: String,
    status: Option<String>,
    comment: Option<String>,
    purchase_amount: Option<f64>,
    reg_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    operators: BTreeMap<i64, Operator>,
    locations: BTreeMap<i64, (i64, String)>,
    assets: BTreeMap<i64, Asset>,
    inventories: BTreeMap<i64, InventoryRow>,
    api_keys: HashMap<i64, ApiKeyRecord>,
    clients: HashMap<i64, String>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn location_in_tenant(&self, tenant: i64, id: i64) -> bool {
        self.locations.get(&id).is_some_and(|(owner, _)| *owner == tenant)
    }

    fn asset_in_tenant(&self, tenant: i64, id: i64) -> bool {
        self.assets.get(&id).is_some_and(|asset| asset.customer_id == tenant)
    }

    fn operator_in_tenant(&self, tenant: i64, id: i64) -> bool {
        self.operators.get(&id).is_some_and(|op| op.customer_id == tenant)
    }

    fn inventory_count_at(&self, location_id: i64) -> i64 {
        self.inventories
            .values()
            .filter(|row| row.location_id == Some(location_id))
            .count() as i64
    }

    fn location(&self, id: i64) -> Option<Location> {
        self.locations.get(&id).map(|(customer_id, name)| Location {
            id,
            customer_id: *customer_id,
            name: name.clone(),
            inventory_count: self.inventory_count_at(id),
        })
    }

    fn resolve(&self, id: i64, row: &InventoryRow) -> InventoryRecord {
        InventoryRecord {
            id,
            customer_id: row.customer_id,
            asset_id: row.asset_id,
            asset_name: row
                .asset_id
                .and_then(|asset_id| self.assets.get(&asset_id))
                .map(|asset| asset.name.clone()),
            location_id: row.location_id,
            location_name: row
                .location_id
                .and_then(|location_id| self.locations.get(&location_id))
                .map(|(_, name)| name.clone()),
            operator_id: row.operator_id,
            rfid: row.rfid.clone(),
            status: row.status.clone(),
            comment: row.comment.clone(),
            purchase_amount: row.purchase_amount,
            purchase_date: None,
            reg_date: row.reg_date,
            inv_date: None,
            is_throw: false,
        }
    }

    fn name_taken(&self, tenant: i64, name: &str, except: Option<i64>) -> bool {
        self.locations
            .iter()
            .any(|(id, (owner, existing))| *owner == tenant && existing == name && Some(*id) != except)
    }
}

/// In-process storage backed by one lock over all tables
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn asset_count(&self, tenant: TenantId) -> usize {
        let tables = self.tables.read().await;
        tables.assets.values().filter(|asset| asset.customer_id == tenant.get()).count()
    }
}

#[async_trait]
impl OperatorStore for MemoryStore {
    async fn find_operator_by_username(&self, username: &str) -> StorageResult<Option<Operator>> {
        let tables = self.tables.read().await;
        Ok(tables.operators.values().find(|op| op.username == username).cloned())
    }

    async fn username_exists(&self, username: &str) -> StorageResult<bool> {
        Ok(self.find_operator_by_username(username).await?.is_some())
    }

    async fn create_operator(&self, tenant: TenantId, operator: NewOperator) -> StorageResult<Operator> {
        let mut tables = self.tables.write().await;
        if tables.operators.values().any(|op| op.username == operator.username) {
            return Err(StorageError::Duplicate("username".to_string()));
        }
        let id = tables.next_id();
        let created = Operator {
            id,
            customer_id: tenant.get(),
            username: operator.username,
            password_hash: operator.password_hash,
            is_password_request: false,
            password_request: None,
            created_at: Utc::now(),
        };
        tables.operators.insert(id, created.clone());
        Ok(created)
    }

    async fn list_operators(&self, tenant: TenantId) -> StorageResult<Vec<Operator>> {
        let tables = self.tables.read().await;
        let mut operators: Vec<Operator> = tables
            .operators
            .values()
            .filter(|op| op.customer_id == tenant.get())
            .cloned()
            .collect();
        operators.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(operators)
    }

    async fn count_operators(&self, tenant: TenantId) -> StorageResult<OperatorCounts> {
        let tables = self.tables.read().await;
        let mut counts = OperatorCounts::default();
        for op in tables.operators.values().filter(|op| op.customer_id == tenant.get()) {
            counts.total += 1;
            if op.is_password_request {
                counts.forgotten_password += 1;
            } else {
                counts.normal += 1;
            }
        }
        Ok(counts)
    }

    async fn get_operator(&self, tenant: TenantId, id: i64) -> StorageResult<Option<Operator>> {
        let tables = self.tables.read().await;
        Ok(tables
            .operators
            .get(&id)
            .filter(|op| op.customer_id == tenant.get())
            .cloned())
    }

    async fn update_operator(
        &self,
        tenant: TenantId,
        id: i64,
        update: OperatorUpdate,
    ) -> StorageResult<Option<Operator>> {
        let mut tables = self.tables.write().await;
        let Some(op) = tables
            .operators
            .get_mut(&id)
            .filter(|op| op.customer_id == tenant.get())
        else {
            return Ok(None);
        };
        if let Some(flag) = update.is_password_request {
            op.is_password_request = flag;
        }
        if let Some(hash) = update.password_hash {
            op.password_hash = hash;
            op.is_password_request = false;
        }
        Ok(Some(op.clone()))
    }

    async fn reset_operator_password(
        &self,
        tenant: TenantId,
        id: i64,
        password_hash: String,
    ) -> StorageResult<Option<Operator>> {
        let mut tables = self.tables.write().await;
        let Some(op) = tables
            .operators
            .get_mut(&id)
            .filter(|op| op.customer_id == tenant.get())
        else {
            return Ok(None);
        };
        op.password_hash = password_hash;
        op.is_password_request = false;
        op.password_request = None;
        Ok(Some(op.clone()))
    }

    async fn request_password_reset(&self, username: &str, note: Option<String>) -> StorageResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.operators.values_mut().find(|op| op.username == username) {
            Some(op) => {
                op.is_password_request = true;
                if note.is_some() {
                    op.password_request = note;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_operator(&self, tenant: TenantId, id: i64) -> StorageResult<DeleteOutcome> {
        let mut tables = self.tables.write().await;
        if !tables.operator_in_tenant(tenant.get(), id) {
            return Ok(DeleteOutcome::NotFound);
        }
        let dependents = tables
            .inventories
            .values()
            .filter(|row| row.operator_id == Some(id))
            .count() as i64;
        if dependents > 0 {
            return Ok(DeleteOutcome::HasDependents(dependents));
        }
        tables.operators.remove(&id);
        Ok(DeleteOutcome::Deleted)
    }
}

#[async_trait]
impl LocationStore for MemoryStore {
    async fn list_locations(&self, tenant: TenantId) -> StorageResult<Vec<Location>> {
        let tables = self.tables.read().await;
        let mut locations: Vec<Location> = tables
            .locations
            .iter()
            .filter(|(_, (owner, _))| *owner == tenant.get())
            .filter_map(|(id, _)| tables.location(*id))
            .collect();
        locations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(locations)
    }

    async fn get_location(&self, tenant: TenantId, id: i64) -> StorageResult<Option<Location>> {
        let tables = self.tables.read().await;
        Ok(tables.location(id).filter(|loc| loc.customer_id == tenant.get()))
    }

    async fn create_location(&self, tenant: TenantId, name: &str) -> StorageResult<Location> {
        let mut tables = self.tables.write().await;
        if tables.name_taken(tenant.get(), name, None) {
            return Err(StorageError::Duplicate("location".to_string()));
        }
        let id = tables.next_id();
        tables.locations.insert(id, (tenant.get(), name.to_string()));
        Ok(Location {
            id,
            customer_id: tenant.get(),
            name: name.to_string(),
            inventory_count: 0,
        })
    }

    async fn rename_location(&self, tenant: TenantId, id: i64, name: &str) -> StorageResult<Option<Location>> {
        let mut tables = self.tables.write().await;
        if !tables.location_in_tenant(tenant.get(), id) {
            return Ok(None);
        }
        if tables.name_taken(tenant.get(), name, Some(id)) {
            return Err(StorageError::Duplicate("location".to_string()));
        }
        if let Some(entry) = tables.locations.get_mut(&id) {
            entry.1 = name.to_string();
        }
        Ok(tables.location(id))
    }

    async fn delete_location(&self, tenant: TenantId, id: i64) -> StorageResult<DeleteOutcome> {
        let mut tables = self.tables.write().await;
        if !tables.location_in_tenant(tenant.get(), id) {
            return Ok(DeleteOutcome::NotFound);
        }
        let dependents = tables.inventory_count_at(id);
        if dependents > 0 {
            return Ok(DeleteOutcome::HasDependents(dependents));
        }
        tables.locations.remove(&id);
        Ok(DeleteOutcome::Deleted)
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn create_asset(&self, tenant: TenantId, name: &str) -> StorageResult<Asset> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        let asset = Asset {
            id,
            customer_id: tenant.get(),
            name: name.to_string(),
        };
        tables.assets.insert(id, asset.clone());
        Ok(asset)
    }

    async fn create_inventory(&self, tenant: TenantId, record: NewInventory) -> StorageResult<InventoryRecord> {
        let mut tables = self.tables.write().await;
        let owner = tenant.get();
        if record.asset_id.is_some_and(|id| !tables.asset_in_tenant(owner, id)) {
            return Err(StorageError::InvalidReference("asset".to_string()));
        }
        if record.location_id.is_some_and(|id| !tables.location_in_tenant(owner, id)) {
            return Err(StorageError::InvalidReference("location".to_string()));
        }
        if record.operator_id.is_some_and(|id| !tables.operator_in_tenant(owner, id)) {
            return Err(StorageError::InvalidReference("operator".to_string()));
        }
        let asset_id = match record.asset_name {
            Some(name) => {
                let asset_id = tables.next_id();
                tables.assets.insert(
                    asset_id,
                    Asset {
                        id: asset_id,
                        customer_id: owner,
                        name,
                    },
                );
                Some(asset_id)
            }
            None => record.asset_id,
        };
        let id = tables.next_id();
        let row = InventoryRow {
            customer_id: owner,
            asset_id,
            location_id: record.location_id,
            operator_id: record.operator_id,
            rfid: record.rfid,
            status: record.status,
            comment: record.comment,
            purchase_amount: record.purchase_amount,
            reg_date: Some(Utc::now()),
        };
        let resolved = tables.resolve(id, &row);
        tables.inventories.insert(id, row);
        Ok(resolved)
    }

    async fn list_inventories(&self, tenant: TenantId, filter: &InventoryFilter) -> StorageResult<Vec<InventoryRecord>> {
        let tables = self.tables.read().await;
        let term = filter.search_term();
        let records = tables
            .inventories
            .iter()
            .rev()
            .filter(|(_, row)| row.customer_id == tenant.get())
            .filter(|(_, row)| filter.location_id.is_none() || row.location_id == filter.location_id)
            .map(|(id, row)| tables.resolve(*id, row))
            .filter(|record| match &term {
                Some(term) => [Some(&record.rfid), record.asset_name.as_ref(), record.location_name.as_ref()]
                    .into_iter()
                    .flatten()
                    .any(|field| field.to_lowercase().contains(term.as_str())),
                None => true,
            })
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect();
        Ok(records)
    }

    async fn get_inventory(&self, tenant: TenantId, id: i64) -> StorageResult<Option<InventoryRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .inventories
            .get(&id)
            .filter(|row| row.customer_id == tenant.get())
            .map(|row| tables.resolve(id, row)))
    }

    async fn update_inventory(
        &self,
        tenant: TenantId,
        id: i64,
        update: InventoryUpdate,
    ) -> StorageResult<Option<InventoryRecord>> {
        let mut tables = self.tables.write().await;
        let owner = tenant.get();
        let Some(asset_id) = tables
            .inventories
            .get(&id)
            .filter(|row| row.customer_id == owner)
            .map(|row| row.asset_id)
        else {
            return Ok(None);
        };
        if update.location_id.is_some_and(|loc| !tables.location_in_tenant(owner, loc)) {
            return Err(StorageError::InvalidReference("location".to_string()));
        }
        if let (Some(name), Some(asset_id)) = (&update.asset_name, asset_id) {
            if let Some(asset) = tables.assets.get_mut(&asset_id).filter(|a| a.customer_id == owner) {
                asset.name = name.clone();
            }
        }
        if let Some(row) = tables.inventories.get_mut(&id) {
            if let Some(rfid) = update.rfid {
                row.rfid = rfid;
            }
            if update.location_id.is_some() {
                row.location_id = update.location_id;
            }
            if update.status.is_some() {
                row.status = update.status;
            }
            if update.comment.is_some() {
                row.comment = update.comment;
            }
        }
        Ok(tables.inventories.get(&id).map(|row| tables.resolve(id, row)))
    }

    async fn delete_inventory(&self, tenant: TenantId, id: i64) -> StorageResult<bool> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .inventories
            .get(&id)
            .is_some_and(|row| row.customer_id == tenant.get());
        if owned {
            tables.inventories.remove(&id);
        }
        Ok(owned)
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn upsert_api_key(&self, tenant: TenantId, api_key: &str) -> StorageResult<ApiKeyRecord> {
        let mut tables = self.tables.write().await;
        let record = ApiKeyRecord {
            customer_id: tenant.get(),
            api_key: api_key.to_string(),
            created_at: Utc::now(),
        };
        tables.api_keys.insert(tenant.get(), record.clone());
        Ok(record)
    }

    async fn get_api_key(&self, tenant: TenantId) -> StorageResult<Option<ApiKeyRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.api_keys.get(&tenant.get()).cloned())
    }

    async fn api_key_matches(&self, tenant: TenantId, api_key: &str) -> StorageResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .api_keys
            .get(&tenant.get())
            .is_some_and(|record| record.api_key == api_key))
    }
}

#[async_trait]
impl ClientStore for MemoryStore {
    async fn get_client_name(&self, tenant: TenantId) -> StorageResult<Option<String>> {
        let tables = self.tables.read().await;
        Ok(tables.clients.get(&tenant.get()).cloned())
    }

    async fn set_client_name(&self, tenant: TenantId, name: &str) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables.clients.insert(tenant.get(), name.to_string());
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(id: i64) -> TenantId {
        TenantId::new(id).unwrap()
    }

    fn operator(name: &str) -> NewOperator {
        NewOperator {
            username: name.to_string(),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn test_usernames_unique_across_tenants() {
        let store = MemoryStore::new();
        store.create_operator(tenant(1), operator("scan01")).await.unwrap();
        let err = store.create_operator(tenant(2), operator("scan01")).await.unwrap_err();
        assert!(matches!(err, StorageError::Duplicate(_)));
        assert!(store.username_exists("scan01").await.unwrap());
    }

    #[tokio::test]
    async fn test_operator_lookups_are_tenant_scoped() {
        let store = MemoryStore::new();
        let op = store.create_operator(tenant(1), operator("scan01")).await.unwrap();

        assert!(store.get_operator(tenant(1), op.id).await.unwrap().is_some());
        assert!(store.get_operator(tenant(2), op.id).await.unwrap().is_none());
        assert!(store.list_operators(tenant(2)).await.unwrap().is_empty());
        assert_eq!(store.delete_operator(tenant(2), op.id).await.unwrap(), DeleteOutcome::NotFound);
        assert!(store
            .update_operator(tenant(2), op.id, OperatorUpdate::default())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_password_reset_flow_and_counts() {
        let store = MemoryStore::new();
        let op = store.create_operator(tenant(1), operator("scan01")).await.unwrap();
        store.create_operator(tenant(1), operator("scan02")).await.unwrap();

        assert!(store
            .request_password_reset("scan01", Some("lost phone".to_string()))
            .await
            .unwrap());
        assert!(!store.request_password_reset("nobody", None).await.unwrap());

        let counts = store.count_operators(tenant(1)).await.unwrap();
        assert_eq!(
            counts,
            OperatorCounts {
                normal: 1,
                forgotten_password: 1,
                total: 2
            }
        );

        let reset = store
            .reset_operator_password(tenant(1), op.id, "new-hash".to_string())
            .await
            .unwrap()
            .unwrap();
        assert!(!reset.is_password_request);
        assert_eq!(reset.password_request, None);
        assert_eq!(reset.password_hash, "new-hash");
    }

    #[tokio::test]
    async fn test_location_delete_refused_with_dependents() {
        let store = MemoryStore::new();
        let t = tenant(1);
        let loc = store.create_location(t, "Warehouse").await.unwrap();
        let asset = store.create_asset(t, "Laptop").await.unwrap();
        for rfid in ["A1", "A2"] {
            store
                .create_inventory(
                    t,
                    NewInventory {
                        asset_id: Some(asset.id),
                        location_id: Some(loc.id),
                        rfid: rfid.to_string(),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        assert_eq!(
            store.delete_location(t, loc.id).await.unwrap(),
            DeleteOutcome::HasDependents(2)
        );
        let still_there = store.get_location(t, loc.id).await.unwrap().unwrap();
        assert_eq!(still_there.inventory_count, 2);
        assert_eq!(store.list_inventories(t, &InventoryFilter::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_location_names_unique_per_tenant() {
        let store = MemoryStore::new();
        store.create_location(tenant(1), "Office").await.unwrap();
        assert!(store.create_location(tenant(2), "Office").await.is_ok());
        assert!(matches!(
            store.create_location(tenant(1), "Office").await,
            Err(StorageError::Duplicate(_))
        ));

        let other = store.create_location(tenant(1), "Depot").await.unwrap();
        assert!(store.rename_location(tenant(1), other.id, "Office").await.is_err());
        assert!(store.rename_location(tenant(2), other.id, "Yard").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inventory_cannot_reference_foreign_location() {
        let store = MemoryStore::new();
        let foreign = store.create_location(tenant(2), "Theirs").await.unwrap();
        let err = store
            .create_inventory(
                tenant(1),
                NewInventory {
                    location_id: Some(foreign.id),
                    rfid: "X".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn test_rejected_inventory_leaves_no_asset_behind() {
        let store = MemoryStore::new();
        let foreign = store.create_location(tenant(2), "Theirs").await.unwrap();
        let err = store
            .create_inventory(
                tenant(1),
                NewInventory {
                    asset_name: Some("Ghost".to_string()),
                    location_id: Some(foreign.id),
                    rfid: "X".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidReference(_)));
        assert!(store.tables.read().await.assets.is_empty());

        let rec = store
            .create_inventory(
                tenant(1),
                NewInventory {
                    asset_name: Some("Scanner".to_string()),
                    rfid: "Y".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(rec.asset_name.as_deref(), Some("Scanner"));
        assert_eq!(store.asset_count(tenant(1)).await, 1);
    }

    #[tokio::test]
    async fn test_inventory_search_and_isolation() {
        let store = MemoryStore::new();
        let t1 = tenant(1);
        let loc = store.create_location(t1, "North Wing").await.unwrap();
        let asset = store.create_asset(t1, "Projector").await.unwrap();
        let rec = store
            .create_inventory(
                t1,
                NewInventory {
                    asset_id: Some(asset.id),
                    location_id: Some(loc.id),
                    rfid: "E200-01".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(rec.asset_name.as_deref(), Some("Projector"));

        let by_location = InventoryFilter {
            search: Some("north".to_string()),
            ..Default::default()
        };
        assert_eq!(store.list_inventories(t1, &by_location).await.unwrap().len(), 1);
        assert!(store.list_inventories(tenant(2), &by_location).await.unwrap().is_empty());
        assert!(store.get_inventory(tenant(2), rec.id).await.unwrap().is_none());
        assert!(!store.delete_inventory(tenant(2), rec.id).await.unwrap());
        assert!(store.delete_inventory(t1, rec.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_api_key_upsert_replaces() {
        let store = MemoryStore::new();
        let t = tenant(3);
        store.upsert_api_key(t, "first").await.unwrap();
        store.upsert_api_key(t, "second").await.unwrap();

        assert!(!store.api_key_matches(t, "first").await.unwrap());
        assert!(store.api_key_matches(t, "second").await.unwrap());
        assert!(!store.api_key_matches(tenant(4), "second").await.unwrap());
        assert_eq!(store.get_api_key(t).await.unwrap().unwrap().api_key, "second");
    }
}
