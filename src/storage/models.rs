use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Agent account stored locally. Usernames are unique across all tenants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Operator {
    pub id: i64,
    pub customer_id: i64,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_password_request: bool,
    pub password_request: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOperator {
    pub username: String,
    pub password_hash: String,
}

/// Partial operator update. Setting a password also clears any pending
/// reset request.
#[derive(Debug, Clone, Default)]
pub struct OperatorUpdate {
    pub is_password_request: Option<bool>,
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperatorCounts {
    pub normal: i64,
    pub forgotten_password: i64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Location {
    pub id: i64,
    pub customer_id: i64,
    pub name: String,
    /// Number of inventory records placed at this location
    pub inventory_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Asset {
    pub id: i64,
    pub customer_id: i64,
    pub name: String,
}

/// Inventory record with asset and location names resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct InventoryRecord {
    pub id: i64,
    pub customer_id: i64,
    pub asset_id: Option<i64>,
    pub asset_name: Option<String>,
    pub location_id: Option<i64>,
    pub location_name: Option<String>,
    pub operator_id: Option<i64>,
    pub rfid: String,
    pub status: Option<String>,
    pub comment: Option<String>,
    pub purchase_amount: Option<f64>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub reg_date: Option<DateTime<Utc>>,
    pub inv_date: Option<DateTime<Utc>>,
    pub is_throw: bool,
}

/// Fields for recording a scanned item
#[derive(Debug, Clone, Default)]
pub struct NewInventory {
    pub asset_id: Option<i64>,
    /// Creates a catalogue asset in the same write and links it, replacing `asset_id`
    pub asset_name: Option<String>,
    pub location_id: Option<i64>,
    pub operator_id: Option<i64>,
    pub rfid: String,
    pub status: Option<String>,
    pub comment: Option<String>,
    pub purchase_amount: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct InventoryUpdate {
    pub rfid: Option<String>,
    /// Renames the linked asset
    pub asset_name: Option<String>,
    pub location_id: Option<i64>,
    pub status: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InventoryFilter {
    pub location_id: Option<i64>,
    /// Case-insensitive match on rfid, asset name or location name
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl InventoryFilter {
    pub const DEFAULT_LIMIT: i64 = 500;

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::DEFAULT_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_lowercase)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApiKeyRecord {
    pub customer_id: i64,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a guarded delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    /// Nothing was removed; this many records still reference the row
    HasDependents(i64),
}
