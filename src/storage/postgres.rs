//! PostgreSQL storage
//!
//! Runtime-checked queries; every statement touching tenant data carries a
//! `customer_id = $n` predicate.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, info};

use super::models::*;
use super::traits::*;
use super::{StorageError, StorageResult};
use crate::auth::TenantId;
use crate::config::DatabaseConfig;

const OPERATOR_COLUMNS: &str =
    "id, customer_id, username, password AS password_hash, is_password_request, password_request, created_at";

const INVENTORY_SELECT: &str = r#"
    SELECT i.id, i.customer_id, i.asset_id, a.name AS asset_name,
           i.location_id, l.name AS location_name, i.operator_id, i.rfid,
           i.status, i.comment, i.purchase_amount, i.purchase_date,
           i.reg_date, i.inv_date, i.is_throw
    FROM inventories i
    LEFT JOIN assets a ON a.id = i.asset_id AND a.customer_id = i.customer_id
    LEFT JOIN locations l ON l.id = i.location_id AND l.customer_id = i.customer_id
"#;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS operators (
        id BIGSERIAL PRIMARY KEY,
        customer_id BIGINT NOT NULL,
        username TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        is_password_request BOOLEAN NOT NULL DEFAULT FALSE,
        password_request TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS locations (
        id BIGSERIAL PRIMARY KEY,
        customer_id BIGINT NOT NULL,
        name TEXT NOT NULL,
        UNIQUE (customer_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS assets (
        id BIGSERIAL PRIMARY KEY,
        customer_id BIGINT NOT NULL,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS inventories (
        id BIGSERIAL PRIMARY KEY,
        customer_id BIGINT NOT NULL,
        asset_id BIGINT REFERENCES assets(id),
        location_id BIGINT REFERENCES locations(id),
        operator_id BIGINT REFERENCES operators(id),
        rfid TEXT NOT NULL,
        status TEXT,
        comment TEXT,
        purchase_amount DOUBLE PRECISION,
        purchase_date TIMESTAMPTZ,
        reg_date TIMESTAMPTZ DEFAULT NOW(),
        inv_date TIMESTAMPTZ,
        is_throw BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_inventories_customer ON inventories (customer_id)",
    r#"
    CREATE TABLE IF NOT EXISTS apikey (
        customer_id BIGINT PRIMARY KEY,
        api_key TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS clients (
        customer_id BIGINT PRIMARY KEY,
        clientname TEXT NOT NULL
    )
    "#,
];

fn map_unique(err: sqlx::Error, what: &str) -> StorageError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Duplicate(what.to_string()),
        _ => StorageError::Database(err),
    }
}

/// Whether `id` exists in `table` for the tenant. `table` is always one of
/// the fixed names used below.
async fn owned_by(
    tx: &mut Transaction<'_, Postgres>,
    table: &'static str,
    id: i64,
    tenant: TenantId,
) -> StorageResult<bool> {
    let query = format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1 AND customer_id = $2)",
        table
    );
    let (exists,): (bool,) = sqlx::query_as(&query)
        .bind(id)
        .bind(tenant.get())
        .fetch_one(&mut **tx)
        .await?;
    Ok(exists)
}

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool using the configured limits
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&config.url)
            .await?;
        info!("Connected to PostgreSQL (max {} connections)", config.max_connections);
        Ok(Self::new(pool))
    }

    /// Create tables and indexes when missing
    pub async fn initialize(&self) -> StorageResult<()> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        debug!("Database schema verified");
        Ok(())
    }
}

#[async_trait]
impl OperatorStore for PostgresStore {
    async fn find_operator_by_username(&self, username: &str) -> StorageResult<Option<Operator>> {
        let query = format!("SELECT {} FROM operators WHERE username = $1", OPERATOR_COLUMNS);
        Ok(sqlx::query_as::<_, Operator>(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn username_exists(&self, username: &str) -> StorageResult<bool> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM operators WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn create_operator(&self, tenant: TenantId, operator: NewOperator) -> StorageResult<Operator> {
        let query = format!(
            "INSERT INTO operators (customer_id, username, password) VALUES ($1, $2, $3) RETURNING {}",
            OPERATOR_COLUMNS
        );
        sqlx::query_as::<_, Operator>(&query)
            .bind(tenant.get())
            .bind(&operator.username)
            .bind(&operator.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique(e, "username"))
    }

    async fn list_operators(&self, tenant: TenantId) -> StorageResult<Vec<Operator>> {
        let query = format!(
            "SELECT {} FROM operators WHERE customer_id = $1 ORDER BY username",
            OPERATOR_COLUMNS
        );
        Ok(sqlx::query_as::<_, Operator>(&query)
            .bind(tenant.get())
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_operators(&self, tenant: TenantId) -> StorageResult<OperatorCounts> {
        let (normal, forgotten_password, total): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FILTER (WHERE NOT is_password_request),
                   COUNT(*) FILTER (WHERE is_password_request),
                   COUNT(*)
            FROM operators
            WHERE customer_id = $1
            "#,
        )
        .bind(tenant.get())
        .fetch_one(&self.pool)
        .await?;
        Ok(OperatorCounts {
            normal,
            forgotten_password,
            total,
        })
    }

    async fn get_operator(&self, tenant: TenantId, id: i64) -> StorageResult<Option<Operator>> {
        let query = format!(
            "SELECT {} FROM operators WHERE id = $1 AND customer_id = $2",
            OPERATOR_COLUMNS
        );
        Ok(sqlx::query_as::<_, Operator>(&query)
            .bind(id)
            .bind(tenant.get())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_operator(
        &self,
        tenant: TenantId,
        id: i64,
        update: OperatorUpdate,
    ) -> StorageResult<Option<Operator>> {
        let query = format!(
            r#"
            UPDATE operators SET
                is_password_request = CASE
                    WHEN $4::TEXT IS NOT NULL THEN FALSE
                    ELSE COALESCE($3::BOOLEAN, is_password_request)
                END,
                password = COALESCE($4::TEXT, password)
            WHERE id = $1 AND customer_id = $2
            RETURNING {}
            "#,
            OPERATOR_COLUMNS
        );
        Ok(sqlx::query_as::<_, Operator>(&query)
            .bind(id)
            .bind(tenant.get())
            .bind(update.is_password_request)
            .bind(update.password_hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn reset_operator_password(
        &self,
        tenant: TenantId,
        id: i64,
        password_hash: String,
    ) -> StorageResult<Option<Operator>> {
        let query = format!(
            r#"
            UPDATE operators
            SET password = $3, is_password_request = FALSE, password_request = NULL
            WHERE id = $1 AND customer_id = $2
            RETURNING {}
            "#,
            OPERATOR_COLUMNS
        );
        Ok(sqlx::query_as::<_, Operator>(&query)
            .bind(id)
            .bind(tenant.get())
            .bind(password_hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn request_password_reset(&self, username: &str, note: Option<String>) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE operators
            SET is_password_request = TRUE,
                password_request = COALESCE($2, password_request)
            WHERE username = $1
            "#,
        )
        .bind(username)
        .bind(note)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_operator(&self, tenant: TenantId, id: i64) -> StorageResult<DeleteOutcome> {
        let mut tx = self.pool.begin().await?;

        let found: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM operators WHERE id = $1 AND customer_id = $2 FOR UPDATE")
                .bind(id)
                .bind(tenant.get())
                .fetch_optional(&mut *tx)
                .await?;
        if found.is_none() {
            return Ok(DeleteOutcome::NotFound);
        }

        let (dependents,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM inventories WHERE operator_id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if dependents > 0 {
            return Ok(DeleteOutcome::HasDependents(dependents));
        }

        sqlx::query("DELETE FROM operators WHERE id = $1 AND customer_id = $2")
            .bind(id)
            .bind(tenant.get())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(DeleteOutcome::Deleted)
    }
}

#[async_trait]
impl LocationStore for PostgresStore {
    async fn list_locations(&self, tenant: TenantId) -> StorageResult<Vec<Location>> {
        Ok(sqlx::query_as::<_, Location>(
            r#"
            SELECT l.id, l.customer_id, l.name, COUNT(i.id) AS inventory_count
            FROM locations l
            LEFT JOIN inventories i ON i.location_id = l.id
            WHERE l.customer_id = $1
            GROUP BY l.id
            ORDER BY l.name
            "#,
        )
        .bind(tenant.get())
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_location(&self, tenant: TenantId, id: i64) -> StorageResult<Option<Location>> {
        Ok(sqlx::query_as::<_, Location>(
            r#"
            SELECT l.id, l.customer_id, l.name, COUNT(i.id) AS inventory_count
            FROM locations l
            LEFT JOIN inventories i ON i.location_id = l.id
            WHERE l.id = $1 AND l.customer_id = $2
            GROUP BY l.id
            "#,
        )
        .bind(id)
        .bind(tenant.get())
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn create_location(&self, tenant: TenantId, name: &str) -> StorageResult<Location> {
        sqlx::query_as::<_, Location>(
            r#"
            INSERT INTO locations (customer_id, name) VALUES ($1, $2)
            RETURNING id, customer_id, name, 0::BIGINT AS inventory_count
            "#,
        )
        .bind(tenant.get())
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, "location"))
    }

    async fn rename_location(&self, tenant: TenantId, id: i64, name: &str) -> StorageResult<Option<Location>> {
        let updated = sqlx::query("UPDATE locations SET name = $3 WHERE id = $1 AND customer_id = $2")
            .bind(id)
            .bind(tenant.get())
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique(e, "location"))?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_location(tenant, id).await
    }

    async fn delete_location(&self, tenant: TenantId, id: i64) -> StorageResult<DeleteOutcome> {
        let mut tx = self.pool.begin().await?;

        // Row lock blocks concurrent inserts that reference this location.
        let found: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM locations WHERE id = $1 AND customer_id = $2 FOR UPDATE")
                .bind(id)
                .bind(tenant.get())
                .fetch_optional(&mut *tx)
                .await?;
        if found.is_none() {
            return Ok(DeleteOutcome::NotFound);
        }

        let (dependents,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM inventories WHERE location_id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if dependents > 0 {
            return Ok(DeleteOutcome::HasDependents(dependents));
        }

        sqlx::query("DELETE FROM locations WHERE id = $1 AND customer_id = $2")
            .bind(id)
            .bind(tenant.get())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(DeleteOutcome::Deleted)
    }
}

#[async_trait]
impl InventoryStore for PostgresStore {
    async fn create_asset(&self, tenant: TenantId, name: &str) -> StorageResult<Asset> {
        Ok(sqlx::query_as::<_, Asset>(
            "INSERT INTO assets (customer_id, name) VALUES ($1, $2) RETURNING id, customer_id, name",
        )
        .bind(tenant.get())
        .bind(name)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn create_inventory(&self, tenant: TenantId, record: NewInventory) -> StorageResult<InventoryRecord> {
        let mut tx = self.pool.begin().await?;

        let references = [
            ("assets", "asset", record.asset_id),
            ("locations", "location", record.location_id),
            ("operators", "operator", record.operator_id),
        ];
        for (table, what, id) in references {
            if let Some(id) = id {
                if !owned_by(&mut tx, table, id, tenant).await? {
                    return Err(StorageError::InvalidReference(what.to_string()));
                }
            }
        }

        let asset_id = match &record.asset_name {
            Some(name) => {
                let (asset_id,): (i64,) =
                    sqlx::query_as("INSERT INTO assets (customer_id, name) VALUES ($1, $2) RETURNING id")
                        .bind(tenant.get())
                        .bind(name)
                        .fetch_one(&mut *tx)
                        .await?;
                Some(asset_id)
            }
            None => record.asset_id,
        };

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO inventories
                (customer_id, asset_id, location_id, operator_id, rfid, status, comment, purchase_amount)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(tenant.get())
        .bind(asset_id)
        .bind(record.location_id)
        .bind(record.operator_id)
        .bind(&record.rfid)
        .bind(&record.status)
        .bind(&record.comment)
        .bind(record.purchase_amount)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        self.get_inventory(tenant, id)
            .await?
            .ok_or_else(|| StorageError::Database(sqlx::Error::RowNotFound))
    }

    async fn list_inventories(&self, tenant: TenantId, filter: &InventoryFilter) -> StorageResult<Vec<InventoryRecord>> {
        let query = format!(
            r#"{}
            WHERE i.customer_id = $1
              AND ($2::BIGINT IS NULL OR i.location_id = $2)
              AND ($3::TEXT IS NULL
                   OR LOWER(i.rfid) LIKE $3
                   OR LOWER(a.name) LIKE $3
                   OR LOWER(l.name) LIKE $3)
            ORDER BY i.id DESC
            LIMIT $4 OFFSET $5
            "#,
            INVENTORY_SELECT
        );
        let pattern = filter.search_term().map(|term| format!("%{}%", term));
        Ok(sqlx::query_as::<_, InventoryRecord>(&query)
            .bind(tenant.get())
            .bind(filter.location_id)
            .bind(pattern)
            .bind(filter.limit())
            .bind(filter.offset())
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_inventory(&self, tenant: TenantId, id: i64) -> StorageResult<Option<InventoryRecord>> {
        let query = format!("{} WHERE i.id = $1 AND i.customer_id = $2", INVENTORY_SELECT);
        Ok(sqlx::query_as::<_, InventoryRecord>(&query)
            .bind(id)
            .bind(tenant.get())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_inventory(
        &self,
        tenant: TenantId,
        id: i64,
        update: InventoryUpdate,
    ) -> StorageResult<Option<InventoryRecord>> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(Option<i64>,)> = sqlx::query_as(
            "SELECT asset_id FROM inventories WHERE id = $1 AND customer_id = $2 FOR UPDATE",
        )
        .bind(id)
        .bind(tenant.get())
        .fetch_optional(&mut *tx)
        .await?;
        let Some((asset_id,)) = existing else {
            return Ok(None);
        };

        if let Some(location_id) = update.location_id {
            if !owned_by(&mut tx, "locations", location_id, tenant).await? {
                return Err(StorageError::InvalidReference("location".to_string()));
            }
        }

        sqlx::query(
            r#"
            UPDATE inventories SET
                rfid = COALESCE($3, rfid),
                location_id = COALESCE($4, location_id),
                status = COALESCE($5, status),
                comment = COALESCE($6, comment)
            WHERE id = $1 AND customer_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant.get())
        .bind(&update.rfid)
        .bind(update.location_id)
        .bind(&update.status)
        .bind(&update.comment)
        .execute(&mut *tx)
        .await?;

        if let (Some(name), Some(asset_id)) = (&update.asset_name, asset_id) {
            sqlx::query("UPDATE assets SET name = $3 WHERE id = $1 AND customer_id = $2")
                .bind(asset_id)
                .bind(tenant.get())
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        self.get_inventory(tenant, id).await
    }

    async fn delete_inventory(&self, tenant: TenantId, id: i64) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM inventories WHERE id = $1 AND customer_id = $2")
            .bind(id)
            .bind(tenant.get())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ApiKeyStore for PostgresStore {
    async fn upsert_api_key(&self, tenant: TenantId, api_key: &str) -> StorageResult<ApiKeyRecord> {
        Ok(sqlx::query_as::<_, ApiKeyRecord>(
            r#"
            INSERT INTO apikey (customer_id, api_key, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (customer_id)
            DO UPDATE SET api_key = EXCLUDED.api_key, created_at = EXCLUDED.created_at
            RETURNING customer_id, api_key, created_at
            "#,
        )
        .bind(tenant.get())
        .bind(api_key)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_api_key(&self, tenant: TenantId) -> StorageResult<Option<ApiKeyRecord>> {
        Ok(sqlx::query_as::<_, ApiKeyRecord>(
            "SELECT customer_id, api_key, created_at FROM apikey WHERE customer_id = $1",
        )
        .bind(tenant.get())
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn api_key_matches(&self, tenant: TenantId, api_key: &str) -> StorageResult<bool> {
        let (matches,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM apikey WHERE customer_id = $1 AND api_key = $2)",
        )
        .bind(tenant.get())
        .bind(api_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(matches)
    }
}

#[async_trait]
impl ClientStore for PostgresStore {
    async fn get_client_name(&self, tenant: TenantId) -> StorageResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT clientname FROM clients WHERE customer_id = $1")
                .bind(tenant.get())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(name,)| name))
    }

    async fn set_client_name(&self, tenant: TenantId, name: &str) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO clients (customer_id, clientname) VALUES ($1, $2)
            ON CONFLICT (customer_id) DO UPDATE SET clientname = EXCLUDED.clientname
            "#,
        )
        .bind(tenant.get())
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for PostgresStore {
    async fn ping(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
