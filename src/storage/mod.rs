//! Tenant-scoped persistence
//!
//! `PostgresStore` backs production deployments. `MemoryStore` implements
//! the same traits for tests and for running without a database
//! (`database.url = "memory://"`).

pub mod memory;
pub mod models;
pub mod postgres;
pub mod traits;

use thiserror::Error;

pub use memory::MemoryStore;
pub use models::*;
pub use postgres::PostgresStore;
pub use traits::{ApiKeyStore, ClientStore, InventoryStore, LocationStore, OperatorStore, Storage};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0} already exists")]
    Duplicate(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
