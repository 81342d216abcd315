//! Operator password hashing (argon2id, PHC strings)

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};

use crate::error::{Result, ScanAssetsError};

/// Hash a password on the blocking pool
pub async fn hash_password(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password_sync(&password))
        .await
        .map_err(|e| ScanAssetsError::internal(format!("hashing task failed: {}", e)))?
}

/// Check a password against a stored hash on the blocking pool.
///
/// A malformed stored hash verifies as `false`.
pub async fn verify_password(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password_sync(&password, &hash))
        .await
        .map_err(|e| ScanAssetsError::internal(format!("verification task failed: {}", e)))
}

fn hash_password_sync(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ScanAssetsError::internal(format!("failed to hash password: {}", e)))
}

fn verify_password_sync(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Random temporary password handed out by an admin reset
pub fn temporary_password() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("tmp-{}", &raw[..10])
}
