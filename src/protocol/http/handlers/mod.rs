//! Request handlers
//!
//! Authenticated handlers take the caller's `AuthContext` (or
//! `AdminContext`) and pass its tenant id to every storage call. Ids found
//! in paths, queries or bodies only ever select rows inside that tenant.

pub mod api_keys;
pub mod auth;
pub mod client;
pub mod feed;
pub mod inventories;
pub mod locations;
pub mod operators;
pub mod pages;

use super::errors::{ApiError, ApiResult};

/// Parse a numeric path id
pub(crate) fn parse_id(raw: &str, what: &str) -> ApiResult<i64> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid {} ID", what)))
}
