pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod storage;

pub use error::{Result, ScanAssetsError};
