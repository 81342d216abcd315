use crate::app::AppHandle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;

pub mod http;

/// Settings for one protocol listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub listen_addr: String,
    /// Per-request deadline
    pub request_timeout: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ProtocolConfig {
    pub fn from_server(server: &crate::config::ServerConfig) -> Self {
        Self {
            listen_addr: format!("{}:{}", server.host, server.port),
            request_timeout: Duration::from_secs(server.request_timeout_secs),
        }
    }
}

/// A network front end serving the application
#[async_trait]
pub trait ProtocolPlugin: Send + Sync {
    /// Unique name, e.g. "http-rest"
    fn name(&self) -> &'static str;

    /// Serve until `shutdown` turns true
    async fn start(
        &self,
        app: AppHandle,
        config: ProtocolConfig,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()>;

    async fn health_check(&self) -> bool {
        true
    }
}
