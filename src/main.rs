use std::sync::Arc;

use anyhow::Result;
use scanassets::app::AppHandle;
use scanassets::auth::directory::PulsePointDirectory;
use scanassets::config::{AppConfig, ObservabilityConfig};
use scanassets::protocol::http::HttpProtocol;
use scanassets::protocol::{ProtocolConfig, ProtocolPlugin};
use scanassets::storage::{MemoryStore, PostgresStore};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.observability);

    info!("Starting ScanAssets server");

    let directory = Arc::new(PulsePointDirectory::new(&config.identity)?);
    let app = if config.database.url.starts_with("memory://") {
        warn!("Using in-memory storage; data is lost on restart");
        AppHandle::new(Arc::new(MemoryStore::new()), directory, &config.security)?
    } else {
        let store = PostgresStore::connect(&config.database).await?;
        store.initialize().await?;
        info!("Database schema ready");
        AppHandle::new(Arc::new(store), directory, &config.security)?
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let protocol = HttpProtocol;
    let protocol_config = ProtocolConfig::from_server(&config.server);
    let server = tokio::spawn(async move { protocol.start(app, protocol_config, shutdown_rx).await });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutdown signal received");
        }
        // The server only returns early on a startup failure such as a taken port.
        _ = shutdown_tx.closed() => {}
    }

    shutdown_tx.send_replace(true);
    match server.await? {
        Ok(()) => info!("ScanAssets server stopped"),
        Err(e) => {
            error!("HTTP server failed: {}", e);
            return Err(e);
        }
    }

    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{},tower_http=info", config.log_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
