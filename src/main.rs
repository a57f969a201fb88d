//! Credit Guardian API server.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use credit_guardian::{run_server, telemetry, AppConfig, AppState, SqliteCreditorStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    telemetry::init_logging();

    let config = AppConfig::from_env();
    info!("Starting Credit Guardian v{}", env!("CARGO_PKG_VERSION"));
    info!("AI review via {} at {}", config.ollama_model, config.ollama_url);

    let store = SqliteCreditorStore::new(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;

    let state = AppState::new(Arc::new(store), config);
    run_server(state).await
}
