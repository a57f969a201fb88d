//! Loads the sample creditors into the registry database.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::info;

use credit_guardian::registry::seed::seed_sample_data;
use credit_guardian::registry::{CreditorStore, SqliteCreditorStore};
use credit_guardian::{reports, telemetry, AppConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Insert sample creditors and violations")]
struct Args {
    /// Database file; defaults to CG_DATABASE_PATH.
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    telemetry::init_logging();

    let args = Args::parse();
    let path = args.database.unwrap_or_else(|| AppConfig::from_env().database_path);

    let store = SqliteCreditorStore::new(&path)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))?;

    if seed_sample_data(&store).await.context("Seed failed")? {
        info!("Seed data inserted into {}", path.display());
    }

    let stats = store.stats().await?;
    println!("{}", reports::summary_report(&stats, Utc::now().date_naive()));
    Ok(())
}
