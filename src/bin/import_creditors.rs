//! Imports creditors from a remote register or a JSON file.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use credit_guardian::registry::{
    sync_creditors, CreditorSource, FileCreditorSource, HttpCreditorSource, SqliteCreditorStore,
};
use credit_guardian::{telemetry, AppConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Import creditors into the registry")]
struct Args {
    /// JSON file with a creditor array or a {creditors, blacklist, violations} dump.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Base URL of a JSON register exposing /creditors, /blacklist and /violations;
    /// defaults to CG_REGISTRY_URL.
    #[arg(long)]
    url: Option<String>,

    /// Database file; defaults to CG_DATABASE_PATH.
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    telemetry::init_logging();

    let args = Args::parse();
    let config = AppConfig::from_env();
    let path = args.database.unwrap_or_else(|| config.database_path.clone());

    let source: Box<dyn CreditorSource> = match (args.file, args.url.or(config.registry_url)) {
        (Some(file), _) => Box::new(FileCreditorSource::new(file)),
        (None, Some(url)) => Box::new(HttpCreditorSource::new(url)),
        (None, None) => bail!("Provide --file or --url (or set CG_REGISTRY_URL)"),
    };

    let store = SqliteCreditorStore::new(&path)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))?;

    let stats = sync_creditors(&store, source.as_ref())
        .await
        .context("Creditor import failed")?;

    println!("Total records processed: {}", stats.total);
    println!("New creditors imported:  {}", stats.imported);
    println!("Existing updated:        {}", stats.updated);
    println!("Skipped:                 {}", stats.skipped);
    println!("Errors:                  {}", stats.errors);
    Ok(())
}
