//! Credit Guardian
//!
//! Consumer-credit tooling for the Bulgarian market:
//! - GPR (ГПР) calculation and verification against declared figures
//! - Contract analysis with unfair clause detection
//! - Optional AI contract review through a local Ollama model
//! - A creditor registry with violations, court cases and risk scores
//! - A REST server over all of the above and a typed client for it

pub mod analyzers;
pub mod client;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod registry;
pub mod reports;
pub mod server;
pub mod telemetry;

// Re-exports for convenience
pub use analyzers::{ClauseDetector, ContractAnalyzer, GprCalculator};
pub use client::{ApiClient, ClientError};
pub use config::AppConfig;
pub use error::{GuardianError, GuardianResult};
pub use registry::{CreditorStore, SqliteCreditorStore};
pub use server::{create_router, run_server, AppState};
