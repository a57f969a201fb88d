//! Creditor Registry
//!
//! Creditors, the findings against them, and how they are loaded.

pub mod models;
pub mod seed;
pub mod store;
pub mod sync;

pub use models::{
    CourtCase, CreditProduct, Creditor, CreditorKind, CreditorProfile, CreditorQuery, ImportStats, NewCreditor,
    RegistryStats, SearchPage, UnfairClauseRecord, Violation,
};
pub use store::{CreditorStore, SqliteCreditorStore};
pub use sync::{sync_creditors, CreditorSource, FileCreditorSource, HttpCreditorSource};
