//! Registry records
//!
//! Rows of the creditor registry and the request/response shapes built
//! around them.

use std::fmt;
use std::ops::AddAssign;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::analyzers::Severity;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;
/// Court cases returned with a creditor profile.
pub const PROFILE_CASE_LIMIT: usize = 30;
/// Lowest risk score a blacklisted creditor can have.
pub const BLACKLIST_RISK_FLOOR: f64 = 8.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreditorKind {
    Bank,
    NonBank,
    #[default]
    #[serde(other)]
    Unknown,
}

impl CreditorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditorKind::Bank => "bank",
            CreditorKind::NonBank => "non-bank",
            CreditorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CreditorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for CreditorKind {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "bank" => CreditorKind::Bank,
            "non-bank" | "nonbank" | "non_bank" => CreditorKind::NonBank,
            _ => CreditorKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Creditor {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CreditorKind,
    /// BULSTAT / EIK company registration number.
    pub bulstat: Option<String>,
    /// BNB licence or register entry number.
    pub license_number: Option<String>,
    pub address: Option<String>,
    /// Recorded violations, refreshed by risk recalculation.
    pub violations_count: i64,
    /// Weighted risk score; blacklisted creditors never drop below 8.0.
    pub risk_score: f64,
    #[serde(rename = "blacklisted", alias = "is_blacklisted")]
    pub is_blacklisted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A creditor as delivered by an import source. Only `name` is required;
/// missing fields leave existing values untouched on update.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NewCreditor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<CreditorKind>,
    pub bulstat: Option<String>,
    pub license_number: Option<String>,
    pub address: Option<String>,
    pub violations_count: Option<i64>,
    pub risk_score: Option<f64>,
    #[serde(alias = "blacklisted")]
    pub is_blacklisted: Option<bool>,
}

impl NewCreditor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A regulator or court finding against a creditor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Violation {
    pub id: i64,
    pub creditor_id: i64,
    /// Short category, e.g. "Нелоялна търговска практика".
    #[serde(rename = "type", alias = "violation_type")]
    pub violation_type: Option<String>,
    pub description: Option<String>,
    /// Article of the law that was breached.
    pub law_reference: Option<String>,
    pub decision_number: Option<String>,
    /// KZP, BNB or a court.
    pub authority: Option<String>,
    /// Fine imposed, in лв.
    #[serde(rename = "penalty", alias = "penalty_amount")]
    pub penalty_amount: Option<f64>,
    #[serde(rename = "date", alias = "decision_date")]
    pub decision_date: Option<NaiveDate>,
    pub source_url: Option<String>,
    pub severity: Severity,
}

/// A contract clause found or ruled unfair for a specific creditor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UnfairClauseRecord {
    pub id: i64,
    pub creditor_id: i64,
    pub clause_text: String,
    #[serde(rename = "type", alias = "clause_type")]
    pub clause_type: Option<String>,
    pub legal_basis: Option<String>,
    /// Court decision that struck the clause down, if any.
    pub court_decision: Option<String>,
    /// Set once a court or the regulator has confirmed the clause is illegal.
    #[serde(rename = "confirmed", alias = "is_confirmed_illegal")]
    pub is_confirmed_illegal: bool,
    /// Free-form JSON with example wordings.
    pub examples: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CourtCase {
    pub id: i64,
    /// Unique across the registry.
    pub case_number: Option<String>,
    #[serde(rename = "court", alias = "court_name")]
    pub court_name: Option<String>,
    pub creditor_id: Option<i64>,
    pub case_type: Option<String>,
    pub plaintiff: Option<String>,
    pub defendant: Option<String>,
    pub subject: Option<String>,
    pub decision: Option<String>,
    #[serde(rename = "date", alias = "decision_date")]
    pub decision_date: Option<NaiveDate>,
    /// The decision can no longer be appealed.
    #[serde(rename = "final", alias = "is_final")]
    pub is_final: bool,
    pub source_url: Option<String>,
}

/// A credit product offered by a creditor, with its analysed pricing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CreditProduct {
    pub id: i64,
    pub creditor_id: i64,
    pub product_name: Option<String>,
    /// Nominal annual interest, in percent.
    pub interest_rate: Option<f64>,
    /// GPR as advertised by the creditor.
    pub gpr: Option<f64>,
    /// GPR recomputed from the product terms.
    pub gpr_calculated: Option<f64>,
    /// Advertised and recomputed GPR differ beyond tolerance.
    pub gpr_mismatch: bool,
    pub fees: Option<serde_json::Value>,
    pub illegal_fees: Option<serde_json::Value>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub term_months: Option<u32>,
    pub analyzed_date: Option<DateTime<Utc>>,
}

/// Everything known about one creditor, as served by `/api/creditor/{name}`.
/// Field names follow the public profile shape: `blacklisted`, and
/// `type`/`date`/`penalty` on violations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreditorProfile {
    #[serde(flatten)]
    pub creditor: Creditor,
    pub violations: Vec<Violation>,
    pub unfair_clauses: Vec<UnfairClauseRecord>,
    /// At most [`PROFILE_CASE_LIMIT`] cases.
    pub court_cases: Vec<CourtCase>,
    pub products: Vec<CreditProduct>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CreditorQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<CreditorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blacklisted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_risk: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

impl CreditorQuery {
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    /// The set fields as `key=value` pairs, in a stable order.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(q) = self.q.as_deref().filter(|q| !q.is_empty()) {
            pairs.push(("q", q.to_string()));
        }
        if let Some(kind) = self.kind {
            pairs.push(("type", kind.to_string()));
        }
        if let Some(blacklisted) = self.blacklisted {
            pairs.push(("blacklisted", blacklisted.to_string()));
        }
        if let Some(min_risk) = self.min_risk {
            pairs.push(("min_risk", min_risk.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset", offset.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchPage {
    pub items: Vec<Creditor>,
    /// Matches before paging.
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryStats {
    pub creditors: i64,
    pub violations: i64,
    pub critical_violations: i64,
    pub court_cases: i64,
    pub unfair_clauses: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportStats {
    /// Records fetched from the source.
    pub total: usize,
    pub imported: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl AddAssign for ImportStats {
    fn add_assign(&mut self, other: Self) {
        self.total += other.total;
        self.imported += other.imported;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}
