//! Creditor Store
//!
//! The persistence interface of the registry and its SQLite implementation.
//! Every call opens its own connection on a blocking thread, so the store is
//! cheap to clone and safe to share between request handlers.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tokio::task;
use tracing::{debug, info, warn};

use super::models::{
    CourtCase, CreditProduct, Creditor, CreditorKind, CreditorProfile, CreditorQuery, ImportStats,
    NewCreditor, RegistryStats, SearchPage, UnfairClauseRecord, Violation, BLACKLIST_RISK_FLOOR,
    PROFILE_CASE_LIMIT,
};
use crate::analyzers::text::round_to;
use crate::analyzers::Severity;
use crate::error::{GuardianError, GuardianResult};

pub const CREDITOR_NOT_FOUND: &str = "Кредитор не намерен";

/// Risk points per confirmed illegal clause.
const CONFIRMED_CLAUSE_WEIGHT: f64 = 1.5;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS creditors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    name_key TEXT NOT NULL,
    type TEXT NOT NULL DEFAULT 'unknown',
    bulstat TEXT UNIQUE,
    license_number TEXT,
    address TEXT,
    violations_count INTEGER NOT NULL DEFAULT 0,
    risk_score REAL NOT NULL DEFAULT 0.0,
    is_blacklisted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_creditor_name ON creditors(name);
CREATE INDEX IF NOT EXISTS ix_creditor_name_key ON creditors(name_key);

CREATE TABLE IF NOT EXISTS violations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    creditor_id INTEGER NOT NULL REFERENCES creditors(id) ON DELETE CASCADE,
    violation_type TEXT,
    description TEXT,
    law_reference TEXT,
    decision_number TEXT,
    authority TEXT,
    penalty_amount REAL,
    decision_date TEXT,
    source_url TEXT,
    severity TEXT NOT NULL DEFAULT 'low',
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_violation_creditor ON violations(creditor_id);
CREATE INDEX IF NOT EXISTS ix_violation_severity ON violations(severity);

CREATE TABLE IF NOT EXISTS unfair_clauses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    creditor_id INTEGER NOT NULL REFERENCES creditors(id) ON DELETE CASCADE,
    clause_text TEXT NOT NULL,
    clause_type TEXT,
    legal_basis TEXT,
    court_decision TEXT,
    is_confirmed_illegal INTEGER NOT NULL DEFAULT 0,
    examples TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_clause_creditor ON unfair_clauses(creditor_id);

CREATE TABLE IF NOT EXISTS court_cases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_number TEXT UNIQUE,
    court_name TEXT,
    creditor_id INTEGER REFERENCES creditors(id) ON DELETE SET NULL,
    case_type TEXT,
    plaintiff TEXT,
    defendant TEXT,
    subject TEXT,
    decision TEXT,
    decision_date TEXT,
    is_final INTEGER NOT NULL DEFAULT 0,
    source_url TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_case_creditor ON court_cases(creditor_id);

CREATE TABLE IF NOT EXISTS credit_products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    creditor_id INTEGER NOT NULL REFERENCES creditors(id) ON DELETE CASCADE,
    product_name TEXT,
    interest_rate REAL,
    gpr REAL,
    gpr_calculated REAL,
    gpr_mismatch INTEGER NOT NULL DEFAULT 0,
    fees TEXT,
    illegal_fees TEXT,
    min_amount REAL,
    max_amount REAL,
    term_months INTEGER,
    analyzed_date TEXT
);
CREATE INDEX IF NOT EXISTS ix_product_creditor ON credit_products(creditor_id);
"#;

const CREDITOR_COLUMNS: &str = "id, name, type, bulstat, license_number, address, violations_count, \
     risk_score, is_blacklisted, created_at, updated_at";

/// Persistence interface of the creditor registry.
#[async_trait]
pub trait CreditorStore: Send + Sync {
    /// First creditor whose name contains `fragment`, ignoring case.
    async fn find_by_name(&self, fragment: &str) -> GuardianResult<Option<Creditor>>;
    async fn profile(&self, name: &str) -> GuardianResult<CreditorProfile>;
    async fn search(&self, query: &CreditorQuery) -> GuardianResult<SearchPage>;
    async fn stats(&self) -> GuardianResult<RegistryStats>;
    /// Inserts new creditors and updates known ones, matched by BULSTAT then name.
    async fn upsert_creditors(&self, batch: Vec<NewCreditor>) -> GuardianResult<ImportStats>;
    async fn add_violation(&self, violation: Violation) -> GuardianResult<i64>;
    async fn add_unfair_clause(&self, clause: UnfairClauseRecord) -> GuardianResult<i64>;
    async fn add_court_case(&self, case: CourtCase) -> GuardianResult<i64>;
    async fn add_product(&self, product: CreditProduct) -> GuardianResult<i64>;
    /// Recomputes and stores the risk score of one creditor, returning it.
    async fn recalculate_risk(&self, creditor_id: i64) -> GuardianResult<f64>;
    async fn ping(&self) -> GuardianResult<()>;
}

#[derive(Clone)]
pub struct SqliteCreditorStore {
    db_path: PathBuf,
}

impl SqliteCreditorStore {
    /// Opens (creating if needed) the database and its schema.
    pub async fn new(db_path: impl AsRef<Path>) -> GuardianResult<Self> {
        let store = Self {
            db_path: db_path.as_ref().to_path_buf(),
        };

        store
            .run(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;

        info!("Creditor registry ready at {}", store.db_path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    async fn run<T, F>(&self, f: F) -> GuardianResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> GuardianResult<T> + Send + 'static,
    {
        let path = self.db_path.clone();
        task::spawn_blocking(move || {
            let mut conn = open(&path)?;
            f(&mut conn)
        })
        .await?
    }
}

fn open(path: &Path) -> GuardianResult<Connection> {
    let conn = Connection::open(path)
        .map_err(|e| GuardianError::Unavailable(format!("database {}: {e}", path.display())))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

#[async_trait]
impl CreditorStore for SqliteCreditorStore {
    async fn find_by_name(&self, fragment: &str) -> GuardianResult<Option<Creditor>> {
        let key = name_key(fragment);
        self.run(move |conn| find_creditor(conn, &key)).await
    }

    async fn profile(&self, name: &str) -> GuardianResult<CreditorProfile> {
        let key = name_key(name);
        self.run(move |conn| {
            let creditor = find_creditor(conn, &key)?
                .ok_or_else(|| GuardianError::NotFound(CREDITOR_NOT_FOUND.to_string()))?;
            let id = creditor.id;

            let violations = conn
                .prepare(
                    "SELECT id, creditor_id, violation_type, description, law_reference, decision_number,
                            authority, penalty_amount, decision_date, source_url, severity
                     FROM violations WHERE creditor_id = ?1
                     ORDER BY decision_date DESC, id ASC",
                )?
                .query_map(params![id], violation_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let unfair_clauses = conn
                .prepare(
                    "SELECT id, creditor_id, clause_text, clause_type, legal_basis, court_decision,
                            is_confirmed_illegal, examples
                     FROM unfair_clauses WHERE creditor_id = ?1 ORDER BY id ASC",
                )?
                .query_map(params![id], clause_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let court_cases = conn
                .prepare(
                    "SELECT id, case_number, court_name, creditor_id, case_type, plaintiff, defendant,
                            subject, decision, decision_date, is_final, source_url
                     FROM court_cases WHERE creditor_id = ?1
                     ORDER BY decision_date DESC, id ASC LIMIT ?2",
                )?
                .query_map(params![id, PROFILE_CASE_LIMIT as i64], case_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let products = conn
                .prepare(
                    "SELECT id, creditor_id, product_name, interest_rate, gpr, gpr_calculated, gpr_mismatch,
                            fees, illegal_fees, min_amount, max_amount, term_months, analyzed_date
                     FROM credit_products WHERE creditor_id = ?1 ORDER BY id ASC",
                )?
                .query_map(params![id], product_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(CreditorProfile {
                creditor,
                violations,
                unfair_clauses,
                court_cases,
                products,
            })
        })
        .await
    }

    async fn search(&self, query: &CreditorQuery) -> GuardianResult<SearchPage> {
        if let Some(min_risk) = query.min_risk {
            if !min_risk.is_finite() {
                return Err(GuardianError::validation("min_risk трябва да е число"));
            }
        }

        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            clauses.push("name_key LIKE ? ESCAPE '\\'");
            values.push(Value::Text(like_pattern(&name_key(q))));
        }
        if let Some(kind) = query.kind {
            clauses.push("type = ?");
            values.push(Value::Text(kind.as_str().to_string()));
        }
        if let Some(blacklisted) = query.blacklisted {
            clauses.push("is_blacklisted = ?");
            values.push(Value::Integer(blacklisted as i64));
        }
        if let Some(min_risk) = query.min_risk {
            clauses.push("risk_score >= ?");
            values.push(Value::Real(min_risk));
        }

        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let limit = query.effective_limit();
        let offset = query.effective_offset();

        self.run(move |conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM creditors{filter}"),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )?;

            let mut page_values = values;
            page_values.push(Value::Integer(limit as i64));
            page_values.push(Value::Integer(offset as i64));

            let items = conn
                .prepare(&format!(
                    "SELECT {CREDITOR_COLUMNS} FROM creditors{filter}
                     ORDER BY risk_score DESC, name ASC LIMIT ? OFFSET ?"
                ))?
                .query_map(params_from_iter(page_values.iter()), creditor_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            debug!("Creditor search matched {} of {}", items.len(), total);
            Ok(SearchPage {
                items,
                total,
                limit,
                offset,
            })
        })
        .await
    }

    async fn stats(&self) -> GuardianResult<RegistryStats> {
        self.run(|conn| {
            let count = |sql: &str| -> rusqlite::Result<i64> { conn.query_row(sql, [], |row| row.get(0)) };
            Ok(RegistryStats {
                creditors: count("SELECT COUNT(*) FROM creditors")?,
                violations: count("SELECT COUNT(*) FROM violations")?,
                critical_violations: count("SELECT COUNT(*) FROM violations WHERE severity = 'critical'")?,
                court_cases: count("SELECT COUNT(*) FROM court_cases")?,
                unfair_clauses: count("SELECT COUNT(*) FROM unfair_clauses")?,
            })
        })
        .await
    }

    async fn upsert_creditors(&self, batch: Vec<NewCreditor>) -> GuardianResult<ImportStats> {
        self.run(move |conn| {
            let mut stats = ImportStats {
                total: batch.len(),
                ..Default::default()
            };
            let tx = conn.transaction()?;

            for record in &batch {
                let name = record.name.trim();
                if name.is_empty() {
                    stats.skipped += 1;
                    continue;
                }

                match upsert_one(&tx, name, record) {
                    Ok(true) => stats.imported += 1,
                    Ok(false) => stats.updated += 1,
                    Err(e) => {
                        warn!("Error processing creditor {}: {}", name, e);
                        stats.errors += 1;
                    }
                }
            }

            tx.commit()?;
            Ok(stats)
        })
        .await
    }

    async fn add_violation(&self, violation: Violation) -> GuardianResult<i64> {
        self.run(move |conn| {
            ensure_creditor(conn, violation.creditor_id)?;
            conn.execute(
                "INSERT INTO violations (creditor_id, violation_type, description, law_reference, decision_number,
                                         authority, penalty_amount, decision_date, source_url, severity, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    violation.creditor_id,
                    violation.violation_type,
                    violation.description,
                    violation.law_reference,
                    violation.decision_number,
                    violation.authority,
                    violation.penalty_amount,
                    violation.decision_date.map(|d| d.to_string()),
                    violation.source_url,
                    violation.severity.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn add_unfair_clause(&self, clause: UnfairClauseRecord) -> GuardianResult<i64> {
        if clause.clause_text.trim().is_empty() {
            return Err(GuardianError::validation("Текстът на клаузата е задължителен"));
        }
        let examples = clause
            .examples
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to encode clause examples")?;

        self.run(move |conn| {
            ensure_creditor(conn, clause.creditor_id)?;
            conn.execute(
                "INSERT INTO unfair_clauses (creditor_id, clause_text, clause_type, legal_basis, court_decision,
                                             is_confirmed_illegal, examples, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    clause.creditor_id,
                    clause.clause_text,
                    clause.clause_type,
                    clause.legal_basis,
                    clause.court_decision,
                    clause.is_confirmed_illegal,
                    examples,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn add_court_case(&self, case: CourtCase) -> GuardianResult<i64> {
        self.run(move |conn| {
            if let Some(creditor_id) = case.creditor_id {
                ensure_creditor(conn, creditor_id)?;
            }
            if let Some(number) = &case.case_number {
                let exists = conn
                    .query_row("SELECT 1 FROM court_cases WHERE case_number = ?1", params![number], |_| Ok(()))
                    .optional()?
                    .is_some();
                if exists {
                    return Err(GuardianError::validation(format!("Дело {number} вече съществува")));
                }
            }

            conn.execute(
                "INSERT INTO court_cases (case_number, court_name, creditor_id, case_type, plaintiff, defendant,
                                          subject, decision, decision_date, is_final, source_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    case.case_number,
                    case.court_name,
                    case.creditor_id,
                    case.case_type,
                    case.plaintiff,
                    case.defendant,
                    case.subject,
                    case.decision,
                    case.decision_date.map(|d| d.to_string()),
                    case.is_final,
                    case.source_url,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn add_product(&self, product: CreditProduct) -> GuardianResult<i64> {
        let fees = product
            .fees
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to encode product fees")?;
        let illegal_fees = product
            .illegal_fees
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to encode product illegal fees")?;

        self.run(move |conn| {
            ensure_creditor(conn, product.creditor_id)?;
            let analyzed = product.analyzed_date.unwrap_or_else(Utc::now);
            conn.execute(
                "INSERT INTO credit_products (creditor_id, product_name, interest_rate, gpr, gpr_calculated,
                                              gpr_mismatch, fees, illegal_fees, min_amount, max_amount,
                                              term_months, analyzed_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    product.creditor_id,
                    product.product_name,
                    product.interest_rate,
                    product.gpr,
                    product.gpr_calculated,
                    product.gpr_mismatch,
                    fees,
                    illegal_fees,
                    product.min_amount,
                    product.max_amount,
                    product.term_months,
                    analyzed.to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn recalculate_risk(&self, creditor_id: i64) -> GuardianResult<f64> {
        self.run(move |conn| {
            ensure_creditor(conn, creditor_id)?;

            let severities = conn
                .prepare("SELECT severity FROM violations WHERE creditor_id = ?1")?
                .query_map(params![creditor_id], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            let violation_points: u32 = severities
                .iter()
                .map(|s| s.parse::<Severity>().unwrap_or_default().violation_weight())
                .sum();
            let violations_count = severities.len() as i64;
            let confirmed: i64 = conn.query_row(
                "SELECT COUNT(*) FROM unfair_clauses WHERE creditor_id = ?1 AND is_confirmed_illegal = 1",
                params![creditor_id],
                |row| row.get(0),
            )?;

            let blacklisted: bool = conn.query_row(
                "SELECT is_blacklisted FROM creditors WHERE id = ?1",
                params![creditor_id],
                |row| row.get(0),
            )?;

            let mut score = round_to(violation_points as f64 + confirmed as f64 * CONFIRMED_CLAUSE_WEIGHT, 2);
            if blacklisted {
                score = score.max(BLACKLIST_RISK_FLOOR);
            }
            conn.execute(
                "UPDATE creditors SET risk_score = ?1, violations_count = ?2, updated_at = ?3 WHERE id = ?4",
                params![score, violations_count, Utc::now().to_rfc3339(), creditor_id],
            )?;

            debug!("Creditor {} risk recalculated: {}", creditor_id, score);
            Ok(score)
        })
        .await
    }

    async fn ping(&self) -> GuardianResult<()> {
        self.run(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(|e| GuardianError::Unavailable(e.to_string()))?;
            Ok(())
        })
        .await
    }
}

/// Lower-cased, trimmed form used for case-insensitive name matching.
/// SQLite's `lower()` only folds ASCII, so the key is computed here.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn like_pattern(fragment: &str) -> String {
    let escaped = fragment
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn find_creditor(conn: &Connection, key: &str) -> GuardianResult<Option<Creditor>> {
    if key.is_empty() {
        return Ok(None);
    }
    let creditor = conn
        .query_row(
            &format!(
                "SELECT {CREDITOR_COLUMNS} FROM creditors
                 WHERE name_key LIKE ?1 ESCAPE '\\'
                 ORDER BY (name_key = ?2) DESC, id ASC LIMIT 1"
            ),
            params![like_pattern(key), key],
            creditor_from_row,
        )
        .optional()?;
    Ok(creditor)
}

fn ensure_creditor(conn: &Connection, id: i64) -> GuardianResult<()> {
    conn.query_row("SELECT 1 FROM creditors WHERE id = ?1", params![id], |_| Ok(()))
        .optional()?
        .ok_or_else(|| GuardianError::NotFound(CREDITOR_NOT_FOUND.to_string()))
}

/// Returns `true` when a new row was inserted, `false` when one was updated.
fn upsert_one(conn: &Connection, name: &str, record: &NewCreditor) -> rusqlite::Result<bool> {
    let bulstat = record.bulstat.as_deref().map(str::trim).filter(|b| !b.is_empty());
    let key = name_key(name);
    let now = Utc::now().to_rfc3339();

    let mut existing: Option<i64> = None;
    if let Some(bulstat) = bulstat {
        existing = conn
            .query_row("SELECT id FROM creditors WHERE bulstat = ?1", params![bulstat], |row| row.get(0))
            .optional()?;
    }
    if existing.is_none() {
        existing = conn
            .query_row(
                "SELECT id FROM creditors WHERE name_key = ?1 ORDER BY id LIMIT 1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
    }

    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE creditors SET
                    name = ?1,
                    name_key = ?2,
                    type = COALESCE(?3, type),
                    bulstat = COALESCE(?4, bulstat),
                    license_number = COALESCE(?5, license_number),
                    address = COALESCE(?6, address),
                    violations_count = COALESCE(?7, violations_count),
                    risk_score = COALESCE(?8, risk_score),
                    is_blacklisted = COALESCE(?9, is_blacklisted),
                    updated_at = ?10
                 WHERE id = ?11",
                params![
                    name,
                    key,
                    record.kind.map(|k| k.as_str()),
                    bulstat,
                    record.license_number,
                    record.address,
                    record.violations_count,
                    record.risk_score,
                    record.is_blacklisted,
                    now,
                    id,
                ],
            )?;
            Ok(false)
        }
        None => {
            conn.execute(
                "INSERT INTO creditors (name, name_key, type, bulstat, license_number, address,
                                        violations_count, risk_score, is_blacklisted, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                params![
                    name,
                    key,
                    record.kind.unwrap_or_default().as_str(),
                    bulstat,
                    record.license_number,
                    record.address,
                    record.violations_count.unwrap_or(0),
                    record.risk_score.unwrap_or(0.0),
                    record.is_blacklisted.unwrap_or(false),
                    now,
                ],
            )?;
            Ok(true)
        }
    }
}

fn timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_timestamp(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => timestamp(row, idx).map(Some),
        None => Ok(None),
    }
}

fn optional_date(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
        })
        .transpose()
}

fn optional_json(row: &Row, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| {
            serde_json::from_str(&raw)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
        })
        .transpose()
}

fn creditor_from_row(row: &Row) -> rusqlite::Result<Creditor> {
    Ok(Creditor {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: CreditorKind::from(row.get::<_, String>(2)?.as_str()),
        bulstat: row.get(3)?,
        license_number: row.get(4)?,
        address: row.get(5)?,
        violations_count: row.get(6)?,
        risk_score: row.get(7)?,
        is_blacklisted: row.get(8)?,
        created_at: timestamp(row, 9)?,
        updated_at: timestamp(row, 10)?,
    })
}

fn violation_from_row(row: &Row) -> rusqlite::Result<Violation> {
    Ok(Violation {
        id: row.get(0)?,
        creditor_id: row.get(1)?,
        violation_type: row.get(2)?,
        description: row.get(3)?,
        law_reference: row.get(4)?,
        decision_number: row.get(5)?,
        authority: row.get(6)?,
        penalty_amount: row.get(7)?,
        decision_date: optional_date(row, 8)?,
        source_url: row.get(9)?,
        severity: row.get::<_, String>(10)?.parse().unwrap_or_default(),
    })
}

fn clause_from_row(row: &Row) -> rusqlite::Result<UnfairClauseRecord> {
    Ok(UnfairClauseRecord {
        id: row.get(0)?,
        creditor_id: row.get(1)?,
        clause_text: row.get(2)?,
        clause_type: row.get(3)?,
        legal_basis: row.get(4)?,
        court_decision: row.get(5)?,
        is_confirmed_illegal: row.get(6)?,
        examples: optional_json(row, 7)?,
    })
}

fn case_from_row(row: &Row) -> rusqlite::Result<CourtCase> {
    Ok(CourtCase {
        id: row.get(0)?,
        case_number: row.get(1)?,
        court_name: row.get(2)?,
        creditor_id: row.get(3)?,
        case_type: row.get(4)?,
        plaintiff: row.get(5)?,
        defendant: row.get(6)?,
        subject: row.get(7)?,
        decision: row.get(8)?,
        decision_date: optional_date(row, 9)?,
        is_final: row.get(10)?,
        source_url: row.get(11)?,
    })
}

fn product_from_row(row: &Row) -> rusqlite::Result<CreditProduct> {
    Ok(CreditProduct {
        id: row.get(0)?,
        creditor_id: row.get(1)?,
        product_name: row.get(2)?,
        interest_rate: row.get(3)?,
        gpr: row.get(4)?,
        gpr_calculated: row.get(5)?,
        gpr_mismatch: row.get(6)?,
        fees: optional_json(row, 7)?,
        illegal_fees: optional_json(row, 8)?,
        min_amount: row.get(9)?,
        max_amount: row.get(10)?,
        term_months: row.get(11)?,
        analyzed_date: optional_timestamp(row, 12)?,
    })
}
