//! Creditor Sync
//!
//! Pulls creditor lists from an external register, reconciles duplicates,
//! enriches them with regulator findings and loads them into the store.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use super::models::{ImportStats, NewCreditor, BLACKLIST_RISK_FLOOR};
use super::store::{name_key, CreditorStore};
use crate::analyzers::text::normalize_text;
use crate::error::GuardianResult;

pub const BATCH_SIZE: usize = 100;

/// A violation as reported by an external register, keyed by company name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportedViolation {
    pub company: String,
    pub violation_type: Option<String>,
    pub decision_number: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryDump {
    pub creditors: Vec<NewCreditor>,
    pub blacklist: Vec<String>,
    pub violations: Vec<ReportedViolation>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DumpFormat {
    Full(RegistryDump),
    List(Vec<NewCreditor>),
}

/// Where creditor data comes from.
#[async_trait]
pub trait CreditorSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_creditors(&self) -> Result<Vec<NewCreditor>>;

    /// Names of blacklisted companies.
    async fn fetch_blacklist(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn fetch_violations(&self) -> Result<Vec<ReportedViolation>> {
        Ok(Vec::new())
    }
}

/// JSON register served over HTTP at `{base}/creditors`, `{base}/blacklist`
/// and `{base}/violations`. The last two are optional.
pub struct HttpCreditorSource {
    base_url: String,
    client: Client,
}

impl HttpCreditorSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn get_json<T>(&self, path: &str, optional: bool) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {url}"))?;

        if optional && response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response
            .error_for_status()
            .with_context(|| format!("Register returned an error for {url}"))?
            .json::<T>()
            .await
            .with_context(|| format!("Invalid JSON from {url}"))?;
        Ok(Some(body))
    }
}

#[async_trait]
impl CreditorSource for HttpCreditorSource {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn fetch_creditors(&self) -> Result<Vec<NewCreditor>> {
        Ok(self.get_json("creditors", false).await?.unwrap_or_default())
    }

    async fn fetch_blacklist(&self) -> Result<Vec<String>> {
        Ok(self.get_json("blacklist", true).await?.unwrap_or_default())
    }

    async fn fetch_violations(&self) -> Result<Vec<ReportedViolation>> {
        Ok(self.get_json("violations", true).await?.unwrap_or_default())
    }
}

/// A JSON file holding either a plain creditor array or a [`RegistryDump`].
/// The file is read and parsed once, on the first fetch.
pub struct FileCreditorSource {
    path: PathBuf,
    label: String,
    dump: OnceCell<RegistryDump>,
}

impl FileCreditorSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path.display().to_string();
        Self {
            path,
            label,
            dump: OnceCell::new(),
        }
    }

    async fn load(&self) -> Result<&RegistryDump> {
        self.dump.get_or_try_init(|| self.read()).await
    }

    async fn read(&self) -> Result<RegistryDump> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.label))?;
        let dump = match serde_json::from_str::<DumpFormat>(&raw)
            .with_context(|| format!("Invalid creditor file {}", self.label))?
        {
            DumpFormat::Full(dump) => dump,
            DumpFormat::List(creditors) => RegistryDump {
                creditors,
                ..Default::default()
            },
        };
        Ok(dump)
    }
}

#[async_trait]
impl CreditorSource for FileCreditorSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn fetch_creditors(&self) -> Result<Vec<NewCreditor>> {
        Ok(self.load().await?.creditors.clone())
    }

    async fn fetch_blacklist(&self) -> Result<Vec<String>> {
        Ok(self.load().await?.blacklist.clone())
    }

    async fn fetch_violations(&self) -> Result<Vec<ReportedViolation>> {
        Ok(self.load().await?.violations.clone())
    }
}

/// Fetches, reconciles, enriches and stores creditors from `source`.
pub async fn sync_creditors(store: &dyn CreditorStore, source: &dyn CreditorSource) -> GuardianResult<ImportStats> {
    info!("Syncing creditors from {}", source.name());

    let raw = source.fetch_creditors().await?;
    let fetched = raw.len();
    let mut creditors = standardize(raw);
    let merged = fetched - creditors.len();
    info!("Standardized {} records to {} unique creditors", fetched, creditors.len());

    enrich(&mut creditors, source).await;

    let mut stats = ImportStats::default();
    let batches = creditors.len().div_ceil(BATCH_SIZE);
    for (i, batch) in creditors.chunks(BATCH_SIZE).enumerate() {
        info!("Processing batch {}/{} ({} records)", i + 1, batches, batch.len());
        match store.upsert_creditors(batch.to_vec()).await {
            Ok(batch_stats) => stats += batch_stats,
            Err(e) => {
                error!("Batch {} failed: {}", i + 1, e);
                stats.errors += batch.len();
            }
        }
    }

    stats.total = fetched;
    stats.skipped += merged;
    info!(
        "Creditor sync finished: total={}, imported={}, updated={}, skipped={}, errors={}",
        stats.total, stats.imported, stats.updated, stats.skipped, stats.errors
    );
    Ok(stats)
}

/// Drops nameless records and merges duplicates, keyed by BULSTAT when
/// present and by normalised name otherwise. Earlier records win; later
/// duplicates only fill fields the earlier one lacks.
pub fn standardize(records: Vec<NewCreditor>) -> Vec<NewCreditor> {
    let mut order: Vec<String> = Vec::new();
    let mut by_key: HashMap<String, NewCreditor> = HashMap::new();

    for mut record in records {
        record.name = normalize_text(&record.name);
        if record.name.is_empty() {
            continue;
        }
        record.bulstat = record
            .bulstat
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty());

        let key = match &record.bulstat {
            Some(bulstat) => format!("bulstat:{bulstat}"),
            None => format!("name:{}", name_key(&record.name)),
        };

        match by_key.get_mut(&key) {
            Some(existing) => fill_missing(existing, record),
            None => {
                order.push(key.clone());
                by_key.insert(key, record);
            }
        }
    }

    order.into_iter().filter_map(|key| by_key.remove(&key)).collect()
}

fn fill_missing(existing: &mut NewCreditor, other: NewCreditor) {
    if existing.kind.is_none() {
        existing.kind = other.kind;
    }
    if existing.license_number.is_none() {
        existing.license_number = other.license_number;
    }
    if existing.address.is_none() {
        existing.address = other.address;
    }
    if existing.violations_count.is_none() {
        existing.violations_count = other.violations_count;
    }
    if existing.risk_score.is_none() {
        existing.risk_score = other.risk_score;
    }
    if existing.is_blacklisted.is_none() {
        existing.is_blacklisted = other.is_blacklisted;
    }
}

/// Adds violation counts and blacklist flags. Enrichment is best effort; a
/// failing feed is logged and skipped.
async fn enrich(creditors: &mut [NewCreditor], source: &dyn CreditorSource) {
    let violations = source.fetch_violations().await.unwrap_or_else(|e| {
        warn!("Could not fetch violations from {}: {}", source.name(), e);
        Vec::new()
    });
    let blacklist = source.fetch_blacklist().await.unwrap_or_else(|e| {
        warn!("Could not fetch blacklist from {}: {}", source.name(), e);
        Vec::new()
    });

    let mut violations_by_company: HashMap<String, i64> = HashMap::new();
    for v in &violations {
        let company = name_key(&normalize_text(&v.company));
        if !company.is_empty() {
            *violations_by_company.entry(company).or_default() += 1;
        }
    }
    let blacklisted: HashSet<String> = blacklist
        .iter()
        .map(|n| name_key(&normalize_text(n)))
        .filter(|n| !n.is_empty())
        .collect();

    let mut enriched = 0;
    for creditor in creditors.iter_mut() {
        let key = name_key(&creditor.name);
        if let Some(count) = violations_by_company.get(&key) {
            creditor.violations_count = Some(*count);
            enriched += 1;
        }
        if blacklisted.contains(&key) {
            creditor.is_blacklisted = Some(true);
            creditor.risk_score = Some(creditor.risk_score.unwrap_or(0.0).max(BLACKLIST_RISK_FLOOR));
        }
    }
    info!("Enriched {} creditors with violations", enriched);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::models::{CreditorKind, CreditorQuery};
    use crate::registry::store::SqliteCreditorStore;
    use axum::{routing::get, Json, Router};
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct FailingFeeds;

    #[async_trait]
    impl CreditorSource for FailingFeeds {
        fn name(&self) -> &str {
            "failing"
        }

        async fn fetch_creditors(&self) -> Result<Vec<NewCreditor>> {
            Ok(vec![NewCreditor::named("Кредит Експрес ООД")])
        }

        async fn fetch_blacklist(&self) -> Result<Vec<String>> {
            anyhow::bail!("blacklist offline")
        }
    }

    #[test]
    fn test_standardize_merges_duplicates() {
        let records = vec![
            NewCreditor {
                bulstat: Some(" 111 ".into()),
                ..NewCreditor::named("Алфа  ООД")
            },
            NewCreditor {
                bulstat: Some("111".into()),
                address: Some("София".into()),
                ..NewCreditor::named("Алфа ООД (стар)")
            },
            NewCreditor::named("Бета АД"),
            NewCreditor {
                kind: Some(CreditorKind::Bank),
                ..NewCreditor::named("бета ад")
            },
            NewCreditor::named("  "),
        ];

        let out = standardize(records);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "Алфа ООД");
        assert_eq!(out[0].bulstat.as_deref(), Some("111"));
        assert_eq!(out[0].address.as_deref(), Some("София"));
        assert_eq!(out[1].name, "Бета АД");
        assert_eq!(out[1].kind, Some(CreditorKind::Bank));
    }

    #[tokio::test]
    async fn test_file_source_sync() -> Result<()> {
        let db = NamedTempFile::new()?;
        let store = SqliteCreditorStore::new(db.path()).await?;

        let mut file = NamedTempFile::new()?;
        write!(
            file,
            "{}",
            json!({
                "creditors": [
                    {"name": "ФинКредит ООД", "type": "non-bank", "bulstat": "123456789"},
                    {"name": "БързЗаем ЕАД", "type": "non-bank"},
                    {"name": "ФинКредит ООД", "bulstat": "123456789", "address": "София"},
                    {"name": ""}
                ],
                "blacklist": ["бърззаем еад"],
                "violations": [{"company": "ФинКредит ООД"}, {"company": "финкредит ооД"}]
            })
        )?;

        let source = FileCreditorSource::new(file.path());
        let stats = sync_creditors(&store, &source).await?;
        assert_eq!(stats.total, 4);
        assert_eq!(stats.imported, 2);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.errors, 0);

        let fin = store.find_by_name("финкредит").await?.unwrap();
        assert_eq!(fin.violations_count, 2);
        assert_eq!(fin.address.as_deref(), Some("София"));

        let fast = store.find_by_name("бърззаем").await?.unwrap();
        assert!(fast.is_blacklisted);
        assert_eq!(fast.risk_score, BLACKLIST_RISK_FLOOR);

        // a second run only updates
        let again = sync_creditors(&store, &source).await?;
        assert_eq!(again.imported, 0);
        assert_eq!(again.updated, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_plain_array_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(file, r#"[{{"name": "Гама Банк АД", "type": "bank"}}]"#)?;
        let source = FileCreditorSource::new(file.path());
        let creditors = source.fetch_creditors().await?;
        assert_eq!(creditors.len(), 1);
        assert!(source.fetch_blacklist().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_file_is_parsed_once() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(
            file,
            "{}",
            json!({"creditors": [{"name": "Гама Банк АД"}], "blacklist": ["Гама Банк АД"]})
        )?;
        let source = FileCreditorSource::new(file.path());
        assert_eq!(source.fetch_creditors().await?.len(), 1);

        // later fetches are served from the first parse
        file.as_file().set_len(0)?;
        assert_eq!(source.fetch_blacklist().await?, vec!["Гама Банк АД".to_string()]);
        assert!(source.fetch_violations().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_file_is_an_error() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(file, "not json")?;
        let source = FileCreditorSource::new(file.path());
        assert!(source.fetch_creditors().await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_enrichment_failure_is_not_fatal() -> Result<()> {
        let db = NamedTempFile::new()?;
        let store = SqliteCreditorStore::new(db.path()).await?;
        let stats = sync_creditors(&store, &FailingFeeds).await?;
        assert_eq!(stats.imported, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_http_source() -> Result<()> {
        let app = Router::new()
            .route(
                "/creditors",
                get(|| async { Json(json!([{"name": "Делта Кредит ООД", "type": "non-bank"}])) }),
            )
            .route("/blacklist", get(|| async { Json(json!(["Делта Кредит ООД"])) }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let db = NamedTempFile::new()?;
        let store = SqliteCreditorStore::new(db.path()).await?;
        let source = HttpCreditorSource::new(format!("http://{addr}/"));
        // violations feed is absent and treated as empty
        assert!(source.fetch_violations().await?.is_empty());

        let stats = sync_creditors(&store, &source).await?;
        assert_eq!(stats.imported, 1);

        let page = store
            .search(&CreditorQuery {
                blacklisted: Some(true),
                ..Default::default()
            })
            .await?;
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "Делта Кредит ООД");
        Ok(())
    }
}
