//! Sample data for local development and demos.

use chrono::Utc;
use tracing::info;

use super::models::{CreditorKind, NewCreditor, UnfairClauseRecord, Violation};
use super::store::CreditorStore;
use crate::analyzers::Severity;
use crate::error::{GuardianError, GuardianResult};

fn sample_creditors() -> Vec<NewCreditor> {
    vec![
        NewCreditor {
            kind: Some(CreditorKind::NonBank),
            bulstat: Some("123456789".into()),
            address: Some("София".into()),
            ..NewCreditor::named("ФинКредит ООД")
        },
        NewCreditor {
            kind: Some(CreditorKind::NonBank),
            bulstat: Some("987654321".into()),
            address: Some("Пловдив".into()),
            ..NewCreditor::named("БързЗаем ЕАД")
        },
    ]
}

fn sample_violations() -> Vec<Violation> {
    let today = Some(Utc::now().date_naive());
    vec![
        Violation {
            violation_type: Some("незаконна такса".into()),
            law_reference: Some("чл. 10а ЗПК".into()),
            authority: Some("KZP".into()),
            severity: Severity::High,
            penalty_amount: Some(5000.0),
            decision_date: today,
            ..Default::default()
        },
        Violation {
            violation_type: Some("некоректен ГПР".into()),
            law_reference: Some("чл. 10 ЗПК".into()),
            authority: Some("KZP".into()),
            severity: Severity::Critical,
            penalty_amount: Some(12000.0),
            decision_date: today,
            ..Default::default()
        },
    ]
}

/// Inserts two sample creditors with their violations and one confirmed
/// unfair clause. Returns `false` without touching anything when the
/// samples are already present.
pub async fn seed_sample_data(store: &dyn CreditorStore) -> GuardianResult<bool> {
    let creditors = sample_creditors();
    if store.find_by_name(&creditors[0].name).await?.is_some() {
        info!("Sample creditors already present, skipping seed");
        return Ok(false);
    }

    let names: Vec<String> = creditors.iter().map(|c| c.name.clone()).collect();
    store.upsert_creditors(creditors).await?;

    let mut ids = Vec::with_capacity(names.len());
    for name in &names {
        let creditor = store
            .find_by_name(name)
            .await?
            .ok_or_else(|| GuardianError::Internal(anyhow::anyhow!("Seeded creditor {name} is missing")))?;
        ids.push(creditor.id);
    }

    for (idx, violation) in sample_violations().into_iter().enumerate() {
        store
            .add_violation(Violation {
                creditor_id: ids[idx % ids.len()],
                ..violation
            })
            .await?;
    }

    store
        .add_unfair_clause(UnfairClauseRecord {
            creditor_id: ids[0],
            clause_text: "Кредиторът може едностранно да променя лихвата без уведомление.".into(),
            clause_type: Some("Едностранно изменение".into()),
            legal_basis: Some("чл. 143 ЗЗП".into()),
            is_confirmed_illegal: true,
            ..Default::default()
        })
        .await?;

    for id in &ids {
        store.recalculate_risk(*id).await?;
    }

    info!("Seed data inserted for {} creditors", ids.len());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::store::SqliteCreditorStore;
    use anyhow::Result;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_seed_once() -> Result<()> {
        let db = NamedTempFile::new()?;
        let store = SqliteCreditorStore::new(db.path()).await?;

        assert!(seed_sample_data(&store).await?);
        assert!(!seed_sample_data(&store).await?);

        let stats = store.stats().await?;
        assert_eq!(stats.creditors, 2);
        assert_eq!(stats.violations, 2);
        assert_eq!(stats.critical_violations, 1);
        assert_eq!(stats.unfair_clauses, 1);

        // high violation (2) + confirmed clause (1.5)
        let fin = store.profile("ФинКредит").await?;
        assert_eq!(fin.creditor.risk_score, 3.5);
        let fast = store.profile("БързЗаем").await?;
        assert_eq!(fast.creditor.risk_score, 3.0);
        Ok(())
    }
}
