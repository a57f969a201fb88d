use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tempfile::NamedTempFile;

use credit_guardian::analyzers::ai::{Consumer, ContractReviewer, LlmProvider};
use credit_guardian::analyzers::gpr::{EarlyRepaymentRequest, GprRequest};
use credit_guardian::registry::seed::seed_sample_data;
use credit_guardian::registry::{CreditorKind, CreditorQuery};
use credit_guardian::{create_router, ApiClient, AppConfig, AppState, ClientError, SqliteCreditorStore};

async fn spawn_server() -> Result<(NamedTempFile, ApiClient)> {
    spawn_server_with(None).await
}

async fn spawn_server_with(reviewer: Option<ContractReviewer>) -> Result<(NamedTempFile, ApiClient)> {
    let db = NamedTempFile::new()?;
    let store = SqliteCreditorStore::new(db.path()).await?;
    seed_sample_data(&store).await?;

    let config = AppConfig {
        database_path: db.path().to_path_buf(),
        ..Default::default()
    };
    let mut state = AppState::new(Arc::new(store), config);
    if let Some(reviewer) = reviewer {
        state = state.with_reviewer(reviewer);
    }
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok((db, ApiClient::new(format!("http://{addr}"))))
}

fn loan() -> GprRequest {
    GprRequest {
        amount: 1000.0,
        total_repayment: 1200.0,
        term_months: 12,
        fees: vec![],
        schedule: None,
    }
}

#[tokio::test]
async fn test_client_health_and_stats() -> Result<()> {
    let (_db, client) = spawn_server().await?;

    let health = client.health().await?;
    assert_eq!(health["status"], "healthy");

    let stats = client.stats().await?;
    assert_eq!(stats.creditors, 2);
    assert_eq!(stats.critical_violations, 1);
    Ok(())
}

#[tokio::test]
async fn test_client_gpr_calls() -> Result<()> {
    let (_db, client) = spawn_server().await?;

    let calc = client.calculate_gpr(&loan()).await?;
    assert_eq!(calc.overpayment, 200.0);

    let verification = client.verify_gpr(calc.gpr_exact, &loan()).await?;
    assert!(verification.is_correct);

    let compensation = client
        .early_repayment(&EarlyRepaymentRequest {
            remaining_principal: 5000.0,
            remaining_months: 6,
            interest_rate: 12.0,
        })
        .await?;
    // 0.5% cap with a year or less remaining
    assert_eq!(compensation.calculated_compensation, 25.0);
    Ok(())
}

#[tokio::test]
async fn test_client_validation_error_carries_detail() -> Result<()> {
    let (_db, client) = spawn_server().await?;

    let mut bad = loan();
    bad.term_months = 0;
    match client.calculate_gpr(&bad).await {
        Err(ClientError::Api { status, detail }) => {
            assert_eq!(status, 400);
            assert!(detail.contains("месец"));
        }
        other => panic!("expected API error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_client_contract_and_complaint() -> Result<()> {
    let (_db, client) = spawn_server().await?;

    let text = "Кредитор: ФинКредит ООД. Кредиторът има право едностранно да промени таксите.";
    let analysis = client.analyze_contract("contract.txt", text.as_bytes().to_vec()).await?;
    assert_eq!(analysis.creditor, "ФинКредит ООД");
    assert_eq!(analysis.unfair_clauses.len(), 1);

    let complaint = client.complaint(&analysis.creditor, &analysis.unfair_clauses).await?;
    assert!(complaint.complaint.contains("Едностранно изменение"));

    match client.analyze_contract("contract.docx", b"PK".to_vec()).await {
        Err(ClientError::Api { status, detail }) => {
            assert_eq!(status, 400);
            assert!(detail.contains("Поддържат се"));
        }
        other => panic!("expected API error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_client_creditor_lookup() -> Result<()> {
    let (_db, client) = spawn_server().await?;

    // path segment with spaces and Cyrillic
    let profile = client.creditor("БързЗаем ЕАД").await?;
    assert_eq!(profile.creditor.kind, CreditorKind::NonBank);
    assert_eq!(profile.violations.len(), 1);

    let report = client.creditor_report("ФинКредит").await?;
    assert!(report.contains("=== НАРУШЕНИЯ ==="));

    match client.creditor("Няма такъв").await {
        Err(ClientError::Api { status, detail }) => {
            assert_eq!(status, 404);
            assert_eq!(detail, "Кредитор не намерен");
        }
        other => panic!("expected 404, got {other:?}"),
    }

    let page = client
        .search_creditors(&CreditorQuery {
            q: Some("заем".into()),
            kind: Some(CreditorKind::NonBank),
            ..Default::default()
        })
        .await?;
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].name, "БързЗаем ЕАД");

    let page = client.search_creditors(&CreditorQuery::default()).await?;
    assert_eq!(page.total, 2);
    Ok(())
}

/// Echoes the consumer block of complaint prompts.
struct EchoProvider;

#[async_trait]
impl LlmProvider for EchoProvider {
    async fn generate(&self, _model: &str, prompt: String, _system: Option<String>) -> Result<String> {
        match prompt.split_once("ИМЕ: ") {
            Some((_, consumer)) => Ok(consumer.to_string()),
            None => Ok(r#"{"summary": "Договорът съдържа неравноправни клаузи"}"#.to_string()),
        }
    }
}

#[tokio::test]
async fn test_client_ai_analyze() -> Result<()> {
    let reviewer = ContractReviewer::new(Arc::new(EchoProvider), "llama3.2");
    let (_db, client) = spawn_server_with(Some(reviewer)).await?;

    let consumer = Consumer {
        name: "Мария Петрова".into(),
        address: "гр. Варна, ул. Морска 5".into(),
    };
    let text = "Кредитор: ФинКредит ООД. Кредиторът има право едностранно да промени таксите.";
    let review = client.ai_analyze("contract.txt", text.as_bytes().to_vec(), &consumer).await?;

    assert_eq!(review.model, "llama3.2");
    assert_eq!(review.analysis["summary"], "Договорът съдържа неравноправни клаузи");
    assert_eq!(review.complaint, "Мария Петрова\nАДРЕС: гр. Варна, ул. Морска 5");
    assert_eq!(review.text_excerpt, text);

    match client.ai_analyze("contract.doc", b"x".to_vec(), &consumer).await {
        Err(ClientError::Api { status, .. }) => assert_eq!(status, 400),
        other => panic!("expected API error, got {other:?}"),
    }
    Ok(())
}
