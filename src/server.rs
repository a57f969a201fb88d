//! REST Server
//!
//! axum router over the analyzers and the creditor registry.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::analyzers::ai::{AiReview, Consumer, ContractReviewer};
use crate::analyzers::contract::{ContractAnalysis, ContractAnalyzer, DocumentKind};
use crate::analyzers::gpr::{
    EarlyRepaymentCompensation, EarlyRepaymentRequest, GprCalculation, GprRequest, GprVerification,
    GprVerifyRequest,
};
use crate::analyzers::DetectedClause;
use crate::config::AppConfig;
use crate::error::{GuardianError, GuardianResult};
use crate::ratelimit::RouteQuota;
use crate::registry::{CreditorProfile, CreditorQuery, CreditorStore, RegistryStats, SearchPage};
use crate::reports;

pub const SERVICE_NAME: &str = "credit-guardian-api";
const UPLOAD_FIELD: &str = "file";
const ANALYZE_ROUTE: &str = "/api/contract/analyze";
const AI_ROUTE: &str = "/api/ai/analyze";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CreditorStore>,
    pub analyzer: Arc<ContractAnalyzer>,
    pub reviewer: Arc<ContractReviewer>,
    pub analyze_quota: RouteQuota,
    pub ai_quota: RouteQuota,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn CreditorStore>, config: AppConfig) -> Self {
        Self {
            store,
            analyzer: Arc::new(ContractAnalyzer::new()),
            reviewer: Arc::new(ContractReviewer::from_config(&config)),
            analyze_quota: RouteQuota::per_minute(ANALYZE_ROUTE, config.analyze_per_minute),
            ai_quota: RouteQuota::per_minute(AI_ROUTE, config.analyze_per_minute),
            config: Arc::new(config),
        }
    }

    /// Replaces the Ollama-backed reviewer.
    pub fn with_reviewer(mut self, reviewer: ContractReviewer) -> Self {
        self.reviewer = Arc::new(reviewer);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplaintRequest {
    pub creditor: String,
    pub clauses: Vec<DetectedClause>,
    /// Defaults to today.
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplaintResponse {
    pub creditor: String,
    pub date: NaiveDate,
    pub complaint: String,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/readiness", get(readiness))
        .route("/api/stats", get(stats))
        .route("/api/gpr/calculate", post(calculate_gpr))
        .route("/api/gpr/verify", post(verify_gpr))
        .route("/api/gpr/early-repayment", post(early_repayment))
        .route(
            ANALYZE_ROUTE,
            post(analyze_contract).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(AI_ROUTE, post(ai_analyze).layer(DefaultBodyLimit::max(upload_limit)))
        .route("/api/creditor/{name}", get(creditor_profile))
        .route("/api/creditor/{name}/report", get(creditor_report))
        .route("/api/creditors", get(search_creditors))
        .route("/api/complaint", post(complaint))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(state: AppState) -> anyhow::Result<()> {
    let addr = state.config.bind_address();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Credit Guardian API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> GuardianResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| GuardianError::Validation(rejection.body_text()))
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "service": "Credit Guardian API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/api/gpr/calculate",
            "/api/gpr/verify",
            "/api/gpr/early-repayment",
            "/api/contract/analyze",
            "/api/ai/analyze",
            "/api/creditor/{name}",
            "/api/creditor/{name}/report",
            "/api/creditors",
            "/api/complaint",
            "/api/stats",
        ],
    }))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "service": SERVICE_NAME }))
}

async fn readiness(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(()) => Json(json!({ "status": "ready", "database": "connected" })).into_response(),
        Err(e) => {
            error!("Readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "not_ready",
                    "database": "disconnected",
                    "detail": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

async fn stats(State(state): State<AppState>) -> GuardianResult<Json<RegistryStats>> {
    Ok(Json(state.store.stats().await?))
}

async fn calculate_gpr(
    State(state): State<AppState>,
    payload: Result<Json<GprRequest>, JsonRejection>,
) -> GuardianResult<Json<GprCalculation>> {
    let req = body(payload)?;
    Ok(Json(state.analyzer.gpr_calculator().calculate(&req)?))
}

async fn verify_gpr(
    State(state): State<AppState>,
    payload: Result<Json<GprVerifyRequest>, JsonRejection>,
) -> GuardianResult<Json<GprVerification>> {
    let req = body(payload)?;
    Ok(Json(state.analyzer.gpr_calculator().verify(req.declared_gpr, &req.loan)?))
}

async fn early_repayment(
    State(state): State<AppState>,
    payload: Result<Json<EarlyRepaymentRequest>, JsonRejection>,
) -> GuardianResult<Json<EarlyRepaymentCompensation>> {
    let req = body(payload)?;
    Ok(Json(state.analyzer.gpr_calculator().early_repayment_compensation(&req)?))
}

async fn analyze_contract(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> GuardianResult<Json<ContractAnalysis>> {
    state.analyze_quota.check()?;

    let (filename, bytes) = read_upload(&mut multipart).await?;
    info!("Analyzing uploaded contract {} ({} bytes)", filename, bytes.len());

    let analyzer = state.analyzer.clone();
    let analysis = task::spawn_blocking(move || analyzer.analyze_document(&filename, &bytes)).await??;
    Ok(Json(analysis))
}

async fn ai_analyze(
    State(state): State<AppState>,
    consumer: Result<Query<Consumer>, QueryRejection>,
    mut multipart: Multipart,
) -> GuardianResult<Json<AiReview>> {
    let Query(consumer) = consumer.map_err(|rejection| GuardianError::Validation(rejection.body_text()))?;
    state.ai_quota.check()?;

    let (filename, bytes) = read_upload(&mut multipart).await?;
    info!("AI review of uploaded contract {} ({} bytes)", filename, bytes.len());

    let analyzer = state.analyzer.clone();
    let text = task::spawn_blocking(move || analyzer.read_document(&filename, &bytes)).await??;
    Ok(Json(state.reviewer.review(&text, &consumer).await?))
}

/// First `file` field of the form, checked for a supported extension before
/// its body is read.
async fn read_upload(multipart: &mut Multipart) -> GuardianResult<(String, Bytes)> {
    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| GuardianError::validation("Липсва име на файла"))?;
        DocumentKind::from_filename(&filename)?;

        let bytes = field.bytes().await.map_err(upload_error)?;
        return Ok((filename, bytes));
    }

    Err(GuardianError::validation(format!("Липсва поле „{UPLOAD_FIELD}“ с файл")))
}

fn upload_error(err: axum::extract::multipart::MultipartError) -> GuardianError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GuardianError::TooLarge("Файлът надвишава максимално допустимия размер".to_string())
    } else {
        GuardianError::Validation(err.body_text())
    }
}

async fn creditor_profile(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> GuardianResult<Json<CreditorProfile>> {
    Ok(Json(state.store.profile(&name).await?))
}

async fn creditor_report(State(state): State<AppState>, Path(name): Path<String>) -> GuardianResult<Response> {
    let profile = state.store.profile(&name).await?;
    let report = reports::creditor_report(&profile, Utc::now().date_naive());
    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))],
        report,
    )
        .into_response())
}

async fn search_creditors(
    State(state): State<AppState>,
    query: Result<Query<CreditorQuery>, QueryRejection>,
) -> GuardianResult<Json<SearchPage>> {
    let Query(query) = query.map_err(|rejection| GuardianError::Validation(rejection.body_text()))?;
    Ok(Json(state.store.search(&query).await?))
}

async fn complaint(
    State(state): State<AppState>,
    payload: Result<Json<ComplaintRequest>, JsonRejection>,
) -> GuardianResult<Json<ComplaintResponse>> {
    let req = body(payload)?;
    let creditor = req.creditor.trim();
    if creditor.is_empty() {
        return Err(GuardianError::validation("Посочете кредитор"));
    }
    if req.clauses.is_empty() {
        return Err(GuardianError::validation("Няма клаузи за жалбата"));
    }

    let date = req.date.unwrap_or_else(|| Utc::now().date_naive());
    let text = state
        .analyzer
        .clause_detector()
        .complaint(&req.clauses, creditor, date);

    Ok(Json(ComplaintResponse {
        creditor: creditor.to_string(),
        date,
        complaint: text,
    }))
}
