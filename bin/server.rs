// Peer Bank Normalizer - Web Server
// REST API with Axum over the same store the CLI writes

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use peer_bank_normalizer::{
    available_periods, compare, reconcile,
    config::Config,
    credentials::{self, CredentialStore},
    export::{export_csv_string, export_filename},
    logging, AuditTrail, Bank, ComparisonGrid, ComparisonQuery, CredentialError, Currency,
    IngestedDocument, Ingestor, QueryError, ReconciliationReport, StandardizedSegment, Store,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<Store>,
    ingestor: Arc<Ingestor>,
    config: Arc<Config>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
        .into_response()
    }
}

fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    let message = message.into();
    if status.is_server_error() {
        error!(%message, "request failed");
    }
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        }),
    )
        .into_response()
}

fn parse_or_400<T: std::str::FromStr<Err = String>>(raw: Option<&str>, default: T) -> Result<T, Response> {
    match raw {
        Some(text) if !text.trim().is_empty() => text.parse().map_err(|e| fail(StatusCode::BAD_REQUEST, e)),
        _ => Ok(default),
    }
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Deserialize)]
struct CompareParams {
    period: Option<String>,
    segment: Option<String>,
    currency: Option<String>,
    /// Comma-separated bank codes
    banks: Option<String>,
}

impl CompareParams {
    fn query(&self) -> Result<ComparisonQuery, Response> {
        let defaults = ComparisonQuery::default();
        let segment = parse_or_400::<StandardizedSegment>(self.segment.as_deref(), defaults.segment)?;
        let currency = parse_or_400::<Currency>(self.currency.as_deref(), defaults.display_currency)?;

        let mut banks = Vec::new();
        for code in self.banks.as_deref().unwrap_or("").split(',').filter(|c| !c.trim().is_empty()) {
            banks.push(code.parse::<Bank>().map_err(|e| fail(StatusCode::BAD_REQUEST, e))?);
        }

        Ok(
            ComparisonQuery::new(self.period.as_deref().unwrap_or(&defaults.period), segment, currency)
                .with_banks(&banks),
        )
    }
}

#[derive(Deserialize)]
struct UploadParams {
    filename: String,
    bank: Option<String>,
    period: Option<String>,
}

#[derive(Deserialize)]
struct ReconcileParams {
    period: Option<String>,
}

#[derive(Deserialize)]
struct ApiKeyRequest {
    key: String,
}

#[derive(Serialize)]
struct ApiKeyStatus {
    configured: bool,
    masked: Option<String>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// GET /api/periods - Periods holding data, newest first
async fn get_periods(State(state): State<AppState>) -> Response {
    match available_periods(&state.store) {
        Ok(periods) => ApiResponse::ok(periods),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn build_grid(state: &AppState, params: &CompareParams) -> Result<ComparisonGrid, Response> {
    let query = params.query()?;
    compare(&state.store, &query, &state.config.display_rates).map_err(|e| match e {
        QueryError::Store(_) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        _ => fail(StatusCode::BAD_REQUEST, e.to_string()),
    })
}

/// GET /api/compare - Comparison grid
async fn get_compare(State(state): State<AppState>, Query(params): Query<CompareParams>) -> Response {
    match build_grid(&state, &params) {
        Ok(grid) => ApiResponse::ok(grid),
        Err(response) => response,
    }
}

/// GET /api/compare.csv - Comparison grid as a spreadsheet download
async fn get_compare_csv(State(state): State<AppState>, Query(params): Query<CompareParams>) -> Response {
    let grid = match build_grid(&state, &params) {
        Ok(grid) => grid,
        Err(response) => return response,
    };

    match export_csv_string(&grid) {
        Ok(body) => {
            let disposition = format!(
                "attachment; filename*=UTF-8''{}",
                urlencoding::encode(&export_filename(&grid))
            );
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                body,
            )
                .into_response()
        }
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)),
    }
}

/// GET /api/documents - Ingested documents, newest first
async fn get_documents(State(state): State<AppState>) -> Response {
    match state.store.documents() {
        Ok(documents) => ApiResponse::<Vec<IngestedDocument>>::ok(documents),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// POST /api/documents?filename=... - Ingest the raw request body
async fn post_document(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Response {
    let explicit_bank = match params.bank.as_deref().map(str::parse::<Bank>).transpose() {
        Ok(bank) => bank,
        Err(e) => return fail(StatusCode::BAD_REQUEST, e),
    };

    let ingestor = Arc::clone(&state.ingestor);
    let result = tokio::task::spawn_blocking(move || {
        ingestor.ingest_with(&body, &params.filename, explicit_bank, params.period.as_deref())
    })
    .await;

    match result {
        Ok(Ok(report)) => ApiResponse::ok(report),
        Ok(Err(e)) => fail(StatusCode::UNPROCESSABLE_ENTITY, format!("{:#}", e)),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// POST /api/reset - Drop uploads and reseed the baseline
async fn post_reset(State(state): State<AppState>) -> Response {
    let ingestor = Arc::clone(&state.ingestor);
    match tokio::task::spawn_blocking(move || ingestor.reset()).await {
        Ok(Ok(reports)) => ApiResponse::ok(reports),
        Ok(Err(e)) => fail(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/points/:id/audit - Audit trail of one data point
async fn get_point_audit(State(state): State<AppState>, Path(point_id): Path<String>) -> Response {
    let checker = match state.config.checker() {
        Ok(checker) => checker,
        Err(e) => return fail(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)),
    };

    match AuditTrail::load(&state.store, &point_id, &checker) {
        Ok(Some(trail)) => ApiResponse::ok(trail),
        Ok(None) => fail(StatusCode::NOT_FOUND, format!("No data point {}", point_id)),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/reconciliation - Segment sums vs Group totals
async fn get_reconciliation(State(state): State<AppState>, Query(params): Query<ReconcileParams>) -> Response {
    match reconcile(&state.store, params.period.as_deref(), state.ingestor.checker()) {
        Ok(report) => ApiResponse::<ReconciliationReport>::ok(report),
        Err(e @ QueryError::Store(_)) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        Err(e) => fail(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// GET /api/settings/api-key - Whether a key is stored (never the key itself)
async fn get_api_key(State(state): State<AppState>) -> Response {
    match CredentialStore::new(Arc::clone(&state.store)).api_key() {
        Ok(key) => ApiResponse::ok(ApiKeyStatus {
            configured: key.is_some(),
            masked: key.as_deref().map(credentials::mask),
        }),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// PUT /api/settings/api-key - Store the assistant API key
async fn put_api_key(State(state): State<AppState>, Json(request): Json<ApiKeyRequest>) -> Response {
    match CredentialStore::new(Arc::clone(&state.store)).set_api_key(&request.key) {
        Ok(()) => ApiResponse::ok(ApiKeyStatus {
            configured: true,
            masked: Some(credentials::mask(&request.key)),
        }),
        Err(CredentialError::EmptyKey) => fail(StatusCode::BAD_REQUEST, CredentialError::EmptyKey.to_string()),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load(None)?;
    logging::init_logging(config.log_json);

    println!("🌐 Peer Bank Normalizer - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let store = config.open_store()?;
    println!("✓ Database opened: {:?}", config.database_path);

    let ingestor = Arc::new(config.ingestor(Arc::clone(&store))?);
    let addr = config.server_addr.clone();

    // Create shared state
    let state = AppState {
        store,
        ingestor,
        config: Arc::new(config),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/periods", get(get_periods))
        .route("/compare", get(get_compare))
        .route("/compare.csv", get(get_compare_csv))
        .route("/documents", get(get_documents).post(post_document))
        .route("/reset", post(post_reset))
        .route("/points/:id/audit", get(get_point_audit))
        .route("/reconciliation", get(get_reconciliation))
        .route("/settings/api-key", put(put_api_key).get(get_api_key))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(%addr, "server listening");
    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/compare", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
