//! HTTP API for the ledger node.

use crate::grid_store::LedgerError;
use crate::ledger::Ledger;
use crate::ws::ws_events_handler;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tessera_core::{
    AccessRequest, Cell, Color, GridSnapshot, Identity, PolicySnapshot, Receipt, RejectCode,
    SignedSetColor,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

type AppState = Arc<Ledger>;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    // CORS layer for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        // Grid reads
        .route("/api/v1/grid", get(get_grid))
        .route("/api/v1/grid/cells/:row/:column", get(get_cell))
        // Access policy
        .route("/api/v1/policy", get(get_policy))
        .route("/api/v1/access/:identity", get(get_access))
        // Writes
        .route("/api/v1/transactions", post(submit_transaction))
        // Moderation requests
        .route("/api/v1/access-requests", post(request_access))
        // WebSocket for change events
        .route("/api/v1/ws/events", get(ws_events_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Error body for rejected requests.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: RejectCode,
    reason: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn reject(e: LedgerError) -> ApiError {
    let status = match &e {
        LedgerError::AccessDenied(_) | LedgerError::NotOwner(_) => StatusCode::FORBIDDEN,
        LedgerError::Inactive => StatusCode::LOCKED,
        LedgerError::NotInitialized
        | LedgerError::AlreadyInitialized
        | LedgerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::OutOfBounds(_) | LedgerError::ColumnOutOfBounds(_) => StatusCode::NOT_FOUND,
        LedgerError::InvalidSignature => StatusCode::BAD_REQUEST,
        LedgerError::WrongGrid => StatusCode::CONFLICT,
    };
    (
        status,
        Json(ErrorBody {
            code: e.reject_code(),
            reason: e.to_string(),
        }),
    )
}

// --- Health endpoints ---

async fn health() -> &'static str {
    "OK"
}

// --- Grid endpoints ---

async fn get_grid(State(ledger): State<AppState>) -> Result<Json<GridSnapshot>, ApiError> {
    ledger.snapshot().await.map(Json).map_err(reject)
}

#[derive(Debug, Serialize)]
struct CellColor {
    cell: Cell,
    color: Color,
}

async fn get_cell(
    State(ledger): State<AppState>,
    Path((row, column)): Path<(u32, u32)>,
) -> Result<Json<CellColor>, ApiError> {
    let cell = Cell::new(row, column);
    let color = ledger.get_color(cell).await.map_err(reject)?;
    Ok(Json(CellColor { cell, color }))
}

// --- Access endpoints ---

async fn get_policy(State(ledger): State<AppState>) -> Json<PolicySnapshot> {
    Json(ledger.policy().await)
}

/// Access status response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessStatus {
    identity: Identity,
    has_access: bool,
    may_paint: bool,
}

async fn get_access(
    State(ledger): State<AppState>,
    Path(identity): Path<String>,
) -> Result<Json<AccessStatus>, StatusCode> {
    let identity: Identity = identity.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    let policy = ledger.policy().await;
    let has_access = ledger.has_access(&identity).await;

    Ok(Json(AccessStatus {
        identity,
        has_access,
        may_paint: policy.active && (has_access || !policy.requires_access_checks),
    }))
}

// --- Write endpoints ---

/// Submit a signed transaction and wait for it to be committed.
async fn submit_transaction(
    State(ledger): State<AppState>,
    Json(tx): Json<SignedSetColor>,
) -> Result<Json<Receipt>, ApiError> {
    let submitted = ledger.submit(tx).await.map_err(reject)?;
    let receipt = submitted.outcome().await.map_err(reject)?;
    Ok(Json(receipt))
}

async fn request_access(
    State(ledger): State<AppState>,
    Json(request): Json<AccessRequest>,
) -> StatusCode {
    match ledger.record_access_request(&request) {
        Ok(_) => StatusCode::ACCEPTED,
        Err(crate::Error::Core(_)) => StatusCode::BAD_REQUEST,
        Err(e) => {
            tracing::error!("Failed to store access request: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
