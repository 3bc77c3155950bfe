//! Bounty Ledger Server
//!
//! HTTP adapter over [`BountyCore`]. A trusted gateway authenticates callers
//! and forwards their identity in `x-actor-pubkey`. The caller's role comes
//! from the membership of the workspace each operation touches; an optional
//! `x-actor-role` can only narrow it (e.g. a read-only token). Storage work
//! runs on the blocking pool.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::{Actor, Role};
use crate::error::{BountyError, ErrorKind};
use crate::ledger::LedgerReport;
use crate::payments::DepositReceipt;
use crate::service::BountyCore;
use crate::types::{
    Bounty, BountyActivity, BountyPatch, BountyProof, BountyRequest, BountyStatus, NewBounty,
    PaymentDetail, RequestStatus, ReviewDecision, Transaction, TransactionStatus, WorkspaceBudget,
};

pub const PUBKEY_HEADER: &str = "x-actor-pubkey";
pub const ROLE_HEADER: &str = "x-actor-role";

const DEFAULT_ACTIVITY_LIMIT: u32 = 100;

pub struct AppState {
    pub core: BountyCore,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(core: BountyCore) -> Self {
        Self {
            core,
            started_at: Instant::now(),
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Workspaces
        .route(
            "/workspaces/:workspace_id/bounties",
            get(list_bounties_handler).post(create_bounty_handler),
        )
        .route("/workspaces/:workspace_id/budget", get(budget_handler))
        .route("/workspaces/:workspace_id/deposits", post(deposit_handler))
        .route(
            "/workspaces/:workspace_id/transactions",
            get(list_transactions_handler),
        )
        .route("/workspaces/:workspace_id/ledger", get(verify_ledger_handler))
        .route(
            "/workspaces/:workspace_id/activity",
            get(workspace_activity_handler),
        )
        // Bounty lifecycle
        .route(
            "/bounties/:id",
            get(get_bounty_handler)
                .patch(update_bounty_handler)
                .delete(delete_bounty_handler),
        )
        .route("/bounties/:id/publish", post(publish_handler))
        .route("/bounties/:id/assign", post(assign_handler))
        .route("/bounties/:id/unassign", post(unassign_handler))
        .route("/bounties/:id/claim", post(claim_handler))
        .route("/bounties/:id/unclaim", post(unclaim_handler))
        .route("/bounties/:id/complete", post(complete_handler))
        .route("/bounties/:id/cancel", post(cancel_handler))
        .route("/bounties/:id/activity", get(bounty_activity_handler))
        // Requests
        .route(
            "/bounties/:id/requests",
            get(list_requests_handler).post(create_request_handler),
        )
        .route("/requests/:id/review", post(review_request_handler))
        .route("/requests/:id", axum::routing::delete(cancel_request_handler))
        // Proofs
        .route(
            "/bounties/:id/proofs",
            get(list_proofs_handler).post(submit_proof_handler),
        )
        .route("/proofs/:id/review", post(review_proof_handler))
        .route("/proofs/:id", axum::routing::delete(delete_proof_handler))
        // Payments
        .route(
            "/bounties/:id/payments",
            get(latest_payment_handler).post(initiate_payment_handler),
        )
        .route("/transactions/:id/status", post(payment_status_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody {
                code: ErrorKind::Internal.code(),
                message: message.into(),
            },
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::InsufficientBudget => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict | ErrorKind::AlreadyAssigned | ErrorKind::AlreadyPaid => {
            StatusCode::CONFLICT
        }
        ErrorKind::InvalidState
        | ErrorKind::InvalidTransactionStatus
        | ErrorKind::NoAcceptedProof
        | ErrorKind::NoAssignee
        | ErrorKind::NoTransaction => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<BountyError> for ApiError {
    fn from(err: BountyError) -> Self {
        let kind = err.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            error!("Request failed: {}", err);
        } else {
            warn!("Request rejected ({}): {}", kind.code(), err);
        }
        let message = match kind {
            // Storage details stay in the log.
            ErrorKind::Internal => "internal error".to_string(),
            _ => err.to_string(),
        };
        Self {
            status,
            body: ErrorBody {
                code: kind.code(),
                message,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.body })),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Run core work on the blocking pool.
async fn blocking<T, F>(f: F) -> std::result::Result<T, ApiError>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("Blocking task failed: {}", e);
            ApiError::internal("task failed")
        })?
        .map_err(ApiError::from)
}

// ============================================================================
// ACTOR EXTRACTION
// ============================================================================

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let pubkey = header(parts, PUBKEY_HEADER).ok_or(BountyError::Unauthorized)?;
        // Without a role header the stored membership role applies unchanged.
        let role = match header(parts, ROLE_HEADER) {
            Some(role) => role.parse::<Role>()?,
            None => Role::Owner,
        };
        Ok(Actor::new(pubkey, role)?)
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

// ============================================================================
// HEALTH
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
    pub uptime_secs: u64,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

// ============================================================================
// WORKSPACES
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StatusQuery<T> {
    pub status: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DepositBody {
    pub amount: u64,
    #[serde(default)]
    pub memo: Option<String>,
}

async fn create_bounty_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(workspace_id): Path<Uuid>,
    Json(body): Json<NewBounty>,
) -> Result<(StatusCode, Json<Bounty>), ApiError> {
    let core = state.core.clone();
    let bounty = blocking(move || core.bounties.create_bounty(&actor, workspace_id, body)).await?;
    Ok((StatusCode::CREATED, Json(bounty)))
}

async fn list_bounties_handler(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(workspace_id): Path<Uuid>,
    Query(query): Query<StatusQuery<BountyStatus>>,
) -> ApiResult<Vec<Bounty>> {
    let core = state.core.clone();
    Ok(Json(
        blocking(move || core.bounties.list_bounties(workspace_id, query.status)).await?,
    ))
}

async fn budget_handler(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(workspace_id): Path<Uuid>,
) -> ApiResult<WorkspaceBudget> {
    let core = state.core.clone();
    Ok(Json(blocking(move || core.payments.get_budget(workspace_id)).await?))
}

async fn deposit_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(workspace_id): Path<Uuid>,
    Json(body): Json<DepositBody>,
) -> Result<(StatusCode, Json<DepositReceipt>), ApiError> {
    let core = state.core.clone();
    let receipt =
        blocking(move || core.payments.deposit(&actor, workspace_id, body.amount, body.memo))
            .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn list_transactions_handler(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(workspace_id): Path<Uuid>,
) -> ApiResult<Vec<Transaction>> {
    let core = state.core.clone();
    Ok(Json(
        blocking(move || core.payments.list_transactions(workspace_id)).await?,
    ))
}

async fn verify_ledger_handler(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(workspace_id): Path<Uuid>,
) -> ApiResult<LedgerReport> {
    let core = state.core.clone();
    Ok(Json(blocking(move || core.payments.verify_ledger(workspace_id)).await?))
}

async fn workspace_activity_handler(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(workspace_id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<BountyActivity>> {
    let core = state.core.clone();
    let limit = query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT);
    Ok(Json(
        blocking(move || core.workspace_activity(workspace_id, limit)).await?,
    ))
}

// ============================================================================
// BOUNTY LIFECYCLE
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AssignBody {
    pub assignee: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonBody {
    #[serde(default)]
    pub reason: Option<String>,
}

async fn get_bounty_handler(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Bounty> {
    let core = state.core.clone();
    Ok(Json(blocking(move || core.bounties.get_bounty(id)).await?))
}

async fn update_bounty_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(patch): Json<BountyPatch>,
) -> ApiResult<Bounty> {
    let core = state.core.clone();
    Ok(Json(
        blocking(move || core.bounties.update_bounty(&actor, id, patch)).await?,
    ))
}

async fn delete_bounty_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let core = state.core.clone();
    blocking(move || core.bounties.delete_bounty(&actor, id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn publish_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Bounty> {
    let core = state.core.clone();
    Ok(Json(blocking(move || core.bounties.publish_bounty(&actor, id)).await?))
}

async fn assign_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(body): Json<AssignBody>,
) -> ApiResult<Bounty> {
    let core = state.core.clone();
    Ok(Json(
        blocking(move || core.bounties.assign(&actor, id, &body.assignee)).await?,
    ))
}

async fn unassign_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Bounty> {
    let core = state.core.clone();
    Ok(Json(blocking(move || core.bounties.unassign(&actor, id)).await?))
}

async fn claim_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Bounty> {
    let core = state.core.clone();
    Ok(Json(blocking(move || core.bounties.claim(&actor, id)).await?))
}

async fn unclaim_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    body: Option<Json<ReasonBody>>,
) -> ApiResult<Bounty> {
    let core = state.core.clone();
    let reason = body.and_then(|Json(b)| b.reason);
    Ok(Json(
        blocking(move || core.bounties.unclaim(&actor, id, reason)).await?,
    ))
}

async fn complete_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Bounty> {
    let core = state.core.clone();
    Ok(Json(
        blocking(move || core.bounties.complete_bounty(&actor, id)).await?,
    ))
}

async fn cancel_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    body: Option<Json<ReasonBody>>,
) -> ApiResult<Bounty> {
    let core = state.core.clone();
    let reason = body.and_then(|Json(b)| b.reason);
    Ok(Json(
        blocking(move || core.bounties.cancel_bounty(&actor, id, reason)).await?,
    ))
}

async fn bounty_activity_handler(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<BountyActivity>> {
    let core = state.core.clone();
    Ok(Json(blocking(move || core.bounties.activity(id)).await?))
}

// ============================================================================
// REQUESTS AND PROOFS
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProofBody {
    pub url: String,
    pub description: String,
}

async fn create_request_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    body: Option<Json<RequestBody>>,
) -> Result<(StatusCode, Json<BountyRequest>), ApiError> {
    let core = state.core.clone();
    let message = body.and_then(|Json(b)| b.message);
    let request = blocking(move || core.requests.create_request(&actor, id, message)).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn list_requests_handler(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(id): Path<Uuid>,
    Query(query): Query<StatusQuery<RequestStatus>>,
) -> ApiResult<Vec<BountyRequest>> {
    let core = state.core.clone();
    Ok(Json(
        blocking(move || core.requests.list_requests(id, query.status)).await?,
    ))
}

async fn review_request_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(body): Json<ReviewBody>,
) -> ApiResult<BountyRequest> {
    let core = state.core.clone();
    Ok(Json(
        blocking(move || core.requests.review_request(&actor, id, body.decision, body.note))
            .await?,
    ))
}

async fn cancel_request_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let core = state.core.clone();
    blocking(move || core.requests.cancel_request(&actor, id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn submit_proof_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(body): Json<ProofBody>,
) -> Result<(StatusCode, Json<BountyProof>), ApiError> {
    let core = state.core.clone();
    let proof =
        blocking(move || core.proofs.submit_proof(&actor, id, &body.url, &body.description))
            .await?;
    Ok((StatusCode::CREATED, Json(proof)))
}

async fn list_proofs_handler(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<BountyProof>> {
    let core = state.core.clone();
    Ok(Json(blocking(move || core.proofs.list_proofs(id)).await?))
}

async fn review_proof_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(body): Json<ReviewBody>,
) -> ApiResult<BountyProof> {
    let core = state.core.clone();
    Ok(Json(
        blocking(move || core.proofs.review_proof(&actor, id, body.decision, body.note)).await?,
    ))
}

async fn delete_proof_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let core = state.core.clone();
    blocking(move || core.proofs.delete_proof(&actor, id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// PAYMENTS
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct InitiatePaymentBody {
    #[serde(default)]
    pub memo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusBody {
    pub status: TransactionStatus,
    #[serde(flatten)]
    pub detail: PaymentDetail,
}

async fn initiate_payment_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    body: Option<Json<InitiatePaymentBody>>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let core = state.core.clone();
    let memo = body.and_then(|Json(b)| b.memo);
    let txn = blocking(move || core.payments.initiate_payment(&actor, id, memo)).await?;
    Ok((StatusCode::CREATED, Json(txn)))
}

async fn latest_payment_handler(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Transaction> {
    let core = state.core.clone();
    Ok(Json(blocking(move || core.payments.latest_payment(id)).await?))
}

async fn payment_status_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(body): Json<PaymentStatusBody>,
) -> ApiResult<Transaction> {
    let core = state.core.clone();
    Ok(Json(
        blocking(move || {
            core.payments
                .update_payment_status(&actor, id, body.status, body.detail)
        })
        .await?,
    ))
}

/// Run the server
pub async fn run_server(host: &str, port: u16, core: BountyCore) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(core));
    let app = create_router(state);
    let addr = format!("{}:{}", host, port);

    info!("Starting Bounty Ledger server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
