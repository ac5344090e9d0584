//! HTTP API for the strike engine.

use crate::gossip;
use crate::node::NodeState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mycelial_strike::{
    AbuseType, ActivityDelta, BehaviorTracking, BehaviorUpdate, CancelOutcome, Error, Evidence,
    GateOutcome, LocalStrike, NewAlert, NewWhitelist, OverrideAction, OverrideResult,
    StrikeDeescalationLog, StrikeOverrideLog, StrikeStatusView, UserStrikeWhitelist, WarlordAlert,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

type AppState = Arc<NodeState>;

/// Engine error carried to the client as a status code and message.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

/// Status code an engine error is reported with.
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        // Alerts
        .route("/api/v1/alerts", post(create_alert))
        .route("/api/v1/alerts/:id", get(get_alert))
        .route("/api/v1/alerts/:id/cancel", post(cancel_alert))
        .route("/api/v1/alerts/:id/enforce", post(enforce_alert))
        .route("/api/v1/ingest", post(ingest_alert))
        .route("/api/v1/review-queue", get(review_queue))
        // Users
        .route("/api/v1/users/:user_id/strikes", get(active_strikes))
        .route("/api/v1/users/:user_id/strike-status", get(strike_status))
        .route("/api/v1/users/:user_id/strike-history", get(strike_history))
        .route("/api/v1/users/:user_id/behavior", get(get_behavior).post(update_behavior))
        .route("/api/v1/users/:user_id/whitelist", get(whitelist_entries))
        // Oversight
        .route("/api/v1/whitelist", post(whitelist_user))
        .route("/api/v1/strikes/:id", get(get_strike))
        .route("/api/v1/strikes/:id/override", post(override_strike))
        .route("/api/v1/strikes/:id/overrides", get(override_history))
        .route("/api/v1/strikes/:id/deescalations", get(deescalation_history))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

// --- Alert endpoints ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAlertRequest {
    target_user_id: String,
    severity: i64,
    abuse_type: AbuseType,
    evidence: Vec<Evidence>,
    #[serde(default)]
    reporting_user_id: Option<String>,
    #[serde(default)]
    trusted_source: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateAlertResponse {
    alert: WarlordAlert,
    /// What this node did with its own alert
    local_outcome: GateOutcome,
}

/// Create an alert stamped with this node's fingerprint, apply it locally and flood it.
async fn create_alert(
    State(state): State<AppState>,
    Json(req): Json<CreateAlertRequest>,
) -> Result<(StatusCode, Json<CreateAlertResponse>), ApiError> {
    let alert = state.engine.create_warlord_alert(NewAlert {
        target_user_id: req.target_user_id,
        severity: req.severity,
        abuse_type: req.abuse_type,
        evidence: req.evidence,
        reporting_node_fingerprint: state.fingerprint.clone(),
        reporting_user_id: req.reporting_user_id,
        trusted_source: req.trusted_source,
    })?;
    let local_outcome = state.engine.ingest_alert(alert.clone())?;
    state.flood.publish(alert.clone());

    Ok((
        StatusCode::CREATED,
        Json(CreateAlertResponse { alert, local_outcome }),
    ))
}

async fn get_alert(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<WarlordAlert> {
    state
        .engine
        .get_alert(&id)?
        .map(Json)
        .ok_or_else(|| ApiError(Error::NotFound(format!("alert {}", id))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelAlertRequest {
    cancelled_by: String,
    reason: String,
}

async fn cancel_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CancelAlertRequest>,
) -> ApiResult<CancelOutcome> {
    let outcome = state.engine.cancel_alert(&id, &req.cancelled_by, &req.reason)?;
    if !outcome.already_cancelled {
        state.flood.publish(outcome.alert.clone());
    }
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StewardRequest {
    steward_user_id: String,
    reason: String,
}

async fn enforce_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<StewardRequest>,
) -> ApiResult<LocalStrike> {
    Ok(Json(state.engine.enforce_alert(&id, &req.steward_user_id, &req.reason)?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestResponse {
    /// False when this version of the alert was already seen
    accepted: bool,
    outcome: Option<GateOutcome>,
}

/// Accept an alert from a transport that does not speak the TCP flood protocol.
async fn ingest_alert(State(state): State<AppState>, Json(alert): Json<WarlordAlert>) -> ApiResult<IngestResponse> {
    let outcome = gossip::deliver(&state.engine, &state.flood, alert)?;
    Ok(Json(IngestResponse {
        accepted: outcome.is_some(),
        outcome,
    }))
}

async fn review_queue(State(state): State<AppState>) -> ApiResult<Vec<WarlordAlert>> {
    Ok(Json(state.engine.review_queue()?))
}

// --- User endpoints ---

async fn active_strikes(State(state): State<AppState>, Path(user_id): Path<String>) -> ApiResult<Vec<LocalStrike>> {
    Ok(Json(state.engine.get_active_strikes(&user_id)?))
}

async fn strike_status(State(state): State<AppState>, Path(user_id): Path<String>) -> ApiResult<StrikeStatusView> {
    Ok(Json(state.engine.get_strike_status(&user_id)?))
}

async fn strike_history(State(state): State<AppState>, Path(user_id): Path<String>) -> ApiResult<Vec<LocalStrike>> {
    Ok(Json(state.engine.strike_history(&user_id)?))
}

async fn get_behavior(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Option<BehaviorTracking>> {
    Ok(Json(state.engine.get_behavior(&user_id)?))
}

async fn update_behavior(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(delta): Json<ActivityDelta>,
) -> ApiResult<BehaviorUpdate> {
    Ok(Json(state.engine.update_user_behavior(&user_id, delta)?))
}

async fn whitelist_entries(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<UserStrikeWhitelist>> {
    Ok(Json(state.engine.whitelist_entries(&user_id)?))
}

// --- Oversight endpoints ---

async fn whitelist_user(
    State(state): State<AppState>,
    Json(req): Json<NewWhitelist>,
) -> Result<(StatusCode, Json<UserStrikeWhitelist>), ApiError> {
    Ok((StatusCode::CREATED, Json(state.engine.whitelist_user(req)?)))
}

async fn get_strike(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<LocalStrike> {
    state
        .engine
        .get_strike(&id)?
        .map(Json)
        .ok_or_else(|| ApiError(Error::NotFound(format!("strike {}", id))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverrideRequest {
    steward_user_id: String,
    action: OverrideAction,
    reason: String,
}

async fn override_strike(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<OverrideRequest>,
) -> ApiResult<OverrideResult> {
    let result = state
        .engine
        .override_strike(&id, &req.steward_user_id, req.action, &req.reason)?;
    if matches!(req.action, OverrideAction::CancelAlert) {
        if let Some(alert) = state.engine.get_alert(&result.strike.alert_id)? {
            state.flood.publish(alert);
        }
    }
    Ok(Json(result))
}

async fn override_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<StrikeOverrideLog>> {
    Ok(Json(state.engine.override_history(&id)?))
}

async fn deescalation_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<StrikeDeescalationLog>> {
    Ok(Json(state.engine.deescalation_history(&id)?))
}
