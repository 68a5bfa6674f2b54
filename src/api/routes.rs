use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::markets::{generate_candidates, markets_for, MarketProbabilityTable, ParlayCandidate};
use crate::state::MatchStore;
use crate::sync::SyncEngine;
use crate::types::{CanonicalMatch, MatchStatus, StatusCounts, SyncReport, SyncTarget};

/// Error messages surfaced to the manual trigger caller before truncation.
const ERROR_SAMPLE_LIMIT: usize = 5;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<MatchStore>,
    pub engine: Arc<SyncEngine>,
    pub cron_secret: String,
    pub operator_tokens: Vec<String>,
    pub admin_tokens: Vec<String>,
    pub started_at: DateTime<Utc>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sync", get(sync_scheduled))
        .route("/sync-manual", post(sync_manual))
        .route("/matches", get(list_matches))
        .route("/matches/:id", get(get_match))
        .route("/matches/:id/markets", get(get_match_markets))
        .route("/parlays", get(list_parlays))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query / body / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct SyncQuery {
    #[serde(rename = "type")]
    pub sync_type: Option<String>,
}

#[derive(Deserialize)]
pub struct ManualSyncRequest {
    #[serde(rename = "type")]
    pub sync_type: Option<String>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Deserialize)]
pub struct MatchesQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct ParlaysQuery {
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct SyncTriggerResponse {
    pub success: bool,
    pub results: BTreeMap<String, StatusCounts>,
    pub summary: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "u32_is_zero")]
    pub errors_truncated: u32,
}

fn u32_is_zero(n: &u32) -> bool {
    *n == 0
}

#[derive(Serialize)]
pub struct MatchMarketsResponse {
    pub match_id: String,
    /// Null when the match has no usable three-way odds.
    pub markets: Option<MarketProbabilityTable>,
}

#[derive(Serialize)]
pub struct ParlaysResponse {
    pub candidates: Vec<ParlayCandidate>,
}

// ---------------------------------------------------------------------------
// Trigger handlers
// ---------------------------------------------------------------------------

async fn sync_scheduled(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(params): Query<SyncQuery>,
) -> Response {
    if bearer_token(&headers) != Some(state.cron_secret.as_str()) {
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized");
    }
    let Some(targets) = SyncTarget::parse(params.sync_type.as_deref().unwrap_or("all")) else {
        return error_response(StatusCode::BAD_REQUEST, "unknown sync type");
    };

    let report = state.engine.run(&targets, false).await;
    Json(trigger_response(report, false)).into_response()
}

async fn sync_manual(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<ManualSyncRequest>,
) -> Response {
    if let Err(status) = authorize_manual(
        bearer_token(&headers),
        &state.operator_tokens,
        &state.admin_tokens,
    ) {
        let msg = match status {
            StatusCode::FORBIDDEN => "admin role required",
            _ => "unauthorized",
        };
        return error_response(status, msg);
    }
    let Some(targets) = SyncTarget::parse(req.sync_type.as_deref().unwrap_or("all")) else {
        return error_response(StatusCode::BAD_REQUEST, "unknown sync type");
    };

    // Run on a separate task so a panic surfaces as a 500 payload instead of
    // tearing down the connection.
    let engine = Arc::clone(&state.engine);
    let force = req.force;
    let run = tokio::spawn(async move { engine.run(&targets, force).await });
    match run.await {
        Ok(report) => Json(trigger_response(report, true)).into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("sync task failed: {e}"),
        ),
    }
}

/// Bearer secret comparison for the cron trigger; operator/admin roles for
/// the manual one. Authorization is decided before any sync work starts.
fn authorize_manual(
    token: Option<&str>,
    operator_tokens: &[String],
    admin_tokens: &[String],
) -> std::result::Result<(), StatusCode> {
    let Some(token) = token else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    let is_admin = admin_tokens.iter().any(|t| t == token);
    let is_operator = is_admin || operator_tokens.iter().any(|t| t == token);
    if !is_operator {
        return Err(StatusCode::UNAUTHORIZED);
    }
    if !is_admin {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn trigger_response(report: SyncReport, include_errors: bool) -> SyncTriggerResponse {
    let success = report.totals().errors == 0 && report.errors.is_empty();
    let summary = report.summary();
    let (errors, errors_truncated) = if include_errors {
        let total = report.errors.len();
        let sample: Vec<String> = report.errors.into_iter().take(ERROR_SAMPLE_LIMIT).collect();
        let truncated = total.saturating_sub(sample.len()) as u32;
        (sample, truncated)
    } else {
        (Vec::new(), 0)
    };

    SyncTriggerResponse {
        success,
        results: report.results,
        summary,
        errors,
        errors_truncated,
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "error": message }))).into_response()
}

// ---------------------------------------------------------------------------
// Read handlers
// ---------------------------------------------------------------------------

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "matches": state.store.match_count(),
        "by_status": state.store.status_counts(),
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
    }))
}

async fn list_matches(
    State(state): State<ApiState>,
    Query(params): Query<MatchesQuery>,
) -> Response {
    let mut matches = match params.status.as_deref() {
        Some(raw) => match parse_status(raw) {
            Some(status) => state.store.by_status(status),
            None => return error_response(StatusCode::BAD_REQUEST, "unknown status"),
        },
        None => state.store.all(),
    };
    matches.sort_by(|a, b| {
        a.kickoff_at
            .cmp(&b.kickoff_at)
            .then_with(|| a.match_id.cmp(&b.match_id))
    });
    Json(matches).into_response()
}

async fn get_match(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.store.get(&id) {
        Some(m) => Json(m).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "match not found"),
    }
}

/// Derived markets are recomputed from the canonical record on every call;
/// nothing here is read from or written to storage.
async fn get_match_markets(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let Some(record) = state.store.get(&id) else {
        return error_response(StatusCode::NOT_FOUND, "match not found");
    };
    Json(MatchMarketsResponse {
        match_id: record.match_id.clone(),
        markets: markets_for(&record),
    })
    .into_response()
}

async fn list_parlays(
    State(state): State<ApiState>,
    Query(params): Query<ParlaysQuery>,
) -> Response {
    let matches: Vec<CanonicalMatch> = match params.status.as_deref() {
        Some(raw) => match parse_status(raw) {
            Some(status) => state.store.by_status(status),
            None => return error_response(StatusCode::BAD_REQUEST, "unknown status"),
        },
        // Default to the matches still worth betting on.
        None => {
            let mut live = state.store.by_status(MatchStatus::Live);
            live.extend(state.store.by_status(MatchStatus::Upcoming));
            live
        }
    };

    let tables: Vec<(String, MarketProbabilityTable)> = matches
        .iter()
        .filter_map(|m| markets_for(m).map(|t| (m.match_id.clone(), t)))
        .collect();
    Json(ParlaysResponse {
        candidates: generate_candidates(&tables),
    })
    .into_response()
}

fn parse_status(raw: &str) -> Option<MatchStatus> {
    match raw.trim().to_lowercase().as_str() {
        "upcoming" => Some(MatchStatus::Upcoming),
        "live" => Some(MatchStatus::Live),
        "finished" => Some(MatchStatus::Finished),
        "cancelled" => Some(MatchStatus::Cancelled),
        "postponed" => Some(MatchStatus::Postponed),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
