//! HTTP surface: health, live summaries, tick history, account snapshots,
//! budget plans, admin overrides, and handle verification.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::aggregator::TickBuilder;
use crate::budget::{plan_for_platform, BudgetParams};
use crate::clock::now_ms;
use crate::config::Config;
use crate::db::models::TickSummaryRow;
use crate::db::overrides::OverridePayload;
use crate::db::OverrideStore;
use crate::error::{AppError, Result};
use crate::fetcher::BskyClient;
use crate::registry::{fetch_registry, registry_entry};
use crate::summarizer::Summarizer;
use crate::types::{MatchPhase, Platform, TickSummary};
use crate::verify::{verify_post_contains_code, ChallengeStore};

#[derive(Clone)]
pub struct ApiState {
    pub cfg: Arc<Config>,
    pub pool: Option<sqlx::SqlitePool>,
    pub store: OverrideStore,
    pub client: Arc<BskyClient>,
    pub builder: Arc<TickBuilder>,
    pub summarizer: Arc<Summarizer>,
    pub challenges: Arc<ChallengeStore>,
    /// Ticks produced by the stream are forwarded here for persistence.
    pub tick_tx: mpsc::Sender<TickSummary>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/live/stream", get(super::stream::live_stream))
        .route("/summaries/latest", get(latest_summary))
        .route("/summaries/history", get(summary_history))
        .route("/accounts", get(accounts_snapshot))
        .route("/accounts/plan", get(accounts_plan))
        .route("/admin/overrides", get(list_overrides).post(upsert_override))
        .route("/admin/overrides/:id", axum::routing::delete(delete_override))
        .route("/admin/registry", get(list_registry))
        .route("/auth/challenge", post(create_challenge))
        .route("/auth/verify", post(verify_challenge))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "dbConfigured": state.pool.is_some(),
        "summarizerConfigured": state.summarizer.is_configured(),
    }))
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestQuery {
    match_id: Option<String>,
    window: Option<String>,
    minutes: Option<i64>,
}

/// On-demand narrative summary of the current window's posts.
async fn latest_summary(
    State(state): State<ApiState>,
    Query(q): Query<LatestQuery>,
) -> Result<Json<Value>> {
    let phase = q.window.as_deref().and_then(parse_phase).unwrap_or(MatchPhase::Live);
    let minutes = q.minutes.filter(|m| *m > 0).unwrap_or(state.cfg.recency_minutes);
    let match_id = q.match_id.as_deref();

    let accounts = state.builder.selected_accounts(match_id).await;
    let posts = state.client.fetch_recent_posts(&accounts, minutes).await;
    let summary = state.summarizer.summarize(&posts, phase, minutes, now_ms()).await?;

    Ok(Json(json!({
        "summary": summary,
        "window": phase,
        "minutes": minutes,
        "volume": posts.len(),
        "accountsUsed": accounts.len(),
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    match_id: String,
    limit: Option<i64>,
}

/// Persisted tick summaries for a match, newest first.
async fn summary_history(
    State(state): State<ApiState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Value>> {
    let pool = state
        .pool
        .as_ref()
        .ok_or_else(|| AppError::Config("history storage not configured".to_string()))?;
    let limit = q.limit.filter(|l| *l > 0).unwrap_or(50).min(500);

    let rows: Vec<TickSummaryRow> = sqlx::query_as(
        r#"
        SELECT id, match_id, platform, window, tick, generated_at, volume, payload, created_at
        FROM tick_summaries
        WHERE match_id = ?
        ORDER BY created_at DESC
        LIMIT ?
        "#,
    )
    .bind(&q.match_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let ticks: Vec<Value> = rows
        .iter()
        .filter_map(|r| serde_json::from_str(&r.payload).ok())
        .collect();
    Ok(Json(json!({ "matchId": q.match_id, "ticks": ticks })))
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountsQuery {
    match_id: Option<String>,
}

/// Current slate with per-account eligibility verdicts.
async fn accounts_snapshot(
    State(state): State<ApiState>,
    Query(q): Query<AccountsQuery>,
) -> Json<Value> {
    let accounts = state.builder.selected_accounts(q.match_id.as_deref()).await;
    Json(json!({ "accounts": accounts, "count": accounts.len() }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanQuery {
    monthly_budget_usd: Option<f64>,
    cost_per_1k_requests_usd: Option<f64>,
}

/// Budget-derived account caps per platform. Bluesky is unmetered; the
/// metered numbers apply the supplied pricing.
async fn accounts_plan(
    State(state): State<ApiState>,
    Query(q): Query<PlanQuery>,
) -> Json<Value> {
    let params = BudgetParams::from_env(state.cfg.tick_interval_sec);
    let budget = q.monthly_budget_usd.unwrap_or(0.0);
    let max = state.cfg.max_accounts;

    let plans = vec![
        plan_for_platform(Platform::Bsky, max, budget, None, &params),
        plan_for_platform(Platform::Twitter, max, budget, q.cost_per_1k_requests_usd, &params),
        plan_for_platform(Platform::Threads, max, budget, q.cost_per_1k_requests_usd, &params),
    ];
    Json(json!({ "plans": plans }))
}

// ---------------------------------------------------------------------------
// Admin overrides
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct OverridesQuery {
    platform: Option<String>,
}

async fn list_overrides(
    State(state): State<ApiState>,
    Query(q): Query<OverridesQuery>,
) -> Json<Value> {
    let platform = q
        .platform
        .as_deref()
        .and_then(Platform::parse)
        .unwrap_or(Platform::Bsky);
    let rows = state.store.fetch_for_platform(platform).await;
    Json(json!({ "overrides": rows }))
}

async fn upsert_override(
    State(state): State<ApiState>,
    Json(payload): Json<OverridePayload>,
) -> Result<Json<Value>> {
    if payload.scope == crate::types::OverrideScope::Match && payload.match_id.is_none() {
        return Err(AppError::Config("match-scoped override requires match_id".to_string()));
    }
    let stored = state.store.upsert(payload).await?;
    Ok(Json(json!({ "override": stored })))
}

async fn delete_override(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    state.store.delete(&id).await?;
    Ok(Json(json!({ "deleted": id })))
}

/// Registry snapshots: follower drift and stale flags for the allowlist.
async fn list_registry(
    State(state): State<ApiState>,
    Query(q): Query<OverridesQuery>,
) -> Result<Json<Value>> {
    let pool = state
        .pool
        .as_ref()
        .ok_or_else(|| AppError::Config("registry storage not configured".to_string()))?;
    let platform = q
        .platform
        .as_deref()
        .and_then(Platform::parse)
        .unwrap_or(Platform::Bsky);
    let rows = fetch_registry(pool, platform).await?;
    let entries: Vec<Value> = rows.iter().map(registry_entry).collect();
    Ok(Json(json!({ "registry": entries, "count": entries.len() })))
}

// ---------------------------------------------------------------------------
// Handle verification
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ChallengeRequest {
    handle: String,
}

/// Issue a challenge code for the handle to post publicly.
async fn create_challenge(
    State(state): State<ApiState>,
    Json(req): Json<ChallengeRequest>,
) -> Result<Json<Value>> {
    let handle = req.handle.trim();
    if handle.is_empty() {
        return Err(AppError::Config("handle is required".to_string()));
    }
    let challenge = state.challenges.create_challenge(handle, now_ms());
    Ok(Json(json!({
        "handle": challenge.handle,
        "code": challenge.code,
        "expiresAtMs": challenge.expires_at_ms,
    })))
}

/// Confirm the challenge code appears in the handle's recent public posts.
async fn verify_challenge(
    State(state): State<ApiState>,
    Json(req): Json<ChallengeRequest>,
) -> Result<Json<Value>> {
    let challenge = state
        .challenges
        .get_challenge(&req.handle, now_ms())
        .ok_or_else(|| AppError::NotFound(format!("no live challenge for {}", req.handle)))?;

    let window_minutes = state.cfg.challenge_ttl_ms / 60_000;
    let verified =
        verify_post_contains_code(&state.client, &req.handle, &challenge.code, window_minutes)
            .await;
    if verified {
        state.challenges.clear_challenge(&req.handle);
    }
    Ok(Json(json!({ "handle": challenge.handle, "verified": verified })))
}

pub(super) fn parse_phase(s: &str) -> Option<MatchPhase> {
    match s.to_lowercase().as_str() {
        "pre" => Some(MatchPhase::Pre),
        "live" => Some(MatchPhase::Live),
        "post" => Some(MatchPhase::Post),
        "ended" => Some(MatchPhase::Ended),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_strings_round_trip() {
        assert_eq!(parse_phase("live"), Some(MatchPhase::Live));
        assert_eq!(parse_phase("PRE"), Some(MatchPhase::Pre));
        assert_eq!(parse_phase("post"), Some(MatchPhase::Post));
        assert_eq!(parse_phase("ended"), Some(MatchPhase::Ended));
        assert_eq!(parse_phase("halftime"), None);
    }
}
