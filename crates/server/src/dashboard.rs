//! Read-only JSON API over the registry's dashboard reads.
//!
//! Endpoints:
//! - `GET  /api/activity?range=day|week|month` - merged activity feed
//! - `GET  /api/metrics?range=`                - summary metrics per module
//! - `GET  /api/alerts?range=`                 - alerts from every module
//! - `POST /api/summarize {"range": ...}`      - model-written overview
//!
//! When `dashboard.api_key` is set, every request must carry it as
//! `Authorization: Bearer <key>` or `?key=<key>`.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use mission_control_agent::llm::{CompletionRequest, Turn};
use mission_control_agent::{LlmClient, ToolRegistry};
use mission_control_core::{
    ActivityEvent, Alert, ApplicationError, InterfaceError, RangePreset, SummaryMetrics, TimeRange,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{error, info};

const SUMMARY_EVENT_LIMIT: usize = 50;
const SUMMARY_PROMPT: &str = "You are a project intelligence assistant. Summarize this team activity data into a concise, actionable overview. Highlight key trends, notable activity, and anything that might need attention. Keep it to 2-3 short paragraphs.";

#[derive(Clone)]
pub struct DashboardState {
    pub registry: Arc<ToolRegistry>,
    pub llm: Option<Arc<dyn LlmClient>>,
    pub api_key: Option<SecretString>,
}

pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/api/activity", get(activity))
        .route("/api/metrics", get(metrics))
        .route("/api/alerts", get(alerts))
        .route("/api/summarize", post(summarize))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub range: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummarizeRequest {
    pub range: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RangeInfo {
    pub preset: RangePreset,
    pub since: String,
    pub until: String,
}

impl RangeInfo {
    fn new(preset: RangePreset, range: &TimeRange) -> Self {
        Self { preset, since: range.since_str(), until: range.until_str() }
    }
}

#[derive(Debug, Serialize)]
pub struct ActivityResponse {
    pub range: RangeInfo,
    pub events: Vec<ActivityEvent>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub range: RangeInfo,
    pub metrics: BTreeMap<String, SummaryMetrics>,
}

#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub range: RangeInfo,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    correlation_id: &'a str,
}

/// Wire form of an [`InterfaceError`].
pub struct ApiError(pub InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody { error: self.0.user_message(), correlation_id: self.0.correlation_id() };
        (status, Json(body)).into_response()
    }
}

fn correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

fn key_matches(expected: &SecretString, provided: Option<&str>) -> bool {
    provided.is_some_and(|provided| expected.expose_secret().as_bytes().ct_eq(provided.as_bytes()).into())
}

async fn require_api_key(
    State(state): State<DashboardState>,
    Query(query): Query<RangeQuery>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = &state.api_key else {
        return next.run(request).await;
    };
    if key_matches(expected, bearer(request.headers())) || key_matches(expected, query.key.as_deref()) {
        return next.run(request).await;
    }
    ApiError(InterfaceError::Unauthorized {
        message: "missing or invalid dashboard key".to_string(),
        correlation_id: correlation_id(),
    })
    .into_response()
}

fn resolve_range(raw: Option<&str>) -> (RangePreset, TimeRange) {
    let preset = RangePreset::parse_or_default(raw);
    (preset, TimeRange::ending_today(preset))
}

async fn activity(State(state): State<DashboardState>, Query(query): Query<RangeQuery>) -> Json<ActivityResponse> {
    let (preset, range) = resolve_range(query.range.as_deref());
    let events = state.registry.activity_feed(&range).await;
    Json(ActivityResponse { range: RangeInfo::new(preset, &range), events })
}

async fn metrics(State(state): State<DashboardState>, Query(query): Query<RangeQuery>) -> Json<MetricsResponse> {
    let (preset, range) = resolve_range(query.range.as_deref());
    let metrics = state.registry.summary_metrics(&range).await;
    Json(MetricsResponse { range: RangeInfo::new(preset, &range), metrics })
}

async fn alerts(State(state): State<DashboardState>, Query(query): Query<RangeQuery>) -> Json<AlertsResponse> {
    let (preset, range) = resolve_range(query.range.as_deref());
    let alerts = state.registry.alerts(&range).await;
    Json(AlertsResponse { range: RangeInfo::new(preset, &range), alerts })
}

/// Metrics plus the newest events, as handed to the model.
fn summary_context(range: &TimeRange, metrics: &BTreeMap<String, SummaryMetrics>, events: &[ActivityEvent]) -> String {
    let metrics_json = serde_json::to_string_pretty(metrics).unwrap_or_else(|_| "{}".to_string());
    let lines: Vec<String> = events
        .iter()
        .take(SUMMARY_EVENT_LIMIT)
        .map(|event| {
            format!(
                "- [{}] {}: {} by {} ({})",
                event.source,
                event.kind,
                event.title,
                event.actor.as_deref().unwrap_or("unknown"),
                event.timestamp.to_rfc3339()
            )
        })
        .collect();
    format!(
        "Time range: {} to {}\n\nMetrics by integration:\n{metrics_json}\n\nRecent activity ({} events):\n{}",
        range.since_str(),
        range.until_str(),
        events.len(),
        lines.join("\n")
    )
}

async fn summarize(
    State(state): State<DashboardState>,
    body: Option<Json<SummarizeRequest>>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let correlation_id = correlation_id();
    let Some(llm) = &state.llm else {
        return Err(ApiError(
            ApplicationError::Model("no model API key configured".to_string()).into_interface(correlation_id),
        ));
    };

    let raw_range = body.and_then(|Json(request)| request.range);
    let preset = RangePreset::parse_or_default(Some(raw_range.as_deref().unwrap_or("week")));
    let range = TimeRange::ending_today(preset);

    let (events, metrics) =
        tokio::join!(state.registry.activity_feed(&range), state.registry.summary_metrics(&range));
    let turns = [Turn::user_text(summary_context(&range, &metrics, &events))];

    let completion = llm
        .complete(CompletionRequest { system: SUMMARY_PROMPT, tools: &[], turns: &turns })
        .await
        .map_err(|failure| {
            error!(
                event_name = "dashboard.summary.failed",
                correlation_id = %correlation_id,
                error = %failure,
                "summary completion failed"
            );
            ApiError(ApplicationError::Model(failure.to_string()).into_interface(correlation_id.clone()))
        })?;

    info!(
        event_name = "dashboard.summary.completed",
        correlation_id = %correlation_id,
        range = preset.as_str(),
        events = events.len(),
        "dashboard summary generated"
    );
    Ok(Json(SummaryResponse { summary: completion.text() }))
}
