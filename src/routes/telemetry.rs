use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::response::ok;
use crate::state::AppState;

const DEFAULT_SAMPLE_LIMIT: usize = 60;
const MAX_SAMPLE_LIMIT: usize = 3_600;

#[derive(Debug, Deserialize)]
pub struct TelemetryQuery {
    pub limit: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(recent_telemetry))
}

pub async fn recent_telemetry(
    State(state): State<AppState>,
    Query(query): Query<TelemetryQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_SAMPLE_LIMIT)
        .clamp(1, MAX_SAMPLE_LIMIT);
    let telemetry = state.capture().telemetry();
    let samples = telemetry.recent(limit).await;
    let summary = telemetry.summary().await;

    ok(serde_json::json!({
        "samples": samples,
        "summary": summary,
    }))
}
