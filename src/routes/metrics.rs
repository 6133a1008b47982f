//! Read endpoint for persisted blink snapshots.
//!
//! Unlike the control API this returns the bare row array, not the
//! `{success, data}` envelope.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use crate::constants::RECENT_METRICS_LIMIT;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(recent_metrics))
}

pub async fn recent_metrics(State(state): State<AppState>) -> Response {
    match state.store().recent_blink_snapshots(RECENT_METRICS_LIMIT) {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to read blink snapshots");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
