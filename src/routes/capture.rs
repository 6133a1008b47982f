use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;

use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/reset", post(reset))
        .route("/status", get(status))
        .route("/events", get(events))
}

pub async fn start(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let status = state.capture().start().await?;
    Ok(ok(status))
}

pub async fn stop(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let report = state.capture().stop().await?;
    Ok(ok(report))
}

pub async fn reset(State(state): State<AppState>) -> impl IntoResponse {
    let blink_count = state.capture().reset();
    ok(serde_json::json!({ "blinkCount": blink_count }))
}

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.capture().status().await)
}

/// Annotated frame reports as `frame` events. Slow clients skip frames
/// instead of stalling the capture loop.
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut frames = state.capture().subscribe();
    let mut shutdown_rx = state.shutdown_rx();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                received = frames.recv() => {
                    match received {
                        Ok(report) => {
                            if let Ok(json) = serde_json::to_string(&report) {
                                yield Ok(Event::default().event("frame").data(json));
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "SSE subscriber lagging, frames dropped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}
