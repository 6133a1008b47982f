pub mod capture;
pub mod health;
pub mod metrics;
pub mod tasks;
pub mod telemetry;

use axum::extract::DefaultBodyLimit;
use axum::Router;

use crate::response::AppError;
use crate::state::AppState;

/// Control endpoints take no bodies; 64 KiB is plenty.
const MAX_BODY_SIZE: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .nest("/capture", capture::router())
        .nest("/tasks", tasks::router())
        .nest("/telemetry", telemetry::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

    Router::new()
        .nest("/api", api_routes)
        .nest("/metrics", metrics::router())
        .nest("/health", health::router())
        .fallback(fallback_404)
        .with_state(state)
}

async fn fallback_404() -> AppError {
    AppError::not_found("Not found")
}
