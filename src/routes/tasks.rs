use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::response::ok;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(active_tasks))
}

pub async fn active_tasks(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.capture().tasks().listing())
}
