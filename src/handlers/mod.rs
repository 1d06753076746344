pub mod admin;
pub mod fields;
pub mod public;
pub mod webhooks;

use axum::Router;

use crate::db::AppState;

/// The full HTTP surface without transport layers (tracing, CORS, throttling).
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(public::router())
        .merge(webhooks::router())
        .merge(admin::router(state.clone()))
        .with_state(state)
}
