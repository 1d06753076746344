mod checkout;
mod validate;

pub use checkout::*;
pub use validate::*;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::db::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/license/validate", post(validate_license))
        .route("/checkout", post(create_checkout))
        .route("/checkout/{order_id}", get(get_checkout_status))
        .route("/checkout/{order_id}/retry", post(retry_checkout))
}
