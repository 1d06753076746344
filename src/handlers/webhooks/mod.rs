mod coinpayments;

pub use coinpayments::*;

use axum::{Router, routing::post};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/payment/webhook", post(handle_coinpayments_webhook))
}
