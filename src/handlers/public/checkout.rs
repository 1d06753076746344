use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::handlers::fields;
use crate::models::{CreateOrder, Order, OrderStatus, OrderStatusView};
use crate::payments::{GatewayTransaction, TransactionRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CheckoutRequest {
    pub product_id: String,
    #[serde(rename = "amountUSD")]
    pub amount_usd: serde_json::Number,
    pub buyer_email: String,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    pub order_id: String,
    pub checkout_url: String,
    pub txn_id: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutStatusResponse {
    pub success: bool,
    #[serde(flatten)]
    pub order: OrderStatusView,
}

/// POST /checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let input = CreateOrder {
        product_id: fields::product_id(&request.product_id)?.to_string(),
        amount_cents: fields::amount_cents(&request.amount_usd.to_string())?,
        currency: match request.currency.as_deref() {
            Some(code) => fields::currency(code)?,
            None => state.settlement_currency.clone(),
        },
        buyer_email: fields::email(&request.buyer_email)?.to_string(),
    };

    let order = {
        let conn = state.db.get()?;
        queries::create_order(&conn, &input)?
    };
    tracing::info!(
        order_id = %order.id,
        product_id = %order.product_id,
        amount_cents = order.amount_cents,
        "Order created"
    );

    let txn = start_gateway_transaction(&state, &order).await?;
    Ok(Json(CheckoutResponse {
        success: true,
        order_id: order.id,
        checkout_url: txn.checkout_url,
        txn_id: txn.txn_id,
    }))
}

/// GET /checkout/{order_id}
pub async fn get_checkout_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<CheckoutStatusResponse>> {
    let conn = state.db.get()?;
    let order = queries::get_order(&conn, &order_id)?
        .ok_or_else(|| AppError::NotFound("Order not found".into()))?;
    Ok(Json(CheckoutStatusResponse {
        success: true,
        order: OrderStatusView::from(&order),
    }))
}

/// POST /checkout/{order_id}/retry
///
/// Re-attempts the gateway call for an order whose first attempt failed.
pub async fn retry_checkout(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<CheckoutResponse>> {
    let order = {
        let conn = state.db.get()?;
        queries::get_order(&conn, &order_id)?
            .ok_or_else(|| AppError::NotFound("Order not found".into()))?
    };

    if order.status != OrderStatus::Created || order.gateway_txn_id.is_some() {
        return Err(AppError::Conflict(format!(
            "Order is {} and already has a gateway transaction",
            order.status
        )));
    }

    let txn = start_gateway_transaction(&state, &order).await?;
    Ok(Json(CheckoutResponse {
        success: true,
        order_id: order.id,
        checkout_url: txn.checkout_url,
        txn_id: txn.txn_id,
    }))
}

/// Create the hosted transaction and move the order to `pending`.
/// On gateway failure the order is left in `created`.
async fn start_gateway_transaction(state: &AppState, order: &Order) -> Result<GatewayTransaction> {
    let order_url = format!(
        "{}/checkout/{}",
        state.base_url,
        urlencoding::encode(&order.id)
    );
    let request = TransactionRequest {
        order_id: order.id.clone(),
        product_id: order.product_id.clone(),
        amount_usd: order.amount_usd(),
        currency: order.currency.clone(),
        buyer_email: order.buyer_email.clone(),
        ipn_url: format!("{}/payment/webhook", state.base_url),
        success_url: order_url.clone(),
        cancel_url: order_url,
    };

    let txn = state
        .gateway
        .create_transaction(&request)
        .await
        .inspect_err(|e| {
            tracing::warn!(order_id = %order.id, reason = e.reason(), "Gateway transaction failed");
        })?;

    let conn = state.db.get()?;
    if !queries::attach_gateway_transaction(&conn, &order.id, &txn.txn_id, &txn.checkout_url)? {
        return Err(AppError::Conflict(
            "Order already has a gateway transaction".into(),
        ));
    }

    Ok(txn)
}
