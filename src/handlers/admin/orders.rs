use axum::{
    extract::{Extension, State},
    http::HeaderMap,
};
use rusqlite::TransactionBehavior;
use serde::Serialize;
use serde_json::json;

use super::audit;
use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::middleware::AdminContext;
use crate::models::{AuditAction, Order, OrderStatus};
use crate::reconcile::resend_notification;

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub success: bool,
    pub order: Order,
}

/// GET /orders/admin/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>> {
    let conn = state.db.get()?;
    let order = queries::get_order(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Order not found".into()))?;
    Ok(Json(OrderResponse {
        success: true,
        order,
    }))
}

/// POST /orders/admin/{id}/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let order = queries::get_order(&tx, &id)?
        .ok_or_else(|| AppError::NotFound("Order not found".into()))?;
    if !order.status.can_transition_to(OrderStatus::Cancelled) {
        return Err(AppError::Conflict(format!(
            "Order is {} and can no longer be cancelled",
            order.status
        )));
    }
    if !queries::update_order_status(&tx, &id, order.status, OrderStatus::Cancelled)? {
        return Err(AppError::Conflict("Order changed concurrently".into()));
    }

    audit(
        &tx,
        &admin,
        &headers,
        AuditAction::CancelOrder,
        "order",
        &id,
        json!({ "from": order.status }),
    )?;
    let order = queries::get_order(&tx, &id)?
        .ok_or_else(|| AppError::Internal("Order vanished after cancel".into()))?;
    tx.commit()?;

    tracing::info!(order_id = %id, "Order cancelled by admin");
    Ok(Json(OrderResponse {
        success: true,
        order,
    }))
}

/// POST /orders/admin/{id}/resend
pub async fn resend_order_notification(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>> {
    let order = resend_notification(&state, &id).await?;

    let conn = state.db.get()?;
    audit(
        &conn,
        &admin,
        &headers,
        AuditAction::ResendNotification,
        "order",
        &id,
        json!({ "recipient": order.buyer_email }),
    )?;

    Ok(Json(OrderResponse {
        success: true,
        order,
    }))
}
