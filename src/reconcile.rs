//! Order reconciliation: applies gateway status notifications to orders.
//!
//! Each delivery runs as one `BEGIN IMMEDIATE` transaction over the orders
//! table and the license store, so a repeated or concurrent delivery observes
//! the effect of the previous one. The first arrival at `complete` issues the
//! license and attaches it to the order in that same transaction; the buyer is
//! notified only after commit.

use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use serde_json::json;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::handlers::fields;
use crate::licensing::{IssueLicense, issue};
use crate::metrics::Counter;
use crate::models::{ActorType, AuditAction, Order, OrderStatus};
use crate::notify::license_delivery_message;
use crate::payments::IpnNotification;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No order matches the delivery. Acknowledged without side effects.
    UnknownOrder,
    /// The order is already in the reported state.
    Unchanged(OrderStatus),
    /// The reported state is not reachable from the current one.
    Ignored {
        current: OrderStatus,
        reported: Option<OrderStatus>,
    },
    Transitioned {
        from: OrderStatus,
        to: OrderStatus,
    },
    Completed {
        license_key: String,
        notified: bool,
    },
}

enum Applied {
    Done(ReconcileOutcome),
    Completed { order: Order, license_key: String },
}

/// Apply an authenticated IPN to its order.
pub async fn reconcile(state: &AppState, ipn: &IpnNotification) -> Result<ReconcileOutcome> {
    let applied = {
        let mut conn = state.db.get()?;
        apply(state, &mut conn, ipn).inspect_err(|e| state.note_store_error(e))?
    };

    match applied {
        Applied::Done(outcome) => Ok(outcome),
        Applied::Completed { order, license_key } => {
            let notified = match deliver_license(state, &order, &license_key).await {
                Ok(()) => true,
                Err(e) => {
                    state.metrics.incr(Counter::NotifyFailures);
                    tracing::warn!(
                        order_id = %order.id,
                        reason = e.reason(),
                        error = %e,
                        "License delivery failed, order left unnotified"
                    );
                    false
                }
            };
            Ok(ReconcileOutcome::Completed {
                license_key,
                notified,
            })
        }
    }
}

fn find_order(conn: &Connection, ipn: &IpnNotification) -> Result<Option<Order>> {
    if let Some(order_id) = ipn.order_id.as_deref() {
        return queries::get_order(conn, order_id);
    }
    queries::get_order_by_txn(conn, &ipn.txn_id)
}

fn apply(state: &AppState, conn: &mut Connection, ipn: &IpnNotification) -> Result<Applied> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let Some(order) = find_order(&tx, ipn)? else {
        state.metrics.incr(Counter::UnknownOrders);
        tracing::warn!(
            order_id = ?ipn.order_id,
            txn_id = %ipn.txn_id,
            status = ipn.status,
            "Webhook for unknown order acknowledged"
        );
        return Ok(Applied::Done(ReconcileOutcome::UnknownOrder));
    };

    let reported = OrderStatus::from_gateway_code(ipn.status);
    let ignored = ReconcileOutcome::Ignored {
        current: order.status,
        reported,
    };

    match order.gateway_txn_id.as_deref() {
        Some(attached) if attached != ipn.txn_id => {
            state.metrics.incr(Counter::IgnoredTransitions);
            tracing::warn!(
                order_id = %order.id,
                attached_txn = %attached,
                txn_id = %ipn.txn_id,
                "Webhook txn id does not match the order, ignored"
            );
            return Ok(Applied::Done(ignored));
        }
        Some(_) => {}
        None => {
            if queries::get_order_by_txn(&tx, &ipn.txn_id)?.is_some() {
                state.metrics.incr(Counter::IgnoredTransitions);
                tracing::warn!(
                    order_id = %order.id,
                    txn_id = %ipn.txn_id,
                    "Webhook txn id belongs to another order, ignored"
                );
                return Ok(Applied::Done(ignored));
            }
            queries::set_gateway_txn_if_missing(&tx, &order.id, &ipn.txn_id)?;
        }
    }

    let Some(target) = reported else {
        tracing::debug!(order_id = %order.id, status = ipn.status, "Unmapped gateway status code");
        tx.commit()?;
        return Ok(Applied::Done(ignored));
    };

    if target == order.status {
        state.metrics.incr(Counter::DuplicateDeliveries);
        tracing::debug!(order_id = %order.id, status = %target, "Duplicate webhook delivery");
        tx.commit()?;
        return Ok(Applied::Done(ReconcileOutcome::Unchanged(target)));
    }

    if !order.status.can_transition_to(target) {
        state.metrics.incr(Counter::IgnoredTransitions);
        tracing::info!(
            order_id = %order.id,
            from = %order.status,
            to = %target,
            "Order transition not allowed, ignored"
        );
        tx.commit()?;
        return Ok(Applied::Done(ignored));
    }

    if target == OrderStatus::Complete && !covers_order(&order, ipn) {
        state.metrics.incr(Counter::IgnoredTransitions);
        tracing::warn!(
            order_id = %order.id,
            amount = ?ipn.amount,
            price_currency = ?ipn.price_currency,
            expected_cents = order.amount_cents,
            "Completion does not cover the order price, ignored"
        );
        tx.commit()?;
        return Ok(Applied::Done(ignored));
    }

    if target != OrderStatus::Complete {
        if !queries::update_order_status(&tx, &order.id, order.status, target)? {
            return Err(AppError::Conflict("Order changed during reconciliation".into()));
        }
        tx.commit()?;
        tracing::info!(order_id = %order.id, from = %order.status, to = %target, "Order updated");
        return Ok(Applied::Done(ReconcileOutcome::Transitioned {
            from: order.status,
            to: target,
        }));
    }

    let license = state.license_store().update_in(&tx, |db| {
        issue(
            db,
            IssueLicense {
                email: &order.buyer_email,
                product_id: &order.product_id,
                duration_days: state.license_duration_days,
                order_id: Some(&order.id),
            },
            Utc::now(),
        )
    })?;

    if !queries::complete_order(&tx, &order.id, order.status, &license.key)? {
        // Dropping the transaction discards the issued license as well.
        return Err(AppError::Conflict("Order changed during reconciliation".into()));
    }

    queries::create_audit_log(
        &tx,
        ActorType::Gateway,
        AuditAction::IssueLicenseForOrder,
        "order",
        &order.id,
        Some(&json!({
            "txn_id": ipn.txn_id,
            "status_code": ipn.status,
            "product_id": order.product_id,
        })),
        None,
    )?;

    tx.commit()?;
    state.metrics.incr(Counter::LicensesIssued);
    tracing::info!(
        order_id = %order.id,
        product_id = %order.product_id,
        "Order complete, license issued"
    );

    Ok(Applied::Completed {
        order,
        license_key: license.key,
    })
}

/// Orders are priced in USD; the gateway echoes that price back in
/// `amount1`/`currency1`, and it must be at least what the order costs.
fn covers_order(order: &Order, ipn: &IpnNotification) -> bool {
    let in_usd = ipn
        .price_currency
        .as_deref()
        .is_none_or(|c| c.eq_ignore_ascii_case("USD"));
    let paid = ipn
        .amount
        .as_deref()
        .and_then(|a| fields::amount_cents(a).ok());
    in_usd && paid.is_some_and(|cents| cents >= order.amount_cents)
}

/// Send the license key to the buyer and record the delivery.
async fn deliver_license(state: &AppState, order: &Order, license_key: &str) -> Result<()> {
    let (subject, body) =
        license_delivery_message(&order.product_id, license_key, &state.download_url);
    state
        .notifier
        .send(&order.buyer_email, &subject, &body)
        .await?;

    let conn = state.db.get()?;
    queries::mark_order_notified(&conn, &order.id)?;
    Ok(())
}

/// Re-send the license of a completed order. Unlike the webhook path, a
/// notifier failure is returned to the caller.
pub async fn resend_notification(state: &AppState, order_id: &str) -> Result<Order> {
    let order = {
        let conn = state.db.get()?;
        queries::get_order(&conn, order_id)?
            .ok_or_else(|| AppError::NotFound("Order not found".into()))?
    };

    let Some(license_key) = order.license_key.clone() else {
        return Err(AppError::Conflict(format!(
            "Order is {} and has no license to send",
            order.status
        )));
    };

    if let Err(e) = deliver_license(state, &order, &license_key).await {
        state.metrics.incr(Counter::NotifyFailures);
        return Err(e);
    }

    tracing::info!(order_id = %order.id, "License notification re-sent");
    Ok(Order {
        notified: true,
        ..order
    })
}
