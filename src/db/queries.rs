use chrono::Utc;
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

use super::from_row::{AUDIT_LOG_COLS, ORDER_COLS, query_all, query_one};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

// ============ Orders ============

pub fn create_order(conn: &Connection, input: &CreateOrder) -> Result<Order> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO orders (id, product_id, amount_cents, currency, buyer_email, status, notified, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8)",
        params![
            &id,
            &input.product_id,
            input.amount_cents,
            &input.currency,
            &input.buyer_email,
            OrderStatus::Created.as_ref(),
            now,
            now
        ],
    )?;

    Ok(Order {
        id,
        product_id: input.product_id.clone(),
        amount_cents: input.amount_cents,
        currency: input.currency.clone(),
        buyer_email: input.buyer_email.clone(),
        gateway_txn_id: None,
        checkout_url: None,
        status: OrderStatus::Created,
        license_key: None,
        notified: false,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_order(conn: &Connection, id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLS),
        params![id],
    )
}

pub fn get_order_by_txn(conn: &Connection, txn_id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE gateway_txn_id = ?1", ORDER_COLS),
        params![txn_id],
    )
}

/// Record the gateway transaction and move the order from `created` to `pending`.
///
/// Only succeeds once: the txn id is immutable after it has been attached.
pub fn attach_gateway_transaction(
    conn: &Connection,
    id: &str,
    txn_id: &str,
    checkout_url: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET gateway_txn_id = ?1, checkout_url = ?2, status = ?3, updated_at = ?4
         WHERE id = ?5 AND gateway_txn_id IS NULL AND status = ?6",
        params![
            txn_id,
            checkout_url,
            OrderStatus::Pending.as_ref(),
            now(),
            id,
            OrderStatus::Created.as_ref()
        ],
    )?;
    Ok(affected > 0)
}

/// Attach a txn id learned from a webhook when the checkout response never got recorded.
pub fn set_gateway_txn_if_missing(conn: &Connection, id: &str, txn_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET gateway_txn_id = ?1, updated_at = ?2 WHERE id = ?3 AND gateway_txn_id IS NULL",
        params![txn_id, now(), id],
    )?;
    Ok(affected > 0)
}

/// Compare-and-swap the order status. Returns false if the order was not in `from`.
pub fn update_order_status(
    conn: &Connection,
    id: &str,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        params![to.as_ref(), now(), id, from.as_ref()],
    )?;
    Ok(affected > 0)
}

/// Atomically claim the completion of an order and attach its license key.
///
/// Returns false if another delivery already completed the order.
pub fn complete_order(
    conn: &Connection,
    id: &str,
    from: OrderStatus,
    license_key: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET status = ?1, license_key = ?2, updated_at = ?3
         WHERE id = ?4 AND status = ?5 AND license_key IS NULL",
        params![
            OrderStatus::Complete.as_ref(),
            license_key,
            now(),
            id,
            from.as_ref()
        ],
    )?;
    Ok(affected > 0)
}

pub fn mark_order_notified(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE orders SET notified = 1, updated_at = ?1 WHERE id = ?2",
        params![now(), id],
    )?;
    Ok(())
}

// ============ Audit Logs ============

pub fn create_audit_log(
    conn: &Connection,
    actor_type: ActorType,
    action: AuditAction,
    resource_type: &str,
    resource_id: &str,
    details: Option<&serde_json::Value>,
    ip_address: Option<&str>,
) -> Result<AuditLog> {
    let id = gen_id();
    let timestamp = now();
    let details_str = details.map(|d| d.to_string());

    conn.execute(
        "INSERT INTO audit_logs (id, timestamp, actor_type, action, resource_type, resource_id, details, ip_address)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &id,
            timestamp,
            actor_type.as_ref(),
            action.as_ref(),
            resource_type,
            resource_id,
            &details_str,
            ip_address
        ],
    )?;

    Ok(AuditLog {
        id,
        timestamp,
        actor_type,
        action: action.as_ref().to_string(),
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        details: details.cloned(),
        ip_address: ip_address.map(String::from),
    })
}

pub fn query_audit_logs(conn: &Connection, query: &AuditLogQuery) -> Result<Vec<AuditLog>> {
    let limit = query.limit.clamp(1, 1000);
    query_all(
        conn,
        &format!(
            "SELECT {} FROM audit_logs
             WHERE (?1 IS NULL OR action = ?1) AND (?2 IS NULL OR resource_id = ?2)
             ORDER BY timestamp DESC, rowid DESC LIMIT ?3",
            AUDIT_LOG_COLS
        ),
        params![&query.action, &query.resource_id, limit],
    )
}
