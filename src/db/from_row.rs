//! Row mapping helpers shared by the query functions.

use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension, Params, Row, types::Type};

use crate::error::Result;
use crate::models::{ActorType, AuditLog, Order, OrderStatus};

pub const ORDER_COLS: &str = "id, product_id, amount_cents, currency, buyer_email, gateway_txn_id, checkout_url, status, license_key, notified, created_at, updated_at";

pub const AUDIT_LOG_COLS: &str =
    "id, timestamp, actor_type, action, resource_type, resource_id, details, ip_address";

pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Parse a strum-backed enum column.
fn parse_enum<T: FromStr>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown enum value '{}'", raw).into(),
        )
    })
}

impl FromRow for Order {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Order {
            id: row.get(0)?,
            product_id: row.get(1)?,
            amount_cents: row.get(2)?,
            currency: row.get(3)?,
            buyer_email: row.get(4)?,
            gateway_txn_id: row.get(5)?,
            checkout_url: row.get(6)?,
            status: parse_enum::<OrderStatus>(row, 7)?,
            license_key: row.get(8)?,
            notified: row.get::<_, i64>(9)? != 0,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

impl FromRow for AuditLog {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let details: Option<String> = row.get(6)?;
        Ok(AuditLog {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            actor_type: parse_enum::<ActorType>(row, 2)?,
            action: row.get(3)?,
            resource_type: row.get(4)?,
            resource_id: row.get(5)?,
            details: details.and_then(|d| serde_json::from_str(&d).ok()),
            ip_address: row.get(7)?,
        })
    }
}

pub fn query_one<T: FromRow, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Option<T>> {
    let mut stmt = conn.prepare(sql)?;
    Ok(stmt.query_row(params, |row| T::from_row(row)).optional()?)
}

pub fn query_all<T: FromRow, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| T::from_row(row))?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}
