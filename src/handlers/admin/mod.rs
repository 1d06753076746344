mod audit_logs;
mod licenses;
mod orders;

pub use audit_logs::*;
pub use licenses::*;
pub use orders::*;

use axum::{
    Router,
    http::HeaderMap,
    middleware,
    routing::{get, post},
};
use rusqlite::Connection;

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::middleware::{AdminContext, require_admin};
use crate::models::{ActorType, AuditAction};
use crate::util::client_ip;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/license/admin/generate", post(generate_license))
        .route("/license/admin/revoke", post(revoke_license))
        .route("/license/admin/suspend", post(suspend_license))
        .route("/license/admin/reinstate", post(reinstate_license))
        .route("/license/admin/licenses/{key}", get(get_license))
        .route("/orders/admin/{id}", get(get_order))
        .route("/orders/admin/{id}/cancel", post(cancel_order))
        .route("/orders/admin/{id}/resend", post(resend_order_notification))
        .route("/admin/audit-logs", get(query_audit_logs))
        .route("/admin/metrics", get(get_metrics))
        .layer(middleware::from_fn_with_state(state, require_admin))
}

fn audit(
    conn: &Connection,
    admin: &AdminContext,
    headers: &HeaderMap,
    action: AuditAction,
    resource_type: &str,
    resource_id: &str,
    mut details: serde_json::Value,
) -> Result<()> {
    if let Some(obj) = details.as_object_mut() {
        obj.insert("actor".into(), admin.actor.clone().into());
    }
    queries::create_audit_log(
        conn,
        ActorType::Admin,
        action,
        resource_type,
        resource_id,
        Some(&details),
        client_ip(headers).as_deref(),
    )?;
    Ok(())
}
