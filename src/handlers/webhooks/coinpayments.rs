use axum::{body::Bytes, extract::State, http::HeaderMap};
use serde::Serialize;
use serde_json::json;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::metrics::Counter;
use crate::models::{ActorType, AuditAction};
use crate::payments::{SIGNATURE_HEADER, WebhookRejection};
use crate::reconcile::{ReconcileOutcome, reconcile};
use crate::util::client_ip;

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    pub outcome: &'static str,
}

impl From<&ReconcileOutcome> for WebhookAck {
    fn from(outcome: &ReconcileOutcome) -> Self {
        let outcome = match outcome {
            ReconcileOutcome::UnknownOrder => "unknown_order",
            ReconcileOutcome::Unchanged(_) => "unchanged",
            ReconcileOutcome::Ignored { .. } => "ignored",
            ReconcileOutcome::Transitioned { .. } => "updated",
            ReconcileOutcome::Completed { .. } => "completed",
        };
        Self {
            success: true,
            outcome,
        }
    }
}

/// POST /payment/webhook
///
/// The body is taken as raw bytes: the signature covers the exact bytes sent.
pub async fn handle_coinpayments_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    state.metrics.incr(Counter::WebhooksReceived);

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let ipn = match state.ipn.verify(&body, signature) {
        Ok(ipn) => ipn,
        Err(rejection) => {
            record_rejection(&state, &headers, &rejection);
            return Err(rejection.into());
        }
    };

    tracing::debug!(
        ipn_id = ipn.ipn_id.as_deref().unwrap_or(""),
        txn_id = %ipn.txn_id,
        status = ipn.status,
        status_text = ipn.status_text.as_deref().unwrap_or(""),
        paid_currency = ipn.paid_currency.as_deref().unwrap_or(""),
        "Webhook authenticated"
    );

    let outcome = reconcile(&state, &ipn).await?;
    Ok(Json(WebhookAck::from(&outcome)))
}

fn record_rejection(state: &AppState, headers: &HeaderMap, rejection: &WebhookRejection) {
    state.metrics.incr(Counter::WebhooksRejected);

    let ip = client_ip(headers);
    tracing::warn!(
        reason = %rejection,
        ip = ip.as_deref().unwrap_or("unknown"),
        "Rejected webhook delivery, possible forgery"
    );

    let audited = state.db.get().map_err(AppError::from).and_then(|conn| {
        queries::create_audit_log(
            &conn,
            ActorType::Gateway,
            AuditAction::WebhookRejected,
            "webhook",
            "coinpayments",
            Some(&json!({ "reason": rejection.to_string() })),
            ip.as_deref(),
        )
    });
    if let Err(e) = audited {
        tracing::error!(error = %e, "Failed to audit rejected webhook");
    }
}
