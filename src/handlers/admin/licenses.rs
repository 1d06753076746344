use axum::{
    extract::{Extension, State},
    http::HeaderMap,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::audit;
use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::handlers::fields;
use crate::licensing::{IssueLicense, issue};
use crate::metrics::Counter;
use crate::middleware::AdminContext;
use crate::models::{AuditAction, LicenseStatus, LicenseView};

const MAX_REASON_LEN: usize = 500;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GenerateLicenseRequest {
    pub user_email: String,
    pub product_id: String,
    pub duration_days: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateLicenseResponse {
    pub success: bool,
    pub license_key: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LicenseStatusRequest {
    pub license_key: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LicenseResponse {
    pub success: bool,
    pub license: LicenseView,
}

/// POST /license/admin/generate
pub async fn generate_license(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    headers: HeaderMap,
    Json(request): Json<GenerateLicenseRequest>,
) -> Result<Json<GenerateLicenseResponse>> {
    let email = fields::email(&request.user_email)?;
    let product_id = fields::product_id(&request.product_id)?;
    let duration_days = fields::duration_days(request.duration_days)?;

    let mut conn = state.db.get()?;
    let license = state.update_licenses(&mut conn, |db| {
        issue(
            db,
            IssueLicense {
                email,
                product_id,
                duration_days,
                order_id: None,
            },
            Utc::now(),
        )
    })?;
    state.metrics.incr(Counter::LicensesIssued);

    audit(
        &conn,
        &admin,
        &headers,
        AuditAction::GenerateLicense,
        "license",
        &license.key,
        json!({
            "product_id": license.product_id,
            "duration_days": duration_days,
        }),
    )?;

    tracing::info!(product_id = %license.product_id, "License generated by admin");
    Ok(Json(GenerateLicenseResponse {
        success: true,
        license_key: license.key,
        expires_at: license.expires_at,
    }))
}

/// POST /license/admin/revoke
pub async fn revoke_license(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    headers: HeaderMap,
    Json(request): Json<LicenseStatusRequest>,
) -> Result<Json<LicenseResponse>> {
    change_status(&state, &admin, &headers, request, LicenseStatus::Revoked).map(Json)
}

/// POST /license/admin/suspend
pub async fn suspend_license(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    headers: HeaderMap,
    Json(request): Json<LicenseStatusRequest>,
) -> Result<Json<LicenseResponse>> {
    change_status(&state, &admin, &headers, request, LicenseStatus::Suspended).map(Json)
}

/// POST /license/admin/reinstate
pub async fn reinstate_license(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    headers: HeaderMap,
    Json(request): Json<LicenseStatusRequest>,
) -> Result<Json<LicenseResponse>> {
    change_status(&state, &admin, &headers, request, LicenseStatus::Active).map(Json)
}

fn change_status(
    state: &AppState,
    admin: &AdminContext,
    headers: &HeaderMap,
    request: LicenseStatusRequest,
    next: LicenseStatus,
) -> Result<LicenseResponse> {
    let key = fields::license_key(&request.license_key)?;
    let reason = request
        .reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    if reason.as_ref().is_some_and(|r| r.len() > MAX_REASON_LEN) {
        return Err(AppError::InvalidRequest("reason is too long".into()));
    }

    let mut conn = state.db.get()?;
    let (previous, view) = state.update_licenses(&mut conn, |db| {
        let license = db
            .get_mut(&key)
            .ok_or_else(|| AppError::NotFound("License not found".into()))?;

        let previous = license.status;
        if !previous.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "License cannot change from {} to {}",
                previous, next
            )));
        }

        license.status = next;
        license.status_reason = reason.clone();
        Ok((previous, LicenseView::from(&*license)))
    })?;

    let action = match next {
        LicenseStatus::Revoked => AuditAction::RevokeLicense,
        LicenseStatus::Suspended => AuditAction::SuspendLicense,
        _ => AuditAction::ReinstateLicense,
    };
    audit(
        &conn,
        admin,
        headers,
        action,
        "license",
        &key,
        json!({ "from": previous, "to": next, "reason": reason }),
    )?;

    tracing::info!(from = %previous, to = %next, "License status changed by admin");
    Ok(LicenseResponse {
        success: true,
        license: view,
    })
}

/// GET /license/admin/licenses/{key}
pub async fn get_license(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<LicenseResponse>> {
    let key = fields::license_key(&key)?;
    let conn = state.db.get()?;
    let db = state.load_licenses(&conn)?;
    let license = db
        .get(&key)
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;
    Ok(Json(LicenseResponse {
        success: true,
        license: LicenseView::from(license),
    }))
}
