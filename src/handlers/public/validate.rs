use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::handlers::fields;
use crate::licensing::{ValidationSuccess, validate};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ValidateRequest {
    pub license_key: String,
    pub hardware_fingerprint: String,
    #[serde(default)]
    pub app_version: Option<String>,
    /// Client clock at request time, only used to log skew.
    #[serde(default)]
    pub client_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub success: bool,
    pub valid: bool,
    pub expires_at: DateTime<Utc>,
    pub days_remaining: i64,
    pub max_offline_days: u32,
    pub grace_period_days: u32,
}

impl From<ValidationSuccess> for ValidateResponse {
    fn from(ok: ValidationSuccess) -> Self {
        Self {
            success: true,
            valid: true,
            expires_at: ok.expires_at,
            days_remaining: ok.days_remaining,
            max_offline_days: ok.max_offline_days,
            grace_period_days: ok.grace_period_days,
        }
    }
}

/// POST /license/validate
pub async fn validate_license(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>> {
    let key = fields::license_key(&request.license_key)?;
    let fingerprint = fields::fingerprint(&request.hardware_fingerprint)?;

    let now = Utc::now();
    if let Some(client_ts) = request.client_timestamp {
        let skew = (now - client_ts).num_seconds();
        if skew.abs() > 300 {
            tracing::debug!(skew_secs = skew, "Client clock skew on validation");
        }
    }

    let mut conn = state.db.get()?;
    let result = state.update_licenses(&mut conn, |db| {
        validate(db, &key, fingerprint, &state.fingerprint_policy, now).map_err(AppError::from)
    });

    match result {
        Ok(success) => {
            tracing::info!(
                newly_bound = success.newly_bound,
                days_remaining = success.days_remaining,
                app_version = request.app_version.as_deref().unwrap_or("unknown"),
                "License validated"
            );
            Ok(Json(success.into()))
        }
        Err(AppError::Rejected(rejection)) => {
            tracing::info!(reason = rejection.reason(), "License validation rejected");
            Err(rejection.into())
        }
        Err(e) => Err(e),
    }
}
