use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::fingerprint::FingerprintPolicy;
use super::quota::check_daily_quota;
use crate::models::{LicenseDatabase, LicenseStatus};

const MICROS_PER_DAY: i64 = 86_400 * 1_000_000;

/// Why a validation request was turned down. None of these mutate the license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("License key not found")]
    InvalidLicense,
    #[error("License is {0}")]
    Inactive(LicenseStatus),
    #[error("License has expired")]
    Expired,
    #[error("License is bound to different hardware")]
    HardwareMismatch,
    #[error("Daily validation limit reached")]
    LimitExceeded,
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::InvalidLicense => "INVALID_LICENSE",
            Rejection::Inactive(_) => "LICENSE_INACTIVE",
            Rejection::Expired => "LICENSE_EXPIRED",
            Rejection::HardwareMismatch => "HARDWARE_MISMATCH",
            Rejection::LimitExceeded => "VALIDATION_LIMIT_EXCEEDED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSuccess {
    pub expires_at: DateTime<Utc>,
    pub days_remaining: i64,
    pub max_offline_days: u32,
    pub grace_period_days: u32,
    /// True when this validation bound the license to the presented fingerprint.
    pub newly_bound: bool,
}

/// Validate `license_key` on `fingerprint` at `now`, applying bookkeeping on success.
///
/// Checks run in a fixed order and the first failure wins: existence, status,
/// expiry (inclusive: valid while `now <= expires_at`), hardware, daily quota.
pub fn validate(
    db: &mut LicenseDatabase,
    license_key: &str,
    fingerprint: &str,
    policy: &FingerprintPolicy,
    now: DateTime<Utc>,
) -> Result<ValidationSuccess, Rejection> {
    let max_per_day = db.settings.max_validations_per_day;
    let grace_period_days = db.settings.grace_period_days;

    let license = db.get_mut(license_key).ok_or(Rejection::InvalidLicense)?;

    if license.status != LicenseStatus::Active {
        return Err(Rejection::Inactive(license.status));
    }

    if now > license.expires_at {
        return Err(Rejection::Expired);
    }

    if !policy.matches(&license.hardware_fingerprint, fingerprint) {
        return Err(Rejection::HardwareMismatch);
    }

    let quota = check_daily_quota(
        license.last_validated,
        license.validation_count,
        max_per_day,
        now,
    );
    if !quota.allowed {
        return Err(Rejection::LimitExceeded);
    }

    let newly_bound = !license.is_bound();
    if newly_bound {
        license.hardware_fingerprint = fingerprint.to_string();
    }
    license.last_validated = Some(now);
    license.validation_count = quota.new_count;

    Ok(ValidationSuccess {
        expires_at: license.expires_at,
        days_remaining: days_remaining(license.expires_at, now),
        max_offline_days: license.max_offline_days,
        grace_period_days,
        newly_bound,
    })
}

/// `ceil((expires_at - now) / 1 day)`, never negative.
pub fn days_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let micros = (expires_at - now).num_microseconds().unwrap_or(i64::MAX);
    if micros <= 0 {
        return 0;
    }
    (micros + MICROS_PER_DAY - 1) / MICROS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn days_remaining_rounds_up() {
        let now = Utc::now();
        assert_eq!(days_remaining(now, now), 0);
        assert_eq!(days_remaining(now + Duration::microseconds(1), now), 1);
        assert_eq!(days_remaining(now + Duration::days(1), now), 1);
        assert_eq!(days_remaining(now + Duration::days(1) + Duration::seconds(1), now), 2);
        assert_eq!(days_remaining(now - Duration::days(3), now), 0);
    }

    #[test]
    fn reason_codes() {
        assert_eq!(Rejection::InvalidLicense.reason(), "INVALID_LICENSE");
        assert_eq!(
            Rejection::Inactive(LicenseStatus::Revoked).reason(),
            "LICENSE_INACTIVE"
        );
        assert_eq!(Rejection::LimitExceeded.reason(), "VALIDATION_LIMIT_EXCEEDED");
    }
}
