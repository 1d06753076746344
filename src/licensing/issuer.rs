use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{License, LicenseDatabase, LicenseStatus};

const KEY_GROUPS: usize = 4;
const GROUP_LEN: usize = 8;
pub const MAX_DURATION_DAYS: i64 = 36_500;
const MAX_KEY_ATTEMPTS: usize = 8;

/// Generate a license key in `XXXXXXXX-XXXXXXXX-XXXXXXXX-XXXXXXXX` form.
///
/// The seed is random (UUIDv4 plus 32 bytes from the thread RNG), never derived
/// from the buyer or product, so keys cannot be enumerated.
pub fn generate_license_key() -> String {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);

    let mut hasher = Sha256::new();
    hasher.update(b"licensehub-key-v1:");
    hasher.update(Uuid::new_v4().as_bytes());
    hasher.update(seed);
    let digest = hasher.finalize();

    let hex = hex::encode_upper(&digest[..KEY_GROUPS * GROUP_LEN / 2]);
    hex.as_bytes()
        .chunks(GROUP_LEN)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}

/// Whether `key` has the documented license key shape.
pub fn is_well_formed_key(key: &str) -> bool {
    let groups: Vec<&str> = key.split('-').collect();
    groups.len() == KEY_GROUPS
        && groups.iter().all(|g| {
            g.len() == GROUP_LEN && g.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
        })
}

/// Normalize an owner email for storage (trimmed, NFKC, lowercase).
pub fn normalize_email(email: &str) -> String {
    email.trim().nfkc().collect::<String>().to_lowercase()
}

/// Parameters for a new license.
#[derive(Debug, Clone)]
pub struct IssueLicense<'a> {
    pub email: &'a str,
    pub product_id: &'a str,
    pub duration_days: i64,
    pub order_id: Option<&'a str>,
}

/// Insert a fresh active license into the aggregate and return it.
pub fn issue(db: &mut LicenseDatabase, input: IssueLicense<'_>, now: DateTime<Utc>) -> Result<License> {
    if input.duration_days < 1 || input.duration_days > MAX_DURATION_DAYS {
        return Err(AppError::InvalidRequest(format!(
            "durationDays must be between 1 and {}",
            MAX_DURATION_DAYS
        )));
    }

    let key = (0..MAX_KEY_ATTEMPTS)
        .map(|_| generate_license_key())
        .find(|candidate| !db.contains(candidate))
        .ok_or_else(|| AppError::Internal("Could not generate a unique license key".into()))?;

    let license = License {
        key: key.clone(),
        email: normalize_email(input.email),
        product_id: input.product_id.to_string(),
        created_at: now,
        expires_at: now + Duration::days(input.duration_days),
        hardware_fingerprint: String::new(),
        status: LicenseStatus::Active,
        last_validated: None,
        validation_count: 0,
        max_offline_days: db.settings.default_max_offline_days,
        order_id: input.order_id.map(String::from),
        status_reason: None,
    };

    db.licenses.insert(key, license.clone());
    Ok(license)
}
