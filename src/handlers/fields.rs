//! Field checks applied to request bodies before anything touches the store.

use crate::error::{AppError, Result};
use crate::licensing::{MAX_DURATION_DAYS, is_well_formed_key};

const MAX_EMAIL_LEN: usize = 254;
const MAX_PRODUCT_ID_LEN: usize = 64;
const MAX_FINGERPRINT_LEN: usize = 256;
const MAX_AMOUNT_CENTS: i64 = 100_000_000;

fn invalid(msg: impl Into<String>) -> AppError {
    AppError::InvalidRequest(msg.into())
}

/// Uppercase and trim a license key, rejecting anything not shaped like one.
pub fn license_key(raw: &str) -> Result<String> {
    let key = raw.trim().to_ascii_uppercase();
    if !is_well_formed_key(&key) {
        return Err(invalid("licenseKey is malformed"));
    }
    Ok(key)
}

pub fn fingerprint(raw: &str) -> Result<&str> {
    let fp = raw.trim();
    if fp.is_empty() {
        return Err(invalid("hardwareFingerprint is required"));
    }
    if fp.len() > MAX_FINGERPRINT_LEN || !fp.chars().all(|c| c.is_ascii_graphic()) {
        return Err(invalid("hardwareFingerprint is malformed"));
    }
    Ok(fp)
}

pub fn email(raw: &str) -> Result<&str> {
    let email = raw.trim();
    let valid = email.len() <= MAX_EMAIL_LEN
        && !email.chars().any(char::is_whitespace)
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(invalid("email address is invalid"));
    }
    Ok(email)
}

pub fn product_id(raw: &str) -> Result<&str> {
    let id = raw.trim();
    let valid = !id.is_empty()
        && id.len() <= MAX_PRODUCT_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(invalid("productId is invalid"));
    }
    Ok(id)
}

pub fn duration_days(days: i64) -> Result<i64> {
    if !(1..=MAX_DURATION_DAYS).contains(&days) {
        return Err(invalid(format!(
            "durationDays must be between 1 and {}",
            MAX_DURATION_DAYS
        )));
    }
    Ok(days)
}

/// Gateway currency codes look like `BTC` or `USDT.TRC20`.
pub fn currency(raw: &str) -> Result<String> {
    let code = raw.trim().to_ascii_uppercase();
    let valid = (2..=20).contains(&code.len())
        && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '.');
    if !valid {
        return Err(invalid("currency is invalid"));
    }
    Ok(code)
}

/// Parse a decimal USD amount into cents. At most two fractional digits.
pub fn amount_cents(raw: &str) -> Result<i64> {
    let err = || invalid("amountUSD must be a positive amount with at most two decimals");

    let (whole, frac) = raw.trim().split_once('.').unwrap_or((raw.trim(), ""));
    if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
        return Err(err());
    }
    if frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(err());
    }

    let whole: i64 = whole.parse().map_err(|_| err())?;
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().map_err(|_| err())? * 10,
        _ => frac.parse().map_err(|_| err())?,
    };

    let cents = whole
        .checked_mul(100)
        .and_then(|c| c.checked_add(frac))
        .ok_or_else(err)?;
    if cents <= 0 || cents > MAX_AMOUNT_CENTS {
        return Err(err());
    }
    Ok(cents)
}
