//! Validation rules against an in-memory aggregate with a controlled clock.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::common::*;
use licensehub::licensing::{Rejection, validate};

const FP: &str = "aaaa-bbbb-cccc-dddd";

fn at(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, min, 0).unwrap()
}

fn db_with_license(created: DateTime<Utc>, days: i64) -> (LicenseDatabase, String) {
    let mut db = LicenseDatabase::new(LicenseSettings::default());
    let license = issue(
        &mut db,
        IssueLicense {
            email: "owner@example.com",
            product_id: "forex-ma-bot",
            duration_days: days,
            order_id: None,
        },
        created,
    )
    .unwrap();
    (db, license.key)
}

#[test]
fn test_unknown_key_is_invalid() {
    let (mut db, _) = db_with_license(at(1, 9, 0), 30);
    let before = db.clone();
    let result = validate(
        &mut db,
        "00000000-00000000-00000000-00000000",
        FP,
        &FingerprintPolicy::default(),
        at(1, 10, 0),
    );
    assert_eq!(result, Err(Rejection::InvalidLicense));
    assert_eq!(db, before);
}

#[test]
fn test_first_validation_binds_fingerprint() {
    let (mut db, key) = db_with_license(at(1, 9, 0), 30);
    let ok = validate(&mut db, &key, FP, &FingerprintPolicy::default(), at(1, 10, 0)).unwrap();

    assert!(ok.newly_bound);
    assert_eq!(ok.days_remaining, 30);
    assert_eq!(ok.max_offline_days, 7);
    assert_eq!(ok.grace_period_days, 7);

    let license = db.get(&key).unwrap();
    assert_eq!(license.hardware_fingerprint, FP);
    assert_eq!(license.validation_count, 1);
    assert_eq!(license.last_validated, Some(at(1, 10, 0)));
}

#[test]
fn test_tolerant_match_keeps_original_binding() {
    let (mut db, key) = db_with_license(at(1, 9, 0), 30);
    let policy = FingerprintPolicy::default();
    validate(&mut db, &key, FP, &policy, at(1, 10, 0)).unwrap();

    let drifted = "aaaa-bbbb-xxxx-yyyy";
    let ok = validate(&mut db, &key, drifted, &policy, at(1, 11, 0)).unwrap();
    assert!(!ok.newly_bound);
    assert_eq!(db.get(&key).unwrap().hardware_fingerprint, FP);
}

#[test]
fn test_hardware_mismatch_mutates_nothing() {
    let (mut db, key) = db_with_license(at(1, 9, 0), 30);
    let policy = FingerprintPolicy::default();
    validate(&mut db, &key, FP, &policy, at(1, 10, 0)).unwrap();
    let before = db.clone();

    let result = validate(&mut db, &key, "aaaa-xxxx-yyyy-zzzz", &policy, at(1, 11, 0));
    assert_eq!(result, Err(Rejection::HardwareMismatch));

    let result = validate(&mut db, &key, "aaaa-bbbb-cccc", &policy, at(1, 11, 0));
    assert_eq!(result, Err(Rejection::HardwareMismatch));
    assert_eq!(db, before);
}

#[test]
fn test_daily_limit_and_reset() {
    let (mut db, key) = db_with_license(at(1, 9, 0), 30);
    let policy = FingerprintPolicy::default();

    for i in 0..10 {
        validate(&mut db, &key, FP, &policy, at(2, 8, i)).unwrap();
    }
    assert_eq!(db.get(&key).unwrap().validation_count, 10);

    let result = validate(&mut db, &key, FP, &policy, at(2, 23, 59));
    assert_eq!(result, Err(Rejection::LimitExceeded));
    assert_eq!(db.get(&key).unwrap().validation_count, 10);

    validate(&mut db, &key, FP, &policy, at(3, 0, 0)).unwrap();
    assert_eq!(db.get(&key).unwrap().validation_count, 1);
}

#[test]
fn test_expiry_boundary_is_inclusive() {
    let created = at(1, 9, 0);
    let (mut db, key) = db_with_license(created, 30);
    let expires_at = db.get(&key).unwrap().expires_at;
    assert_eq!(expires_at, created + Duration::days(30));
    let policy = FingerprintPolicy::default();

    let ok = validate(&mut db, &key, FP, &policy, expires_at).unwrap();
    assert_eq!(ok.days_remaining, 0);

    let result = validate(
        &mut db,
        &key,
        FP,
        &policy,
        expires_at + Duration::microseconds(1),
    );
    assert_eq!(result, Err(Rejection::Expired));
}

#[test]
fn test_status_is_checked_before_expiry() {
    let created = at(1, 9, 0);
    let (mut db, key) = db_with_license(created, 1);
    db.get_mut(&key).unwrap().status = LicenseStatus::Suspended;

    let result = validate(
        &mut db,
        &key,
        FP,
        &FingerprintPolicy::default(),
        created + Duration::days(5),
    );
    assert_eq!(result, Err(Rejection::Inactive(LicenseStatus::Suspended)));
}

#[test]
fn test_expiry_is_checked_before_hardware() {
    let created = at(1, 9, 0);
    let (mut db, key) = db_with_license(created, 1);
    let policy = FingerprintPolicy::default();
    validate(&mut db, &key, FP, &policy, at(1, 10, 0)).unwrap();

    let result = validate(&mut db, &key, "zzzz-yyyy-xxxx-wwww", &policy, at(5, 0, 0));
    assert_eq!(result, Err(Rejection::Expired));
}
