use axum::http::StatusCode;
use serde_json::json;

use crate::common::*;

const FP: &str = "aaaa-bbbb-cccc-dddd";

fn validate_body(key: &str, fingerprint: &str) -> serde_json::Value {
    json!({ "licenseKey": key, "hardwareFingerprint": fingerprint })
}

#[tokio::test]
async fn test_validate_success_shape() {
    let app = create_test_app();
    let license = app.seed_license("owner@example.com", "forex-ma-bot", 365);

    let (status, body) = app
        .send(post_json(
            "/license/validate",
            json!({
                "licenseKey": license.key,
                "hardwareFingerprint": FP,
                "appVersion": "1.4.2",
                "clientTimestamp": "2026-03-01T10:00:00Z"
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["valid"], true);
    assert_eq!(body["daysRemaining"], 365);
    assert_eq!(body["maxOfflineDays"], 7);
    assert_eq!(body["gracePeriodDays"], 7);
    assert!(body["expiresAt"].is_string());

    assert_eq!(
        app.licenses().get(&license.key).unwrap().hardware_fingerprint,
        FP
    );
}

#[tokio::test]
async fn test_validate_accepts_lowercase_key() {
    let app = create_test_app();
    let license = app.seed_license("owner@example.com", "forex-ma-bot", 30);

    let (status, _) = app
        .send(post_json(
            "/license/validate",
            validate_body(&license.key.to_lowercase(), FP),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_key_is_404() {
    let app = create_test_app();
    let (status, body) = app
        .send(post_json(
            "/license/validate",
            validate_body("00000000-00000000-00000000-00000000", FP),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["reason"], "INVALID_LICENSE");
}

#[tokio::test]
async fn test_malformed_requests_are_400() {
    let app = create_test_app();
    let license = app.seed_license("owner@example.com", "forex-ma-bot", 30);

    let cases = [
        validate_body("not-a-license-key", FP),
        validate_body(&license.key, ""),
        validate_body(&license.key, "has spaces in it"),
        json!({ "licenseKey": license.key }),
        json!({ "licenseKey": license.key, "hardwareFingerprint": FP, "extra": 1 }),
    ];

    for body in cases {
        let (status, json) = app.send(post_json("/license/validate", body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
        assert_eq!(json["reason"], "INVALID_REQUEST");
    }

    // None of the bad requests touched the license.
    let stored = app.licenses();
    let stored = stored.get(&license.key).unwrap();
    assert!(!stored.is_bound());
    assert_eq!(stored.validation_count, 0);
}

#[tokio::test]
async fn test_inactive_license_reports_status() {
    let app = create_test_app();
    let license = app.seed_license("owner@example.com", "forex-ma-bot", 30);
    app.edit_license(&license.key, |l| l.status = LicenseStatus::Revoked);

    let (status, body) = app
        .send(post_json("/license/validate", validate_body(&license.key, FP)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "LICENSE_INACTIVE");
    assert_eq!(body["status"], "revoked");
}

#[tokio::test]
async fn test_expired_license_is_403() {
    let app = create_test_app();
    let license = app.seed_license("owner@example.com", "forex-ma-bot", 30);
    app.edit_license(&license.key, |l| {
        l.expires_at = chrono::Utc::now() - chrono::Duration::seconds(1)
    });

    let (status, body) = app
        .send(post_json("/license/validate", validate_body(&license.key, FP)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "LICENSE_EXPIRED");
}

#[tokio::test]
async fn test_hardware_mismatch_is_403() {
    let app = create_test_app();
    let license = app.seed_license("owner@example.com", "forex-ma-bot", 30);

    let (status, _) = app
        .send(post_json("/license/validate", validate_body(&license.key, FP)))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(post_json(
            "/license/validate",
            validate_body(&license.key, "zzzz-yyyy-xxxx-dddd"),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "HARDWARE_MISMATCH");
}

#[tokio::test]
async fn test_eleventh_validation_of_the_day_is_rejected() {
    let app = create_test_app();
    let license = app.seed_license("owner@example.com", "forex-ma-bot", 30);

    for i in 1..=10 {
        let (status, _) = app
            .send(post_json("/license/validate", validate_body(&license.key, FP)))
            .await;
        assert_eq!(status, StatusCode::OK, "validation {}", i);
    }

    let (status, body) = app
        .send(post_json("/license/validate", validate_body(&license.key, FP)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "VALIDATION_LIMIT_EXCEEDED");
    assert_eq!(
        app.licenses().get(&license.key).unwrap().validation_count,
        10
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_validations_are_all_counted() {
    let app = create_test_app();
    let license = app.seed_license("owner@example.com", "forex-ma-bot", 30);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let router = app.router();
        let request = post_json("/license/validate", validate_body(&license.key, FP));
        handles.push(tokio::spawn(async move {
            use tower::ServiceExt;
            router.oneshot(request).await.unwrap().status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    let stored = app.licenses().get(&license.key).cloned().unwrap();
    assert_eq!(stored.validation_count, 8);
    assert_eq!(stored.hardware_fingerprint, FP);
}
