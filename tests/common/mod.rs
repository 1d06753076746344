//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use chrono::Utc;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub use licensehub::config::Secret;
pub use licensehub::crypto::StoreKey;
pub use licensehub::db::{AppState, queries};
pub use licensehub::error::{AppError, Result};
pub use licensehub::licensing::{FingerprintPolicy, IssueLicense, issue};
pub use licensehub::metrics::{Counter, Metrics};
pub use licensehub::middleware::StaticSecretVerifier;
pub use licensehub::models::*;
pub use licensehub::notify::Notifier;
pub use licensehub::payments::{
    GatewayTransaction, IpnVerifier, PaymentGateway, TransactionRequest, sign,
};

pub const ADMIN_SECRET: &str = "test-admin-secret";
pub const IPN_SECRET: &str = "test-ipn-secret";
pub const MERCHANT_ID: &str = "merchant-0001";
pub const BASE_URL: &str = "http://localhost:3000";

pub fn test_store_key() -> StoreKey {
    StoreKey::from_bytes([7u8; 32]).unwrap()
}

pub fn other_store_key() -> StoreKey {
    StoreKey::from_bytes([9u8; 32]).unwrap()
}

// ============ Payment gateway mock ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayReply {
    Accept,
    Error,
    Timeout,
}

/// Scripted gateway. Replies are consumed in order; once the script is
/// exhausted every call is accepted.
#[derive(Default)]
pub struct MockGateway {
    script: Mutex<VecDeque<GatewayReply>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<TransactionRequest>>,
}

impl MockGateway {
    pub fn push(&self, reply: GatewayReply) {
        self.script.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<TransactionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_transaction(&self, request: &TransactionRequest) -> Result<GatewayTransaction> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());

        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(GatewayReply::Accept);

        match reply {
            GatewayReply::Accept => Ok(GatewayTransaction {
                txn_id: format!("CPTEST{:04}", n),
                checkout_url: format!("https://gateway.test/checkout/CPTEST{:04}", n),
                status_url: None,
            }),
            GatewayReply::Error => Err(AppError::Gateway("scripted failure".into())),
            GatewayReply::Timeout => Err(AppError::GatewayTimeout),
        }
    }
}

// ============ Notifier mock ============

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMessage>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::NotifyFailed("scripted failure".into()));
        }
        self.sent.lock().unwrap().push(SentMessage {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

// ============ App fixture ============

pub struct TestApp {
    pub state: AppState,
    pub gateway: Arc<MockGateway>,
    pub notifier: Arc<RecordingNotifier>,
    _dir: TempDir,
}

/// App state backed by a throwaway SQLite file.
///
/// A file is used rather than `:memory:` so every pooled connection sees the
/// same database.
pub fn create_test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("licensehub-test.db");
    let pool =
        licensehub::db::create_pool(path.to_str().unwrap(), Duration::from_secs(5)).unwrap();
    {
        let conn = pool.get().unwrap();
        licensehub::db::init_db(&conn).unwrap();
    }

    let gateway = Arc::new(MockGateway::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let state = AppState {
        db: pool,
        store_key: Arc::new(test_store_key()),
        license_defaults: LicenseSettings::default(),
        fingerprint_policy: FingerprintPolicy::default(),
        license_duration_days: 365,
        admin: Arc::new(StaticSecretVerifier::new(&Secret::new(ADMIN_SECRET))),
        gateway: gateway.clone(),
        ipn: IpnVerifier::new(Secret::new(IPN_SECRET), MERCHANT_ID),
        notifier: notifier.clone(),
        base_url: BASE_URL.to_string(),
        download_url: "https://downloads.test/forex-ma-bot".to_string(),
        settlement_currency: "USDT.TRC20".to_string(),
        metrics: Arc::new(Metrics::default()),
    };

    TestApp {
        state,
        gateway,
        notifier,
        _dir: dir,
    }
}

impl TestApp {
    pub fn router(&self) -> Router {
        licensehub::handlers::app(self.state.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        (status, body_json(response).await)
    }

    pub fn licenses(&self) -> LicenseDatabase {
        let conn = self.state.db.get().unwrap();
        self.state.load_licenses(&conn).unwrap()
    }

    pub fn order(&self, id: &str) -> Order {
        let conn = self.state.db.get().unwrap();
        queries::get_order(&conn, id).unwrap().unwrap()
    }

    /// Issue a license straight into the store.
    pub fn seed_license(&self, email: &str, product_id: &str, duration_days: i64) -> License {
        let mut conn = self.state.db.get().unwrap();
        self.state
            .update_licenses(&mut conn, |db| {
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
            })
            .unwrap()
    }

    /// Rewrite one license in the store.
    pub fn edit_license(&self, key: &str, f: impl FnOnce(&mut License)) {
        let mut conn = self.state.db.get().unwrap();
        self.state
            .update_licenses(&mut conn, |db| {
                f(db.get_mut(key).unwrap());
                Ok(())
            })
            .unwrap();
    }

    /// An order that already went through checkout (`pending`, txn attached).
    pub fn seed_pending_order(&self, txn_id: &str) -> Order {
        let conn = self.state.db.get().unwrap();
        let order = queries::create_order(
            &conn,
            &CreateOrder {
                product_id: "forex-ma-bot".to_string(),
                amount_cents: 29_900,
                currency: "USDT.TRC20".to_string(),
                buyer_email: "buyer@example.com".to_string(),
            },
        )
        .unwrap();
        assert!(
            queries::attach_gateway_transaction(
                &conn,
                &order.id,
                txn_id,
                "https://gateway.test/checkout"
            )
            .unwrap()
        );
        queries::get_order(&conn, &order.id).unwrap().unwrap()
    }
}

// ============ Request helpers ============

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&body).expect("Response should be valid JSON")
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn admin_post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {}", ADMIN_SECRET))
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn admin_get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("Authorization", format!("Bearer {}", ADMIN_SECRET))
        .body(Body::empty())
        .unwrap()
}

/// Form fields of a well-formed IPN for `order_id`.
pub fn ipn_fields(order_id: &str, txn_id: &str, status: i64) -> Vec<(String, String)> {
    vec![
        ("ipn_version".into(), "1.0".into()),
        ("ipn_id".into(), format!("ipn-{}-{}", txn_id, status)),
        ("ipn_mode".into(), "hmac".into()),
        ("merchant".into(), MERCHANT_ID.into()),
        ("ipn_type".into(), "api".into()),
        ("txn_id".into(), txn_id.into()),
        ("status".into(), status.to_string()),
        ("status_text".into(), "test".into()),
        ("currency1".into(), "USD".into()),
        ("currency2".into(), "USDT.TRC20".into()),
        ("amount1".into(), "299.00".into()),
        ("invoice".into(), order_id.into()),
    ]
}

pub fn encode_form(fields: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields.iter())
        .finish()
}

pub fn webhook_request(body: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/payment/webhook")
        .header("Content-Type", "application/x-www-form-urlencoded");
    if let Some(sig) = signature {
        builder = builder.header("HMAC", sig);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// A correctly signed IPN delivery.
pub fn signed_ipn(order_id: &str, txn_id: &str, status: i64) -> Request<Body> {
    let body = encode_form(&ipn_fields(order_id, txn_id, status));
    let sig = sign(body.as_bytes(), IPN_SECRET).unwrap();
    webhook_request(&body, Some(&sig))
}
