mod from_row;
pub mod license_store;
pub mod queries;

use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::crypto::StoreKey;
use crate::error::{AppError, Result};
use crate::licensing::FingerprintPolicy;
use crate::metrics::{Counter, Metrics};
use crate::middleware::AdminVerifier;
use crate::models::{LicenseDatabase, LicenseSettings};
use crate::notify::Notifier;
use crate::payments::{IpnVerifier, PaymentGateway};

pub use license_store::LicenseStore;

pub type DbPool = Pool<SqliteConnectionManager>;

const BUSY_TIMEOUT_MS: u32 = 5000;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub store_key: Arc<StoreKey>,
    pub license_defaults: LicenseSettings,
    pub fingerprint_policy: FingerprintPolicy,
    pub license_duration_days: i64,
    pub admin: Arc<dyn AdminVerifier>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub ipn: IpnVerifier,
    pub notifier: Arc<dyn Notifier>,
    pub base_url: String,
    pub download_url: String,
    pub settlement_currency: String,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn license_store(&self) -> LicenseStore<'_> {
        LicenseStore::new(&self.store_key, &self.license_defaults)
    }

    /// Load the decrypted license database.
    pub fn load_licenses(&self, conn: &Connection) -> Result<LicenseDatabase> {
        self.license_store()
            .load(conn)
            .inspect_err(|e| self.note_store_error(e))
    }

    /// Mutate the license database in its own IMMEDIATE transaction.
    pub fn update_licenses<T>(
        &self,
        conn: &mut Connection,
        f: impl FnOnce(&mut LicenseDatabase) -> Result<T>,
    ) -> Result<T> {
        self.license_store()
            .update(conn, f)
            .inspect_err(|e| self.note_store_error(e))
    }

    /// Count decode failures; the error itself is logged when it is rendered.
    pub fn note_store_error(&self, err: &AppError) {
        if matches!(err, AppError::Decode(_)) {
            self.metrics.incr(Counter::DecodeFailures);
        }
    }
}

pub fn create_pool(database_path: &str, checkout_timeout: Duration) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = {};",
            BUSY_TIMEOUT_MS
        ))
    });

    Pool::builder()
        .max_size(10)
        .connection_timeout(checkout_timeout)
        .build(manager)
        .map_err(|e| AppError::Unavailable(format!("Failed to create pool: {}", e)))
}

/// Create the schema. Safe to run on every start.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Encrypted license database aggregate (single row)
        CREATE TABLE IF NOT EXISTS license_store (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            blob BLOB NOT NULL,
            version INTEGER NOT NULL,
            key_id TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL,
            amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
            currency TEXT NOT NULL,
            buyer_email TEXT NOT NULL,
            gateway_txn_id TEXT UNIQUE,
            checkout_url TEXT,
            status TEXT NOT NULL,
            license_key TEXT,
            notified INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);

        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            actor_type TEXT NOT NULL,
            action TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            details TEXT,
            ip_address TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_audit_logs_timestamp ON audit_logs(timestamp);
        CREATE INDEX IF NOT EXISTS idx_audit_logs_resource ON audit_logs(resource_type, resource_id);
        "#,
    )?;
    Ok(())
}
