use std::env;
use std::fmt;
use std::time::Duration;

use anyhow::{Context, bail};

use crate::payments::DEFAULT_API_URL;

/// A configuration value that must never show up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    /// Base64 of the 32-byte master key protecting the license database.
    pub license_db_key: Secret,
    pub admin_secret: Secret,
    pub coinpayments: CoinPaymentsConfig,
    pub settlement_currency: String,
    /// When unset, notifications are only logged.
    pub resend_api_key: Option<Secret>,
    pub email_from: String,
    pub download_url: String,
    pub license_duration_days: i64,
    pub max_validations_per_day: u32,
    pub grace_period_days: u32,
    pub max_offline_days: u32,
    pub fingerprint_tolerance: usize,
    pub gateway_timeout: Duration,
    pub notify_timeout: Duration,
    pub db_pool_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CoinPaymentsConfig {
    pub api_url: String,
    pub public_key: String,
    pub private_key: Secret,
    pub merchant_id: String,
    pub ipn_secret: Secret,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn required(name: &str) -> anyhow::Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => bail!("{} must be set", name),
    }
}

fn parsed<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", name, value)),
        Err(_) => Ok(default),
    }
}

fn at_least<T>(name: &str, value: T, min: T) -> anyhow::Result<T>
where
    T: PartialOrd + fmt::Display,
{
    if value < min {
        bail!("{} must be at least {}, got {}", name, min, value);
    }
    Ok(value)
}

fn secs(name: &str, default: u64) -> anyhow::Result<Duration> {
    Ok(Duration::from_secs(at_least(name, parsed(name, default)?, 1)?))
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = var_or("HOST", "127.0.0.1");
        let port: u16 = parsed("PORT", 3000)?;
        let base_url = env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let coinpayments = CoinPaymentsConfig {
            api_url: var_or("COINPAYMENTS_API_URL", DEFAULT_API_URL),
            public_key: var_or("COINPAYMENTS_PUBLIC_KEY", ""),
            private_key: Secret::new(var_or("COINPAYMENTS_PRIVATE_KEY", "")),
            merchant_id: required("COINPAYMENTS_MERCHANT_ID")?.trim().to_string(),
            ipn_secret: Secret::new(required("COINPAYMENTS_IPN_SECRET")?),
        };

        let license_duration_days: i64 = parsed("LICENSE_DURATION_DAYS", 365)?;
        if !(1..=36500).contains(&license_duration_days) {
            bail!("LICENSE_DURATION_DAYS must be between 1 and 36500");
        }

        Ok(Self {
            host,
            port,
            database_path: var_or("DATABASE_PATH", "licensehub.db"),
            base_url,
            license_db_key: Secret::new(required("LICENSE_DB_KEY")?),
            admin_secret: Secret::new(required("ADMIN_SECRET")?),
            coinpayments,
            settlement_currency: var_or("SETTLEMENT_CURRENCY", "USDT.TRC20"),
            resend_api_key: env::var("RESEND_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(Secret::new),
            email_from: var_or("EMAIL_FROM", "licenses@localhost"),
            download_url: var_or("DOWNLOAD_URL", ""),
            license_duration_days,
            max_validations_per_day: at_least(
                "MAX_VALIDATIONS_PER_DAY",
                parsed("MAX_VALIDATIONS_PER_DAY", 10)?,
                1,
            )?,
            grace_period_days: parsed("GRACE_PERIOD_DAYS", 7)?,
            max_offline_days: parsed("MAX_OFFLINE_DAYS", 7)?,
            fingerprint_tolerance: parsed("FINGERPRINT_TOLERANCE", 2)?,
            gateway_timeout: secs("GATEWAY_TIMEOUT_SECS", 15)?,
            notify_timeout: secs("NOTIFY_TIMEOUT_SECS", 10)?,
            db_pool_timeout: secs("DB_POOL_TIMEOUT_SECS", 5)?,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
