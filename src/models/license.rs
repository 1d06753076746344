use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Current schema version of the decrypted license database JSON.
pub const LICENSE_DB_SCHEMA_VERSION: u32 = 1;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Expired,
    Revoked,
    Suspended,
}

impl LicenseStatus {
    /// Status changes are one-directional except the administrative
    /// `suspended -> active` reinstatement. `revoked` is terminal.
    pub fn can_transition_to(self, next: LicenseStatus) -> bool {
        use LicenseStatus::*;
        matches!(
            (self, next),
            (Active, Suspended)
                | (Active, Expired)
                | (Active, Revoked)
                | (Suspended, Revoked)
                | (Expired, Revoked)
                | (Suspended, Active)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    pub key: String,
    pub email: String,
    pub product_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Empty until the first successful validation binds it.
    #[serde(default)]
    pub hardware_fingerprint: String,
    pub status: LicenseStatus,
    #[serde(default)]
    pub last_validated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub validation_count: u32,
    pub max_offline_days: u32,
    /// Order that paid for this license, if it was issued by checkout.
    #[serde(default)]
    pub order_id: Option<String>,
    /// Admin note recorded with the last status change.
    #[serde(default)]
    pub status_reason: Option<String>,
}

impl License {
    pub fn is_bound(&self) -> bool {
        !self.hardware_fingerprint.is_empty()
    }
}

/// Global settings stored inside the encrypted aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseSettings {
    pub grace_period_days: u32,
    pub max_validations_per_day: u32,
    pub default_max_offline_days: u32,
    /// Identifier of the key the aggregate is encrypted with (never the key itself).
    #[serde(default)]
    pub key_id: String,
}

impl Default for LicenseSettings {
    fn default() -> Self {
        Self {
            grace_period_days: 7,
            max_validations_per_day: 10,
            default_max_offline_days: 7,
            key_id: String::new(),
        }
    }
}

/// The license database aggregate: the unit of encryption and persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseDatabase {
    pub schema_version: u32,
    pub licenses: BTreeMap<String, License>,
    pub settings: LicenseSettings,
}

impl LicenseDatabase {
    pub fn new(settings: LicenseSettings) -> Self {
        Self {
            schema_version: LICENSE_DB_SCHEMA_VERSION,
            licenses: BTreeMap::new(),
            settings,
        }
    }

    pub fn get(&self, key: &str) -> Option<&License> {
        self.licenses.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut License> {
        self.licenses.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.licenses.contains_key(key)
    }
}

/// Admin view of a license returned by the lookup endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseView {
    pub key: String,
    pub email: String,
    pub product_id: String,
    pub status: LicenseStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub bound: bool,
    pub last_validated: Option<DateTime<Utc>>,
    pub validation_count: u32,
    pub max_offline_days: u32,
    pub order_id: Option<String>,
    pub status_reason: Option<String>,
}

impl From<&License> for LicenseView {
    fn from(license: &License) -> Self {
        Self {
            key: license.key.clone(),
            email: license.email.clone(),
            product_id: license.product_id.clone(),
            status: license.status,
            created_at: license.created_at,
            expires_at: license.expires_at,
            bound: license.is_bound(),
            last_validated: license.last_validated,
            validation_count: license.validation_count,
            max_offline_days: license.max_offline_days,
            order_id: license.order_id.clone(),
            status_reason: license.status_reason.clone(),
        }
    }
}
