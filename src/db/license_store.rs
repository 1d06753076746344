//! Persistence of the encrypted license database aggregate.
//!
//! The whole aggregate lives in a single row of `license_store`. Every mutation
//! is one read-decrypt-mutate-encrypt-write cycle inside a `BEGIN IMMEDIATE`
//! transaction, and the write is additionally guarded by the row's `version`
//! column so a stale cycle can never overwrite a newer one.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use crate::crypto::{CryptoError, StoreKey};
use crate::error::{AppError, Result};
use crate::models::{LicenseDatabase, LicenseSettings};

pub struct LicenseStore<'a> {
    key: &'a StoreKey,
    defaults: &'a LicenseSettings,
}

impl<'a> LicenseStore<'a> {
    pub fn new(key: &'a StoreKey, defaults: &'a LicenseSettings) -> Self {
        Self { key, defaults }
    }

    /// Load and decrypt the aggregate without modifying it.
    pub fn load(&self, conn: &Connection) -> Result<LicenseDatabase> {
        Ok(self.read(conn)?.0)
    }

    /// Run `f` against the aggregate and persist the result atomically.
    ///
    /// Nothing is written if `f` returns an error.
    pub fn update<T>(
        &self,
        conn: &mut Connection,
        f: impl FnOnce(&mut LicenseDatabase) -> Result<T>,
    ) -> Result<T> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = self.update_in(&tx, f)?;
        tx.commit()?;
        Ok(value)
    }

    /// Same as [`update`](Self::update) for callers that already hold an
    /// IMMEDIATE transaction spanning other tables.
    pub fn update_in<T>(
        &self,
        conn: &Connection,
        f: impl FnOnce(&mut LicenseDatabase) -> Result<T>,
    ) -> Result<T> {
        let (mut db, version) = self.read(conn)?;
        let value = f(&mut db)?;
        write(conn, self.key, &db, version)?;
        Ok(value)
    }

    fn read(&self, conn: &Connection) -> Result<(LicenseDatabase, i64)> {
        let row: Option<(Vec<u8>, i64)> = conn
            .query_row(
                "SELECT blob, version FROM license_store WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            None => {
                let settings = LicenseSettings {
                    key_id: self.key.key_id().to_string(),
                    ..self.defaults.clone()
                };
                Ok((LicenseDatabase::new(settings), 0))
            }
            Some((blob, version)) => Ok((decode(&blob, self.key)?, version)),
        }
    }
}

fn decode(blob: &[u8], key: &StoreKey) -> Result<LicenseDatabase> {
    let plaintext = key.decrypt(blob)?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| AppError::Decode(CryptoError::InvalidPayload(e.to_string())))
}

fn write(conn: &Connection, key: &StoreKey, db: &LicenseDatabase, version: i64) -> Result<()> {
    let plaintext = serde_json::to_vec(db)?;
    let blob = key.encrypt(&plaintext)?;
    let now = Utc::now().timestamp();

    let affected = if version == 0 {
        conn.execute(
            "INSERT INTO license_store (id, blob, version, key_id, updated_at)
             VALUES (1, ?1, 1, ?2, ?3)
             ON CONFLICT(id) DO NOTHING",
            params![blob, key.key_id(), now],
        )?
    } else {
        conn.execute(
            "UPDATE license_store SET blob = ?1, version = version + 1, key_id = ?2, updated_at = ?3
             WHERE id = 1 AND version = ?4",
            params![blob, key.key_id(), now, version],
        )?
    };

    if affected == 0 {
        return Err(AppError::Conflict(
            "License database was modified concurrently".into(),
        ));
    }
    Ok(())
}

/// Re-encrypt the stored aggregate under `new_key`. Returns the number of licenses.
pub fn rekey(conn: &mut Connection, old_key: &StoreKey, new_key: &StoreKey) -> Result<usize> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let row: Option<(Vec<u8>, i64)> = tx
        .query_row(
            "SELECT blob, version FROM license_store WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((blob, version)) = row else {
        return Err(AppError::NotFound("No license database stored yet".into()));
    };

    let mut db = decode(&blob, old_key)?;
    db.settings.key_id = new_key.key_id().to_string();
    write(&tx, new_key, &db, version)?;
    tx.commit()?;

    tracing::info!(
        old_key_id = %old_key.key_id(),
        new_key_id = %new_key.key_id(),
        licenses = db.licenses.len(),
        "License database re-encrypted"
    );
    Ok(db.licenses.len())
}
