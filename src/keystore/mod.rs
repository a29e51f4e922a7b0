//! Provider credential store.
//!
//! Keys are encrypted at rest and kept in a single SQLite database under the
//! data directory. Each provider has at most one active key; the generation
//! controller consults [`Keystore::active_key`] read-only at submit time,
//! while the HTTP API drives the CRUD surface.

pub mod crypto;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::providers::{default_base_url, normalize_provider};
use crypto::{mask_secret, CryptoError, SecretCipher};

/// Database filename within the data directory.
const DB_FILENAME: &str = "studio.db";

/// Credential table DDL. `IF NOT EXISTS` keeps application idempotent.
const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS api_keys (
    id         TEXT PRIMARY KEY,
    provider   TEXT NOT NULL,
    name       TEXT NOT NULL DEFAULT '',
    base_url   TEXT NOT NULL DEFAULT '',
    secret     TEXT NOT NULL,
    source     TEXT NOT NULL DEFAULT 'custom',
    is_active  INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_api_keys_provider ON api_keys(provider);
"#;

/// Errors from the credential store.
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("{0}")]
    Invalid(String),

    #[error("api key not found: {0}")]
    NotFound(Uuid),

    #[error("lock poisoned")]
    Lock,
}

/// One stored credential, with the secret reduced to its display mask.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySummary {
    /// Record identifier
    pub id: Uuid,
    /// Canonical provider name
    pub provider: String,
    /// User-chosen label
    pub name: String,
    /// API base URL this key is used against
    pub base_url: String,
    /// Masked secret for display
    pub mask: String,
    /// Where the key came from
    pub source: String,
    /// Whether this is the provider's active key
    pub is_active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Full store listing as the key-management UI consumes it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyListing {
    /// Active key id per provider
    pub active_by_provider: HashMap<String, Uuid>,
    /// Providers that currently hold at least one key, sorted
    pub providers: Vec<String>,
    /// All stored keys in insertion order
    pub keys: Vec<KeySummary>,
}

/// Decrypted credential handed to the remote client at submit time.
#[derive(Debug, Clone)]
pub struct ActiveKey {
    /// Canonical provider name
    pub provider: String,
    /// Plaintext secret
    pub secret: String,
    /// API base URL for this key
    pub base_url: String,
}

struct KeyRow {
    id: Uuid,
    provider: String,
    name: String,
    base_url: String,
    secret: String,
    source: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

/// SQLite-backed credential store.
///
/// Thread-safe via an internal `Mutex<Connection>`; operations here are
/// short single-statement transactions.
pub struct Keystore {
    conn: Mutex<Connection>,
    cipher: SecretCipher,
    api_host: String,
}

impl Keystore {
    /// Open (or create) the store at `{data_dir}/studio.db`.
    pub fn open(data_dir: &Path, cipher: SecretCipher, api_host: String) -> Result<Self, KeystoreError> {
        std::fs::create_dir_all(data_dir).map_err(|e| KeystoreError::Io(e.to_string()))?;
        let conn = Connection::open(data_dir.join(DB_FILENAME))?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
            api_host,
        })
    }

    /// In-memory store for tests.
    #[cfg(test)]
    pub fn open_in_memory(cipher: SecretCipher, api_host: &str) -> Result<Self, KeystoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
            api_host: api_host.to_string(),
        })
    }

    /// Store a new key and make it the provider's active key.
    ///
    /// The provider name is normalized, an empty base URL is replaced by the
    /// provider default where one exists, and a key that matches an existing
    /// (provider, secret) pair is rejected.
    pub fn add_key(
        &self,
        provider: &str,
        secret: &str,
        name: &str,
        base_url: &str,
    ) -> Result<KeyListing, KeystoreError> {
        let provider = normalize_provider(provider);
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(KeystoreError::Invalid("api key must not be empty".to_string()));
        }

        let base_url = match base_url.trim() {
            "" => default_base_url(&provider, &self.api_host).unwrap_or_default(),
            explicit => explicit.to_string(),
        };

        let mut conn = self.conn.lock().map_err(|_| KeystoreError::Lock)?;
        let tx = conn.transaction()?;

        // Duplicate check runs over revealed secrets; rows that no longer
        // decrypt (rotated passphrase) cannot match and are skipped.
        {
            let mut stmt = tx.prepare("SELECT secret FROM api_keys WHERE provider = ?1")?;
            let stored: Vec<String> = stmt
                .query_map(params![provider], |row| row.get(0))?
                .collect::<Result<_, _>>()?;
            for value in stored {
                match self.cipher.reveal(&value) {
                    Ok(existing) if existing == secret => {
                        return Err(KeystoreError::Invalid("api key already exists".to_string()));
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Skipping undecryptable key during duplicate check: {}", e),
                }
            }
        }

        let id = Uuid::new_v4();
        let protected = self.cipher.protect(secret)?;
        tx.execute(
            "UPDATE api_keys SET is_active = 0 WHERE provider = ?1",
            params![provider],
        )?;
        tx.execute(
            "INSERT INTO api_keys (id, provider, name, base_url, secret, source, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'custom', 1, ?6)",
            params![
                id.to_string(),
                provider,
                name.trim(),
                base_url,
                protected,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        drop(conn);

        self.list()
    }

    /// Delete a key. If it was the provider's active key, the first
    /// remaining key for that provider is promoted.
    pub fn delete_key(&self, id: Uuid) -> Result<KeyListing, KeystoreError> {
        let mut conn = self.conn.lock().map_err(|_| KeystoreError::Lock)?;
        let tx = conn.transaction()?;

        let row: Option<(String, bool)> = tx
            .query_row(
                "SELECT provider, is_active FROM api_keys WHERE id = ?1",
                params![id.to_string()],
                |row| Ok((row.get(0)?, row.get::<_, i64>(1)? != 0)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        let (provider, was_active) = row.ok_or(KeystoreError::NotFound(id))?;

        tx.execute("DELETE FROM api_keys WHERE id = ?1", params![id.to_string()])?;
        if was_active {
            tx.execute(
                "UPDATE api_keys SET is_active = 1 WHERE id = (
                     SELECT id FROM api_keys WHERE provider = ?1 ORDER BY rowid ASC LIMIT 1
                 )",
                params![provider],
            )?;
        }
        tx.commit()?;
        drop(conn);

        self.list()
    }

    /// Make a key the active one for its provider.
    pub fn activate_key(&self, id: Uuid) -> Result<KeyListing, KeystoreError> {
        let mut conn = self.conn.lock().map_err(|_| KeystoreError::Lock)?;
        let tx = conn.transaction()?;

        let provider: Option<String> = tx
            .query_row(
                "SELECT provider FROM api_keys WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        let provider = provider.ok_or(KeystoreError::NotFound(id))?;

        tx.execute(
            "UPDATE api_keys SET is_active = 0 WHERE provider = ?1",
            params![provider],
        )?;
        tx.execute(
            "UPDATE api_keys SET is_active = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        tx.commit()?;
        drop(conn);

        self.list()
    }

    /// Everything the key-management UI needs, secrets masked.
    pub fn list(&self) -> Result<KeyListing, KeystoreError> {
        let rows = self.all_rows()?;

        let mut active_by_provider = HashMap::new();
        let mut providers: Vec<String> = Vec::new();
        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            if row.is_active {
                active_by_provider.insert(row.provider.clone(), row.id);
            }
            if !providers.contains(&row.provider) {
                providers.push(row.provider.clone());
            }
            let mask = match self.cipher.reveal(&row.secret) {
                Ok(plain) => mask_secret(&plain),
                Err(_) => mask_secret(""),
            };
            keys.push(KeySummary {
                id: row.id,
                provider: row.provider,
                name: row.name,
                base_url: row.base_url,
                mask,
                source: row.source,
                is_active: row.is_active,
                created_at: row.created_at,
            });
        }
        providers.sort();

        Ok(KeyListing {
            active_by_provider,
            providers,
            keys,
        })
    }

    /// The provider's active credential with its secret revealed, if any.
    pub fn active_key(&self, provider: &str) -> Result<Option<ActiveKey>, KeystoreError> {
        let provider = normalize_provider(provider);
        let conn = self.conn.lock().map_err(|_| KeystoreError::Lock)?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT secret, base_url FROM api_keys WHERE provider = ?1 AND is_active = 1",
                params![provider],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        drop(conn);

        match row {
            Some((secret, base_url)) => Ok(Some(ActiveKey {
                secret: self.cipher.reveal(&secret)?,
                base_url,
                provider,
            })),
            None => Ok(None),
        }
    }

    /// Providers that currently hold an active key.
    pub fn active_providers(&self) -> Result<Vec<String>, KeystoreError> {
        let conn = self.conn.lock().map_err(|_| KeystoreError::Lock)?;
        let mut stmt =
            conn.prepare("SELECT provider FROM api_keys WHERE is_active = 1 ORDER BY provider")?;
        let providers = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(providers)
    }

    fn all_rows(&self) -> Result<Vec<KeyRow>, KeystoreError> {
        let conn = self.conn.lock().map_err(|_| KeystoreError::Lock)?;
        let mut stmt = conn.prepare(
            "SELECT id, provider, name, base_url, secret, source, is_active, created_at
             FROM api_keys ORDER BY rowid ASC",
        )?;
        let rows = stmt
            .query_map([], row_to_key)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn row_to_key(row: &rusqlite::Row<'_>) -> rusqlite::Result<KeyRow> {
    let id_raw: String = row.get(0)?;
    let id = Uuid::parse_str(&id_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let created_raw: String = row.get(7)?;
    Ok(KeyRow {
        id,
        provider: row.get(1)?,
        name: row.get(2)?,
        base_url: row.get(3)?,
        secret: row.get(4)?,
        source: row.get(5)?,
        is_active: row.get::<_, i64>(6)? != 0,
        created_at: created_raw.parse().unwrap_or(DateTime::UNIX_EPOCH),
    })
}
