//! SQLite-backed signature store.
//!
//! One row per (login, CLA version). Logins compare case-insensitively, as
//! GitHub logins do. The reconciler only reads; rows are written by the
//! signing flow through [`SqliteSignatureStore::record_signature`].

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use cla_core::{SignatureStore, StoreError, UserSignature};

fn storage_error(operation: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::new(format!("{}: {}", operation, e))
}

/// Runs synchronous rusqlite calls on the blocking pool.
pub struct SqliteSignatureStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSignatureStore {
    /// Opens (creating if needed) the database at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    storage_error("create database directory", format!("{}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open(path_ref).map_err(|e| storage_error("open database", e))?;
        conn.busy_timeout(std::time::Duration::from_millis(5000))
            .map_err(|e| storage_error("set busy_timeout", e))?;

        Self::with_connection(conn)
    }

    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| storage_error("open database", e))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS signatures (
                login TEXT NOT NULL COLLATE NOCASE,
                email TEXT,
                given_name TEXT,
                cla_version TEXT NOT NULL,
                signed_at TEXT NOT NULL,
                PRIMARY KEY (login, cla_version)
            );
            "#,
        )
        .map_err(|e| storage_error("create signatures table", e))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Stores a signature. Signing the same version again keeps the first
    /// record.
    pub async fn record_signature(&self, signature: &UserSignature) -> Result<(), StoreError> {
        let conn = self.conn.clone();
        let signature = signature.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO signatures (login, email, given_name, cla_version, signed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        signature.user.login,
                        signature.user.email,
                        signature.user.given_name,
                        signature.cla_version,
                        Utc::now().to_rfc3339(),
                    ],
                )
                .map_err(|e| storage_error("record signature", e))?;

            if inserted == 0 {
                debug!(
                    "{} already signed CLA version {}",
                    signature.user.login, signature.cla_version
                );
            } else {
                info!(
                    "Recorded CLA version {} signature for {}",
                    signature.cla_version, signature.user.login
                );
            }
            Ok(())
        })
        .await
        .map_err(|e| storage_error("record signature", e))?
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock()
        .map_err(|_| StoreError::new("database connection mutex poisoned"))
}

#[async_trait]
impl SignatureStore for SqliteSignatureStore {
    async fn has_author_signed(&self, login: &str, cla_version: &str) -> Result<bool, StoreError> {
        let conn = self.conn.clone();
        let login = login.to_string();
        let cla_version = cla_version.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM signatures WHERE login = ?1 AND cla_version = ?2",
                    params![login, cla_version],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| storage_error("look up signature", e))?;
            Ok(found.is_some())
        })
        .await
        .map_err(|e| storage_error("look up signature", e))?
    }
}
