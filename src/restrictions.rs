//! Persistent restriction records, one per user.

use rusqlite::{Connection, OptionalExtension, params};
use serde::Deserialize;
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

/// Result of flipping a user's restriction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toggle {
    Restricted { reason: String },
    Unrestricted,
}

#[derive(Deserialize)]
struct LegacyRecord {
    reason: String,
}

/// Restriction store backed by SQLite.
///
/// All access goes through one connection mutex, so a toggle is a single
/// critical section: two concurrent toggles for the same user always
/// resolve to one restrict and one unrestrict.
pub struct RestrictionStore {
    conn: Mutex<Connection>,
}

impl RestrictionStore {
    /// Create a new in-memory store.
    pub fn new() -> Result<Self, String> {
        let conn = Connection::open_in_memory()
            .map_err(|e| format!("Failed to create in-memory store: {e}"))?;
        Self::with_connection(conn)
    }

    /// Open the store at `path`, importing `legacy_dir/<id>.json` records when
    /// the database did not exist yet.
    pub fn open(path: &Path, legacy_dir: Option<&Path>) -> Result<Self, String> {
        let db_exists = path.exists();
        let conn = Connection::open(path)
            .map_err(|e| format!("Failed to open restriction store {:?}: {e}", path))?;
        let store = Self::with_connection(conn)?;

        if !db_exists
            && let Some(dir) = legacy_dir
            && dir.is_dir()
        {
            info!("Importing legacy restriction records from {:?}", dir);
            match store.import_legacy(dir) {
                Ok(n) => info!("Imported {} restriction record(s)", n),
                Err(e) => warn!("Legacy import failed: {e}"),
            }
        }

        info!("Loaded restriction store from {:?} ({} record(s))", path, store.count()?);
        Ok(store)
    }

    fn with_connection(conn: Connection) -> Result<Self, String> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS restricted_users (
                user_id INTEGER PRIMARY KEY,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| format!("Failed to init schema: {e}"))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, String> {
        self.conn.lock().map_err(|_| "restriction store lock poisoned".to_string())
    }

    /// The stored reason, if the user is restricted.
    pub fn reason(&self, user_id: u64) -> Result<Option<String>, String> {
        let conn = self.lock()?;
        select_reason(&conn, user_id)
    }

    pub fn put(&self, user_id: u64, reason: &str) -> Result<(), String> {
        let conn = self.lock()?;
        insert(&conn, user_id, reason)
    }

    #[cfg(test)]
    pub fn exists(&self, user_id: u64) -> Result<bool, String> {
        let conn = self.lock()?;
        exists(&conn, user_id)
    }

    #[cfg(test)]
    pub fn delete(&self, user_id: u64) -> Result<bool, String> {
        let conn = self.lock()?;
        remove(&conn, user_id)
    }

    /// Drops the table so every later query fails.
    #[cfg(test)]
    pub fn break_schema(&self) {
        self.lock()
            .unwrap()
            .execute_batch("DROP TABLE restricted_users;")
            .unwrap();
    }

    /// Delete the record if present, otherwise create it with `reason`.
    /// The check and the write share one transaction under the store lock.
    pub fn toggle(&self, user_id: u64, reason: &str) -> Result<Toggle, String> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| format!("Failed to begin transaction: {e}"))?;

        let outcome = if exists(&tx, user_id)? {
            remove(&tx, user_id)?;
            Toggle::Unrestricted
        } else {
            insert(&tx, user_id, reason)?;
            Toggle::Restricted {
                reason: reason.to_string(),
            }
        };

        tx.commit().map_err(|e| format!("Failed to commit: {e}"))?;
        Ok(outcome)
    }

    pub fn count(&self) -> Result<usize, String> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM restricted_users", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as usize)
        .map_err(|e| format!("Failed to count restrictions: {e}"))
    }

    fn import_legacy(&self, dir: &Path) -> Result<usize, String> {
        let entries = std::fs::read_dir(dir).map_err(|e| format!("Failed to read {:?}: {e}", dir))?;
        let mut imported = 0;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(user_id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            else {
                warn!("Skipping legacy record with non-numeric name: {:?}", path);
                continue;
            };

            let record: LegacyRecord = match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()))
            {
                Ok(r) => r,
                Err(e) => {
                    warn!("Skipping unreadable legacy record {:?}: {e}", path);
                    continue;
                }
            };

            self.put(user_id, &record.reason)?;
            imported += 1;
        }

        Ok(imported)
    }
}

fn select_reason(conn: &Connection, user_id: u64) -> Result<Option<String>, String> {
    conn.query_row(
        "SELECT reason FROM restricted_users WHERE user_id = ?1",
        params![user_id as i64],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| format!("Failed to read restriction: {e}"))
}

fn exists(conn: &Connection, user_id: u64) -> Result<bool, String> {
    Ok(select_reason(conn, user_id)?.is_some())
}

fn remove(conn: &Connection, user_id: u64) -> Result<bool, String> {
    conn.execute(
        "DELETE FROM restricted_users WHERE user_id = ?1",
        params![user_id as i64],
    )
    .map(|n| n > 0)
    .map_err(|e| format!("Failed to delete restriction: {e}"))
}

fn insert(conn: &Connection, user_id: u64, reason: &str) -> Result<(), String> {
    conn.execute(
        "INSERT OR REPLACE INTO restricted_users (user_id, reason, created_at) VALUES (?1, ?2, ?3)",
        params![user_id as i64, reason, chrono::Utc::now().to_rfc3339()],
    )
    .map(|_| ())
    .map_err(|e| format!("Failed to store restriction: {e}"))
}
