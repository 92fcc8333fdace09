pub mod models;

use rusqlite::{params, Connection, Result};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Slot holding the serialized message list.
pub const HISTORY_SLOT: &str = "chat_messages";

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(app_dir: &Path) -> Result<Self> {
        if let Err(e) = std::fs::create_dir_all(app_dir) {
            tracing::warn!("Failed to create app dir {:?}: {}", app_dir, e);
        }
        let db_path = app_dir.join("doc-chat.db");
        Self::with_connection(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn migrate(&self) -> Result<()> {
        self.conn().execute_batch(
            "
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS slots (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // ── Slots ──

    pub fn load_slot(&self, name: &str) -> Result<Option<String>> {
        let result = self.conn().query_row(
            "SELECT value FROM slots WHERE name = ?1",
            params![name],
            |row| row.get(0),
        );
        match result {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn save_slot(&self, name: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO slots (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
            params![name, value],
        )?;
        Ok(())
    }

    pub fn remove_slot(&self, name: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM slots WHERE name = ?1", params![name])?;
        Ok(())
    }

    // ── Settings ──

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let result = self.conn().query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        );
        match result {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete_setting(&self, key: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_roundtrip_and_remove() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.load_slot(HISTORY_SLOT).unwrap(), None);

        db.save_slot(HISTORY_SLOT, "[1]").unwrap();
        db.save_slot(HISTORY_SLOT, "[1,2]").unwrap();
        assert_eq!(db.load_slot(HISTORY_SLOT).unwrap().as_deref(), Some("[1,2]"));

        db.remove_slot(HISTORY_SLOT).unwrap();
        assert_eq!(db.load_slot(HISTORY_SLOT).unwrap(), None);
    }

    #[test]
    fn test_settings() {
        let db = Database::open_in_memory().unwrap();
        db.set_setting("gemini_model", "a").unwrap();
        db.set_setting("gemini_model", "b").unwrap();
        assert_eq!(db.get_setting("gemini_model").unwrap().as_deref(), Some("b"));
        db.delete_setting("gemini_model").unwrap();
        assert_eq!(db.get_setting("gemini_model").unwrap(), None);
    }

    #[test]
    fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = Database::new(dir.path()).unwrap();
            db.save_slot(HISTORY_SLOT, "[]").unwrap();
        }
        let db = Database::new(dir.path()).unwrap();
        assert_eq!(db.load_slot(HISTORY_SLOT).unwrap().as_deref(), Some("[]"));
    }
}
