//! SQLite-backed [`KeyStore`].

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::store::KeyStore;
use crate::error::StoreError;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS derived_keys (
    uid TEXT PRIMARY KEY NOT NULL,
    record TEXT NOT NULL
)";

/// One connection guarded by a mutex (rusqlite `Connection` is `!Sync`).
pub struct SqliteKeyStore {
    conn: Mutex<Connection>,
}

impl SqliteKeyStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KeyStore for SqliteKeyStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT record FROM derived_keys WHERE uid = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT INTO derived_keys (uid, record) VALUES (?1, ?2)
             ON CONFLICT(uid) DO UPDATE SET record = excluded.record",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.conn
            .lock()
            .execute("DELETE FROM derived_keys WHERE uid = ?1", params![key])?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT uid FROM derived_keys ORDER BY uid")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_value() {
        let store = SqliteKeyStore::open_in_memory().unwrap();
        store.put("04A1B2C3", "{\"v\":1}").unwrap();
        store.put("04A1B2C3", "{\"v\":2}").unwrap();
        assert_eq!(store.get("04A1B2C3").unwrap().as_deref(), Some("{\"v\":2}"));
        assert_eq!(store.keys().unwrap(), vec!["04A1B2C3"]);
    }

    #[test]
    fn remove_and_missing_key() {
        let store = SqliteKeyStore::open_in_memory().unwrap();
        store.put("AA", "x").unwrap();
        store.remove("AA").unwrap();
        store.remove("never-there").unwrap();
        assert_eq!(store.get("AA").unwrap(), None);
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.db");
        {
            let store = SqliteKeyStore::open(&path).unwrap();
            store.put("CAFEBABE", "record").unwrap();
        }
        let reopened = SqliteKeyStore::open(&path).unwrap();
        assert_eq!(reopened.get("CAFEBABE").unwrap().as_deref(), Some("record"));
    }
}
