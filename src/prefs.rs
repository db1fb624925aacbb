use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Result};

/// Small persisted key/value table for per-user UI preferences.
pub struct Preferences {
    conn: Connection,
}

impl Preferences {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Preferences { conn })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM preferences WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO preferences (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            (key, value),
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM preferences WHERE key = ?1", [key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_in_memory_prefs() -> Preferences {
        Preferences::in_memory().unwrap()
    }

    #[test]
    fn test_set_and_get() {
        let prefs = setup_in_memory_prefs();
        prefs.set("theme", "dark").unwrap();
        assert_eq!(prefs.get("theme").unwrap(), Some("dark".to_string()));
        prefs.set("theme", "light").unwrap();
        assert_eq!(prefs.get("theme").unwrap(), Some("light".to_string()));
    }

    #[test]
    fn test_get_missing_key() {
        let prefs = setup_in_memory_prefs();
        assert_eq!(prefs.get("nothing").unwrap(), None);
    }

    #[test]
    fn test_remove() {
        let prefs = setup_in_memory_prefs();
        prefs.set("name", "Ana").unwrap();
        prefs.remove("name").unwrap();
        prefs.remove("name").unwrap();
        assert_eq!(prefs.get("name").unwrap(), None);
    }

    #[test]
    fn test_values_persist_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.db");
        Preferences::open(&path).unwrap().set("name", "Ana").unwrap();
        let reopened = Preferences::open(&path).unwrap();
        assert_eq!(reopened.get("name").unwrap(), Some("Ana".to_string()));
    }
}
