//! SQLite-based session storage.
//!
//! Provides persistent storage for:
//! - Recorded shooting sessions
//! - Key-value store for application state

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::session::{DedupKey, SessionRecord, SessionType, ShotType};

use super::{data_dir, SessionStore};

const SESSION_COLUMNS: &str = "id, date, makes, length, shot_type, session_type";

/// SQLite database for session storage.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data_dir>/shotlog.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let dir = data_dir().map_err(|e| DatabaseError::DataDir(e.to_string()))?;
        Self::open_at(dir.join("shotlog.db"))
    }

    /// Open (or create) a database file at an explicit path.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id           TEXT PRIMARY KEY,
                date         TEXT NOT NULL,
                date_secs    INTEGER NOT NULL,
                makes        INTEGER NOT NULL CHECK (makes >= 0),
                length       INTEGER NOT NULL CHECK (length >= 0),
                shot_type    TEXT NOT NULL,
                session_type TEXT NOT NULL DEFAULT 'freestyle'
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_date_secs ON sessions(date_secs);
            CREATE INDEX IF NOT EXISTS idx_sessions_dedup
                ON sessions(date_secs, makes, length, shot_type);",
        )?;
        Ok(())
    }

    fn row_to_record(row: &Row<'_>) -> Result<SessionRecord, DatabaseError> {
        let id: String = row.get(0)?;
        let corrupt = |message: String| DatabaseError::CorruptRow {
            id: id.clone(),
            message,
        };

        let parsed_id = Uuid::parse_str(&id).map_err(|e| corrupt(e.to_string()))?;
        let date: String = row.get(1)?;
        let date = DateTime::parse_from_rfc3339(&date)
            .map_err(|e| corrupt(format!("bad date '{date}': {e}")))?
            .with_timezone(&Utc);
        let shot_type: String = row.get(4)?;
        let session_type: String = row.get(5)?;

        Ok(SessionRecord {
            id: parsed_id,
            date,
            makes: row.get(2)?,
            length: row.get(3)?,
            shot_type: shot_type.parse::<ShotType>().map_err(corrupt)?,
            session_type: session_type.parse::<SessionType>().map_err(corrupt)?,
        })
    }

    fn query_records(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<SessionRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(Self::row_to_record(row)?);
        }
        Ok(records)
    }

    /// Number of stored sessions.
    pub fn count(&self) -> Result<u64, DatabaseError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

impl SessionStore for Database {
    fn insert(&self, record: &SessionRecord) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO sessions (id, date, date_secs, makes, length, shot_type, session_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id.to_string(),
                record.date.to_rfc3339(),
                record.date.timestamp(),
                record.makes,
                record.length,
                record.shot_type.as_str(),
                record.session_type.as_str(),
            ],
        )?;
        Ok(())
    }

    fn update(&self, record: &SessionRecord) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE sessions SET makes = ?2, length = ?3 WHERE id = ?1",
            params![record.id.to_string(), record.makes, record.length],
        )?;
        Ok(changed > 0)
    }

    fn delete(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let changed = self
            .conn
            .execute("DELETE FROM sessions WHERE id = ?1", params![id.to_string()])?;
        Ok(changed > 0)
    }

    fn get(&self, id: Uuid) -> Result<Option<SessionRecord>, DatabaseError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
        Ok(self
            .query_records(&sql, params![id.to_string()])?
            .into_iter()
            .next())
    }

    fn query_all(&self) -> Result<Vec<SessionRecord>, DatabaseError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions");
        self.query_records(&sql, [])
    }

    fn find_by_key(&self, key: &DedupKey) -> Result<Option<SessionRecord>, DatabaseError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE date_secs = ?1 AND makes = ?2 AND length = ?3 AND shot_type = ?4
             LIMIT 1"
        );
        Ok(self
            .query_records(
                &sql,
                params![key.date_secs, key.makes, key.length, key.shot_type.as_str()],
            )?
            .into_iter()
            .next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(makes: u32) -> SessionRecord {
        let date = Utc.with_ymd_and_hms(2025, 4, 2, 17, 30, 0).unwrap();
        SessionRecord::new(date, makes, 300, ShotType::FreeThrows, SessionType::Challenge)
    }

    #[test]
    fn insert_and_query() {
        let db = Database::open_in_memory().unwrap();
        let record = sample(14);
        db.insert(&record).unwrap();

        let all = db.query_all().unwrap();
        assert_eq!(all, vec![record.clone()]);
        assert_eq!(db.get(record.id).unwrap(), Some(record));
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let record = sample(3);
        db.insert(&record).unwrap();
        assert!(db.insert(&record).is_err());
    }

    #[test]
    fn update_changes_only_makes_and_length() {
        let db = Database::open_in_memory().unwrap();
        let record = sample(5);
        db.insert(&record).unwrap();

        let mut edited = record.clone();
        edited.makes = 9;
        edited.length = 420;
        edited.shot_type = ShotType::Deep;
        edited.date = Utc::now();
        assert!(db.update(&edited).unwrap());

        let stored = db.get(record.id).unwrap().unwrap();
        assert_eq!(stored.makes, 9);
        assert_eq!(stored.length, 420);
        assert_eq!(stored.shot_type, ShotType::FreeThrows);
        assert_eq!(stored.date, record.date);
    }

    #[test]
    fn update_and_delete_report_missing_rows() {
        let db = Database::open_in_memory().unwrap();
        let record = sample(1);
        assert!(!db.update(&record).unwrap());
        assert!(!db.delete(record.id).unwrap());

        db.insert(&record).unwrap();
        assert!(db.delete(record.id).unwrap());
        assert!(db.query_all().unwrap().is_empty());
    }

    #[test]
    fn find_by_key_matches_composite_identity() {
        let db = Database::open_in_memory().unwrap();
        let record = sample(7);
        db.insert(&record).unwrap();

        let twin = SessionRecord::new(
            record.date,
            7,
            300,
            ShotType::FreeThrows,
            SessionType::Freestyle,
        );
        let found = db.find_by_key(&twin.dedup_key()).unwrap();
        assert_eq!(found.map(|r| r.id), Some(record.id));

        let other = sample(8);
        assert!(db.find_by_key(&other.dedup_key()).unwrap().is_none());
    }

    #[test]
    fn corrupt_rows_are_reported() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute(
                "INSERT INTO sessions (id, date, date_secs, makes, length, shot_type, session_type)
                 VALUES ('not-a-uuid', '2025-01-01T00:00:00Z', 0, 1, 1, 'layups', 'drill')",
                [],
            )
            .unwrap();
        assert!(matches!(
            db.query_all(),
            Err(DatabaseError::CorruptRow { .. })
        ));
    }

    #[test]
    fn reopening_a_file_keeps_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shotlog.db");
        let record = sample(11);
        {
            let db = Database::open_at(&path).unwrap();
            db.insert(&record).unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.query_all().unwrap(), vec![record]);
    }

    #[test]
    fn kv_store() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
    }
}
