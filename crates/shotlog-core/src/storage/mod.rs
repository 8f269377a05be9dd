mod config;
pub mod database;

pub use config::{
    ChallengeConfig, Config, DeliveryConfig, DisplayConfig, DrillConfig, TimerConfig,
};
pub use database::Database;

use std::path::PathBuf;

use uuid::Uuid;

use crate::error::DatabaseError;
use crate::session::{DedupKey, SessionRecord};

/// Returns the shotlog data directory, creating it if needed.
///
/// `SHOTLOG_DATA_DIR` overrides the location outright. Otherwise this is
/// `~/.config/shotlog[-dev]/`, with SHOTLOG_ENV=dev selecting the
/// development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var_os("SHOTLOG_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("SHOTLOG_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("shotlog-dev")
            } else {
                base_dir.join("shotlog")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Durable session storage as seen by the core.
///
/// Every call is its own transaction; callers sort results themselves.
pub trait SessionStore {
    fn insert(&self, record: &SessionRecord) -> Result<(), DatabaseError>;

    /// Apply a user edit. Only `makes` and `length` change; returns false if
    /// the session no longer exists.
    fn update(&self, record: &SessionRecord) -> Result<bool, DatabaseError>;

    fn delete(&self, id: Uuid) -> Result<bool, DatabaseError>;

    fn get(&self, id: Uuid) -> Result<Option<SessionRecord>, DatabaseError>;

    fn query_all(&self) -> Result<Vec<SessionRecord>, DatabaseError>;

    fn find_by_key(&self, key: &DedupKey) -> Result<Option<SessionRecord>, DatabaseError> {
        Ok(self
            .query_all()?
            .into_iter()
            .find(|record| record.dedup_key() == *key))
    }
}

impl<S: SessionStore + ?Sized> SessionStore for &S {
    fn insert(&self, record: &SessionRecord) -> Result<(), DatabaseError> {
        (**self).insert(record)
    }

    fn update(&self, record: &SessionRecord) -> Result<bool, DatabaseError> {
        (**self).update(record)
    }

    fn delete(&self, id: Uuid) -> Result<bool, DatabaseError> {
        (**self).delete(id)
    }

    fn get(&self, id: Uuid) -> Result<Option<SessionRecord>, DatabaseError> {
        (**self).get(id)
    }

    fn query_all(&self) -> Result<Vec<SessionRecord>, DatabaseError> {
        (**self).query_all()
    }

    fn find_by_key(&self, key: &DedupKey) -> Result<Option<SessionRecord>, DatabaseError> {
        (**self).find_by_key(key)
    }
}
