//! Receiving side: validate, dedup, persist.

use tracing::{debug, warn};
use uuid::Uuid;

use super::payload::{self, PayloadMap};
use crate::error::CoreError;
use crate::session::SessionRecord;
use crate::storage::SessionStore;

#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveOutcome {
    Inserted(SessionRecord),
    /// Already stored; nothing written.
    Duplicate { id: Uuid },
}

pub struct SessionReceiver<S> {
    store: S,
    dedup: bool,
}

impl<S: SessionStore> SessionReceiver<S> {
    pub fn new(store: S) -> Self {
        Self { store, dedup: true }
    }

    /// Turn redelivery detection off. Every payload then becomes a new row.
    pub fn with_dedup(mut self, dedup: bool) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Accept one payload from the counterpart device.
    ///
    /// Malformed payloads are rejected with nothing persisted. Receipt is
    /// idempotent while dedup is on: the sender's id decides when present,
    /// otherwise the `(date, makes, length, shotType)` key does.
    pub fn receive(&self, payload: &PayloadMap) -> Result<ReceiveOutcome, CoreError> {
        let decoded = payload::decode(payload).map_err(|e| {
            warn!(error = %e, "rejected malformed session payload");
            e
        })?;
        let mut record = decoded.record;

        if self.dedup {
            let existing = if decoded.explicit_id {
                self.store.get(record.id)?
            } else {
                self.store.find_by_key(&record.dedup_key())?
            };
            if let Some(existing) = existing {
                debug!(session_id = %existing.id, "duplicate session delivery ignored");
                return Ok(ReceiveOutcome::Duplicate { id: existing.id });
            }
        } else if decoded.explicit_id {
            record.id = Uuid::new_v4();
        }

        self.store.insert(&record)?;
        debug!(session_id = %record.id, shot_type = %record.shot_type, makes = record.makes, "received session stored");
        Ok(ReceiveOutcome::Inserted(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PayloadError;
    use crate::session::{SessionType, ShotType};
    use crate::storage::Database;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    fn record() -> SessionRecord {
        let date = Utc.with_ymd_and_hms(2025, 6, 3, 18, 0, 0).unwrap();
        SessionRecord::new(date, 21, 600, ShotType::FreeThrows, SessionType::Freestyle)
    }

    fn legacy_payload() -> PayloadMap {
        match json!({
            "date": "2025-06-03T18:00:00Z",
            "makes": 21,
            "length": 600,
            "shotType": "freeThrows",
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn explicit_ids_are_kept_and_deduplicated() {
        let db = Database::open_in_memory().unwrap();
        let receiver = SessionReceiver::new(&db);
        let record = record();
        let payload = payload::encode(&record);

        assert_eq!(
            receiver.receive(&payload).unwrap(),
            ReceiveOutcome::Inserted(record.clone())
        );
        assert_eq!(
            receiver.receive(&payload).unwrap(),
            ReceiveOutcome::Duplicate { id: record.id }
        );
        assert_eq!(db.query_all().unwrap(), vec![record]);
    }

    #[test]
    fn id_less_payloads_dedup_on_content() {
        let db = Database::open_in_memory().unwrap();
        let receiver = SessionReceiver::new(&db);

        let first = receiver.receive(&legacy_payload()).unwrap();
        let ReceiveOutcome::Inserted(stored) = first else {
            panic!("expected insert, got {first:?}");
        };
        assert_eq!(
            receiver.receive(&legacy_payload()).unwrap(),
            ReceiveOutcome::Duplicate { id: stored.id }
        );
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn dedup_off_inserts_every_delivery() {
        let db = Database::open_in_memory().unwrap();
        let receiver = SessionReceiver::new(&db).with_dedup(false);
        let payload = payload::encode(&record());

        receiver.receive(&payload).unwrap();
        receiver.receive(&payload).unwrap();
        receiver.receive(&legacy_payload()).unwrap();
        assert_eq!(db.count().unwrap(), 3);
    }

    #[test]
    fn malformed_payload_persists_nothing() {
        let db = Database::open_in_memory().unwrap();
        let receiver = SessionReceiver::new(&db);
        let mut payload = legacy_payload();
        payload.remove("makes");

        let err = receiver.receive(&payload).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Payload(PayloadError::MissingField("makes"))
        ));
        assert_eq!(db.count().unwrap(), 0);
    }
}
