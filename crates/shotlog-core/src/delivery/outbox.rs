//! Durable holding area for payloads the platform queue would not accept.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::payload::{PayloadMap, KEY_ID};
use crate::error::OutboxError;

/// A payload waiting for the transport to come up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransfer {
    pub payload: PayloadMap,
    pub queued_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Payloads keyed by delivery id. Unbounded; entries leave only when the
/// transport accepts them.
pub struct Outbox {
    pending: HashMap<String, PendingTransfer>,
    /// Persistent queue file. `None` keeps the outbox in memory.
    outbox_file: Option<PathBuf>,
}

impl Outbox {
    pub fn new_with_path(path: PathBuf) -> Self {
        Self {
            pending: HashMap::new(),
            outbox_file: Some(path),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            pending: HashMap::new(),
            outbox_file: None,
        }
    }

    /// Add a payload, or bump the attempt count if it is already waiting.
    pub fn enqueue(&mut self, payload: PayloadMap, error: Option<String>) {
        let key = Self::key_for(&payload);
        let entry = self.pending.entry(key).or_insert_with(|| PendingTransfer {
            payload,
            queued_at: Utc::now(),
            attempts: 0,
            last_error: None,
        });
        entry.attempts += 1;
        entry.last_error = error;
    }

    /// Take every pending transfer, oldest first.
    pub fn drain(&mut self) -> Vec<PendingTransfer> {
        let mut drained: Vec<_> = self.pending.drain().map(|(_, t)| t).collect();
        drained.sort_by_key(|t| t.queued_at);
        drained
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Persist queue to disk. No-op for in-memory outboxes.
    pub fn persist(&self) -> Result<(), OutboxError> {
        let Some(path) = &self.outbox_file else {
            return Ok(());
        };
        let data = serde_json::to_string_pretty(&self.pending)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Load queue from disk, merging with anything already pending.
    pub fn load(&mut self) -> Result<(), OutboxError> {
        let Some(path) = &self.outbox_file else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(path)?;
        let loaded: HashMap<String, PendingTransfer> = serde_json::from_str(&content)?;
        for (key, transfer) in loaded {
            self.pending.entry(key).or_insert(transfer);
        }
        Ok(())
    }

    fn key_for(payload: &PayloadMap) -> String {
        match payload.get(KEY_ID).and_then(|v| v.as_str()) {
            Some(id) => id.to_string(),
            // Payloads without an id fall back to their full content.
            None => serde_json::Value::Object(payload.clone()).to_string(),
        }
    }
}
