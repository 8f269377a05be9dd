use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::WorkoutError;

/// What the external subsystem should do with a session when it is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalizeIntent {
    Commit,
    Discard,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityConfig {
    /// Planned length for fixed-duration sessions.
    pub duration_secs: Option<u32>,
}

/// The host platform's activity-tracking API.
///
/// Implementations talk to the real subsystem; the adapter normalizes their
/// results into a single lifecycle.
#[async_trait]
pub trait WorkoutBackend: Send + Sync {
    /// Ask the user for permission. `Ok(false)` means denied.
    async fn request_authorization(&self) -> Result<bool, WorkoutError>;

    async fn start_activity(&self, config: &ActivityConfig) -> Result<(), WorkoutError>;

    /// Save or throw away the activity started by `start_activity`.
    async fn finish_activity(&self, intent: FinalizeIntent) -> Result<(), WorkoutError>;
}

/// Backend for devices without workout tracking. Every call fails, so the
/// adapter always runs in local-only mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableBackend;

#[async_trait]
impl WorkoutBackend for UnavailableBackend {
    async fn request_authorization(&self) -> Result<bool, WorkoutError> {
        Err(WorkoutError::Unavailable)
    }

    async fn start_activity(&self, _config: &ActivityConfig) -> Result<(), WorkoutError> {
        Err(WorkoutError::Unavailable)
    }

    async fn finish_activity(&self, _intent: FinalizeIntent) -> Result<(), WorkoutError> {
        Err(WorkoutError::Unavailable)
    }
}
