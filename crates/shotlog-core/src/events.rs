use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{ClockReading, FinishReason, SessionMode, SessionRecord, ShotType};

/// Every state change in a recording produces an Event.
/// UI layers subscribe to them; nothing in the core depends on who listens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        mode: SessionMode,
        shot_type: ShotType,
        at: DateTime<Utc>,
    },
    AttemptScored {
        makes: u32,
        at: DateTime<Utc>,
    },
    /// Drill moved on to its next stage.
    StageAdvanced {
        stages_completed: u32,
        stage_count: u32,
        at: DateTime<Utc>,
    },
    ClockTicked {
        reading: ClockReading,
        at: DateTime<Utc>,
    },
    /// Recording stopped; waiting for external tracking to resolve.
    SessionFinishing {
        reason: FinishReason,
        length: u32,
        at: DateTime<Utc>,
    },
    SessionCompleted {
        record: SessionRecord,
        at: DateTime<Utc>,
    },
    SessionDiscarded {
        at: DateTime<Utc>,
    },
    WorkoutStarted {
        at: DateTime<Utc>,
    },
    /// External tracking failed; the recording carries on locally.
    WorkoutDegraded {
        reason: String,
        at: DateTime<Utc>,
    },
}
