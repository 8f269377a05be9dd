//! Session state machine.
//!
//! Owns the single in-flight recording on a device and is the only producer
//! of [`SessionRecord`]s from live recordings.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> Finishing -> Completed -> Idle
//!            \            \
//!             `------------`--> Discarded -> Idle
//! ```
//!
//! Like the tick source and the workout adapter, the machine never blocks:
//! callers feed it ticks, workout events and user input, and read back
//! [`Event`]s. Timing is always `now - started_at`.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::record::{SessionRecord, SessionType, ShotType};
use crate::error::SessionError;
use crate::events::Event;
use crate::timer::{Tick, TickSource, DEFAULT_TICK_INTERVAL};
use crate::workout::{WorkoutControl, WorkoutEvent, WorkoutEventKind, WorkoutId};

/// Stage policy for drills. Stages advance on an explicit UI signal, or
/// automatically once `makes_per_stage` makes land in the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrillPlan {
    pub stage_count: u32,
    #[serde(default)]
    pub makes_per_stage: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionMode {
    FreestyleCountUp,
    ChallengeCountDown { duration_secs: u32 },
    DrillStaged(DrillPlan),
}

impl SessionMode {
    pub fn session_type(&self) -> SessionType {
        match self {
            SessionMode::FreestyleCountUp => SessionType::Freestyle,
            SessionMode::ChallengeCountDown { .. } => SessionType::Challenge,
            SessionMode::DrillStaged(_) => SessionType::Drill,
        }
    }

    fn validate(&self) -> Result<(), SessionError> {
        match self {
            SessionMode::ChallengeCountDown { duration_secs: 0 } => Err(
                SessionError::InvalidMode("challenge duration must be greater than zero".into()),
            ),
            SessionMode::DrillStaged(plan) if plan.stage_count == 0 => Err(
                SessionError::InvalidMode("drill needs at least one stage".into()),
            ),
            SessionMode::DrillStaged(DrillPlan {
                makes_per_stage: Some(0),
                ..
            }) => Err(SessionError::InvalidMode(
                "makes per stage must be greater than zero".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// What the clock face shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "secs", rename_all = "snake_case")]
pub enum ClockReading {
    Elapsed(u32),
    Remaining(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Manual,
    CountdownExpired,
    DrillComplete,
}

/// An in-progress recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub mode: SessionMode,
    pub shot_type: ShotType,
    pub started_at: DateTime<Utc>,
    pub makes: u32,
    pub stages_completed: u32,
    pub stage_makes: u32,
    pub workout: WorkoutId,
    /// External tracking already delivered its terminal event.
    #[serde(skip)]
    workout_resolved: bool,
}

impl Recording {
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u32 {
        let secs = (now - self.started_at).num_seconds().max(0);
        secs.min(u32::MAX as i64) as u32
    }

    pub fn reading(&self, now: DateTime<Utc>) -> ClockReading {
        let elapsed = self.elapsed_secs(now);
        match self.mode {
            SessionMode::ChallengeCountDown { duration_secs } => {
                ClockReading::Remaining(duration_secs.saturating_sub(elapsed))
            }
            _ => ClockReading::Elapsed(elapsed),
        }
    }

    /// Stored length if the recording stopped at `now`.
    fn length_at(&self, now: DateTime<Utc>) -> u32 {
        match self.mode {
            SessionMode::ChallengeCountDown { duration_secs } => duration_secs,
            _ => self.elapsed_secs(now),
        }
    }

    fn into_record(self, length: u32) -> SessionRecord {
        SessionRecord::new(
            self.started_at,
            self.makes,
            length,
            self.shot_type,
            self.mode.session_type(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running(Recording),
    Finishing {
        recording: Recording,
        length: u32,
        reason: FinishReason,
    },
    Completed(SessionRecord),
    Discarded,
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::Running(_) => SessionPhase::Running,
            SessionState::Finishing { .. } => SessionPhase::Finishing,
            SessionState::Completed(_) => SessionPhase::Completed,
            SessionState::Discarded => SessionPhase::Discarded,
        }
    }

    pub fn recording(&self) -> Option<&Recording> {
        match self {
            SessionState::Running(recording) | SessionState::Finishing { recording, .. } => {
                Some(recording)
            }
            _ => None,
        }
    }
}

/// Tag-only view of [`SessionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Running,
    Finishing,
    Completed,
    Discarded,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Running => "running",
            SessionPhase::Finishing => "finishing",
            SessionPhase::Completed => "completed",
            SessionPhase::Discarded => "discarded",
        })
    }
}

/// Terminal result handed back by [`SessionStateMachine::take_outcome`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed(SessionRecord),
    Discarded,
}

pub struct SessionStateMachine<W, T> {
    state: SessionState,
    workout: W,
    timer: T,
    tick_interval: Duration,
}

impl<W: WorkoutControl, T: TickSource> SessionStateMachine<W, T> {
    pub fn new(workout: W, timer: T) -> Self {
        Self::with_tick_interval(workout, timer, DEFAULT_TICK_INTERVAL)
    }

    pub fn with_tick_interval(workout: W, timer: T, tick_interval: Duration) -> Self {
        Self {
            state: SessionState::Idle,
            workout,
            timer,
            tick_interval,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn workout(&self) -> &W {
        &self.workout
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin a recording. Rejected unless the machine is `Idle`.
    pub fn start_session(
        &mut self,
        mode: SessionMode,
        shot_type: ShotType,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, SessionError> {
        if self.phase() != SessionPhase::Idle {
            return Err(SessionError::AlreadyActive(self.phase()));
        }
        mode.validate()?;

        let duration = match mode {
            SessionMode::ChallengeCountDown { duration_secs } => {
                Some(Duration::from_secs(duration_secs as u64))
            }
            _ => None,
        };

        self.timer.start(self.tick_interval);
        let workout = self.workout.begin(duration);
        self.state = SessionState::Running(Recording {
            mode,
            shot_type,
            started_at: now,
            makes: 0,
            stages_completed: 0,
            stage_makes: 0,
            workout,
            workout_resolved: false,
        });
        debug!(%workout, ?mode, %shot_type, "session started");

        Ok(vec![Event::SessionStarted {
            mode,
            shot_type,
            at: now,
        }])
    }

    /// Count one make. Ignored unless `Running`.
    pub fn score_attempt(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let SessionState::Running(recording) = &mut self.state else {
            debug!(phase = %self.state.phase(), "score ignored, not recording");
            return Vec::new();
        };

        recording.makes += 1;
        recording.stage_makes += 1;
        let mut events = vec![Event::AttemptScored {
            makes: recording.makes,
            at: now,
        }];

        if let SessionMode::DrillStaged(DrillPlan {
            makes_per_stage: Some(target),
            ..
        }) = recording.mode
        {
            if recording.stage_makes >= target {
                events.extend(self.complete_stage(now));
            }
        }
        events
    }

    /// UI signal that the current drill stage is done. Ignored outside drills.
    pub fn complete_stage(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let SessionState::Running(recording) = &mut self.state else {
            return Vec::new();
        };
        let SessionMode::DrillStaged(plan) = recording.mode else {
            debug!("stage completion ignored outside drill mode");
            return Vec::new();
        };

        recording.stages_completed += 1;
        recording.stage_makes = 0;
        let mut events = vec![Event::StageAdvanced {
            stages_completed: recording.stages_completed,
            stage_count: plan.stage_count,
            at: now,
        }];

        if recording.stages_completed >= plan.stage_count {
            events.extend(self.enter_finishing(FinishReason::DrillComplete, now));
        }
        events
    }

    /// Manual finish. A no-op once the recording has left `Running`.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        self.enter_finishing(FinishReason::Manual, now)
    }

    /// Quit without saving.
    ///
    /// Leaves `Running`/`Finishing` immediately; the workout is told to
    /// discard before it is told to end, and its terminal event is not awaited.
    pub fn abandon(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        if !matches!(self.phase(), SessionPhase::Running | SessionPhase::Finishing) {
            return Vec::new();
        }

        self.timer.stop();
        self.workout.discard();
        self.workout.end();
        self.state = SessionState::Discarded;
        debug!("session abandoned");

        vec![Event::SessionDiscarded { at: now }]
    }

    /// Feed a tick from the tick source.
    pub fn tick(&mut self, tick: &Tick, now: DateTime<Utc>) -> Vec<Event> {
        if !self.timer.is_current(tick) {
            debug!(generation = tick.generation, seq = tick.seq, "stale tick dropped");
            return Vec::new();
        }
        let SessionState::Running(recording) = &self.state else {
            return Vec::new();
        };

        let reading = recording.reading(now);
        let mut events = vec![Event::ClockTicked { reading, at: now }];
        if reading == ClockReading::Remaining(0) {
            events.extend(self.enter_finishing(FinishReason::CountdownExpired, now));
        }
        events
    }

    /// Feed an event from the workout adapter.
    pub fn handle_workout(&mut self, event: &WorkoutEvent, now: DateTime<Utc>) -> Vec<Event> {
        let current = self.state.recording().map(|r| r.workout);
        if current != Some(event.workout) {
            debug!(workout = %event.workout, kind = ?event.kind, "workout event for a session no longer tracked");
            return Vec::new();
        }

        match &event.kind {
            WorkoutEventKind::Started => vec![Event::WorkoutStarted { at: now }],
            WorkoutEventKind::Failed(error) => vec![Event::WorkoutDegraded {
                reason: error.to_string(),
                at: now,
            }],
            WorkoutEventKind::Committed | WorkoutEventKind::Discarded => {
                if event.kind == WorkoutEventKind::Discarded {
                    warn!(workout = %event.workout, "workout discarded externally, keeping local recording");
                }
                self.resolve_workout(now)
            }
        }
    }

    /// Hand back a terminal result and return to `Idle`.
    pub fn take_outcome(&mut self) -> Option<SessionOutcome> {
        match self.phase() {
            SessionPhase::Completed | SessionPhase::Discarded => {}
            _ => return None,
        }
        match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Completed(record) => Some(SessionOutcome::Completed(record)),
            _ => Some(SessionOutcome::Discarded),
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// `Running -> Finishing`, entered at most once per session.
    fn enter_finishing(&mut self, reason: FinishReason, now: DateTime<Utc>) -> Vec<Event> {
        let recording = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Running(recording) => recording,
            other => {
                debug!(?reason, phase = %other.phase(), "finish ignored");
                self.state = other;
                return Vec::new();
            }
        };

        self.timer.stop();
        let length = recording.length_at(now);
        let resolved = recording.workout_resolved;
        self.state = SessionState::Finishing {
            recording,
            length,
            reason,
        };

        let mut events = vec![Event::SessionFinishing {
            reason,
            length,
            at: now,
        }];
        if resolved {
            events.extend(self.complete(now));
        } else {
            self.workout.end();
        }
        events
    }

    fn resolve_workout(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        match &mut self.state {
            SessionState::Finishing { .. } => self.complete(now),
            SessionState::Running(recording) => {
                recording.workout_resolved = true;
                if matches!(recording.mode, SessionMode::ChallengeCountDown { .. }) {
                    // The adapter's own duration timer beat our tick.
                    self.enter_finishing(FinishReason::CountdownExpired, now)
                } else {
                    warn!(workout = %recording.workout, "workout ended before the session finished");
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }

    fn complete(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let (recording, length) = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Finishing {
                recording, length, ..
            } => (recording, length),
            other => {
                self.state = other;
                return Vec::new();
            }
        };

        let record = recording.into_record(length);
        debug!(session_id = %record.id, makes = record.makes, length = record.length, "session completed");
        self.state = SessionState::Completed(record.clone());
        vec![Event::SessionCompleted { record, at: now }]
    }
}
