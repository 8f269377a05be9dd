//! Workout lifecycle adapter.
//!
//! Each `begin()` creates a slot with its own [`WorkoutId`] and a task that
//! walks the slot through its lifecycle:
//!
//! ```text
//! NotStarted -> Authorizing -> Active -> Ending -> Committed | Discarded
//!                    \            |        ^
//!                     `-> Failed -+--------'
//! ```
//!
//! `Failed` means external tracking degraded; the slot still ends with exactly
//! one `Committed` or `Discarded` event once termination is requested.
//! Only one slot holds the backend at a time: a new slot waits for the previous
//! one to finish finalizing before it starts its activity.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use super::backend::{ActivityConfig, FinalizeIntent, WorkoutBackend};
use crate::error::WorkoutError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkoutId(pub u64);

impl fmt::Display for WorkoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "workout-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutPhase {
    NotStarted,
    Authorizing,
    Active,
    Ending,
    Committed,
    Discarded,
    Failed,
}

impl WorkoutPhase {
    fn is_ending_or_done(self) -> bool {
        matches!(
            self,
            WorkoutPhase::Ending | WorkoutPhase::Committed | WorkoutPhase::Discarded
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkoutEventKind {
    Started,
    Committed,
    Discarded,
    /// Advisory: tracking degraded, local recording continues.
    Failed(WorkoutError),
}

impl WorkoutEventKind {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkoutEventKind::Committed | WorkoutEventKind::Discarded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkoutEvent {
    pub workout: WorkoutId,
    pub kind: WorkoutEventKind,
}

/// The calls the session state machine makes on external tracking.
///
/// All three return immediately; outcomes arrive later as [`WorkoutEvent`]s.
pub trait WorkoutControl {
    fn begin(&mut self, duration: Option<Duration>) -> WorkoutId;

    /// Mark the current workout for rejection. Honoured until the backend
    /// starts finalizing, so callers issue it before `end()`.
    fn discard(&mut self);

    /// Request termination. No-op when nothing is active or already ending.
    fn end(&mut self);
}

struct SlotState {
    phase: WorkoutPhase,
    discard_requested: bool,
    /// Set once the intent has been handed to the backend; after this a
    /// discard can no longer change the outcome.
    finalizing: bool,
}

struct Slot {
    id: WorkoutId,
    state: Mutex<SlotState>,
    intent: watch::Sender<Option<FinalizeIntent>>,
}

impl Slot {
    fn new(id: WorkoutId) -> Self {
        let (intent, _) = watch::channel(None);
        Self {
            id,
            state: Mutex::new(SlotState {
                phase: WorkoutPhase::NotStarted,
                discard_requested: false,
                finalizing: false,
            }),
            intent,
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SlotState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    fn phase(&self) -> WorkoutPhase {
        self.with_state(|s| s.phase)
    }

    /// Move `from` -> `to` only if the slot is still in `from`.
    fn advance(&self, from: WorkoutPhase, to: WorkoutPhase) -> bool {
        self.with_state(|s| {
            if s.phase == from {
                s.phase = to;
                true
            } else {
                false
            }
        })
    }

    /// Allowed until finalization starts, including while `Ending`.
    fn request_discard(&self) {
        let flipped = self.with_state(|s| {
            if s.finalizing || matches!(s.phase, WorkoutPhase::Committed | WorkoutPhase::Discarded) {
                return false;
            }
            s.discard_requested = true;
            s.phase == WorkoutPhase::Ending
        });
        if flipped {
            self.intent.send_replace(Some(FinalizeIntent::Discard));
        }
    }

    /// Lock in the outcome the backend will be told about.
    fn begin_finalize(&self) -> FinalizeIntent {
        self.with_state(|s| {
            s.finalizing = true;
            if s.discard_requested {
                FinalizeIntent::Discard
            } else {
                FinalizeIntent::Commit
            }
        })
    }

    /// First caller wins; everyone after gets `None`.
    fn enter_ending(&self) -> Option<FinalizeIntent> {
        let intent = self.with_state(|s| {
            if s.phase.is_ending_or_done() {
                return None;
            }
            s.phase = WorkoutPhase::Ending;
            Some(if s.discard_requested {
                FinalizeIntent::Discard
            } else {
                FinalizeIntent::Commit
            })
        })?;
        self.intent.send_replace(Some(intent));
        Some(intent)
    }

    fn settle(&self, intent: FinalizeIntent) {
        self.with_state(|s| {
            s.phase = match intent {
                FinalizeIntent::Commit => WorkoutPhase::Committed,
                FinalizeIntent::Discard => WorkoutPhase::Discarded,
            }
        });
    }
}

/// Normalizes the host workout API into started / committed / discarded
/// (plus advisory failures) delivered on a channel.
pub struct WorkoutLifecycleAdapter {
    backend: Arc<dyn WorkoutBackend>,
    events: mpsc::UnboundedSender<WorkoutEvent>,
    lease: Arc<AsyncMutex<()>>,
    authorized: Arc<AtomicBool>,
    current: Option<Arc<Slot>>,
    next_id: u64,
}

impl WorkoutLifecycleAdapter {
    pub fn new(
        backend: Arc<dyn WorkoutBackend>,
    ) -> (Self, mpsc::UnboundedReceiver<WorkoutEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                backend,
                events,
                lease: Arc::new(AsyncMutex::new(())),
                authorized: Arc::new(AtomicBool::new(false)),
                current: None,
                next_id: 0,
            },
            rx,
        )
    }

    /// Phase of the most recently begun workout.
    pub fn phase(&self) -> Option<WorkoutPhase> {
        self.current.as_ref().map(|slot| slot.phase())
    }

    pub fn current_id(&self) -> Option<WorkoutId> {
        self.current.as_ref().map(|slot| slot.id)
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }
}

impl WorkoutControl for WorkoutLifecycleAdapter {
    fn begin(&mut self, duration: Option<Duration>) -> WorkoutId {
        if let Some(previous) = self.current.take() {
            if !previous.phase().is_ending_or_done() {
                warn!(workout = %previous.id, "new workout begun while previous still open, discarding it");
                previous.request_discard();
                previous.enter_ending();
            }
        }

        self.next_id += 1;
        let slot = Arc::new(Slot::new(WorkoutId(self.next_id)));
        let id = slot.id;
        self.current = Some(slot.clone());

        let run = WorkoutRun {
            backend: self.backend.clone(),
            events: self.events.clone(),
            lease: self.lease.clone(),
            authorized: self.authorized.clone(),
            slot,
            config: ActivityConfig {
                duration_secs: duration.map(|d| d.as_secs().min(u32::MAX as u64) as u32),
            },
            deadline: duration.map(|d| Instant::now() + d),
        };
        tokio::spawn(run.run());

        debug!(workout = %id, ?duration, "workout begun");
        id
    }

    fn discard(&mut self) {
        if let Some(slot) = &self.current {
            slot.request_discard();
        }
    }

    fn end(&mut self) {
        match &self.current {
            Some(slot) => {
                if slot.enter_ending().is_none() {
                    debug!(workout = %slot.id, "end() ignored, workout already ending");
                }
            }
            None => debug!("end() ignored, no workout active"),
        }
    }
}

struct WorkoutRun {
    backend: Arc<dyn WorkoutBackend>,
    events: mpsc::UnboundedSender<WorkoutEvent>,
    lease: Arc<AsyncMutex<()>>,
    authorized: Arc<AtomicBool>,
    slot: Arc<Slot>,
    config: ActivityConfig,
    deadline: Option<Instant>,
}

impl WorkoutRun {
    async fn run(self) {
        let _lease = self.lease.clone().lock_owned().await;

        self.slot
            .advance(WorkoutPhase::NotStarted, WorkoutPhase::Authorizing);
        let tracking = if self.slot.phase() == WorkoutPhase::Ending {
            false // terminated before it ever started
        } else {
            self.start_tracking().await
        };

        self.await_termination().await;
        let intent = self.slot.begin_finalize();

        if tracking {
            if let Err(e) = self.backend.finish_activity(intent).await {
                warn!(workout = %self.slot.id, error = %e, "failed to finalize workout");
                self.emit(WorkoutEventKind::Failed(e));
            }
        }

        self.slot.settle(intent);
        self.emit(match intent {
            FinalizeIntent::Commit => WorkoutEventKind::Committed,
            FinalizeIntent::Discard => WorkoutEventKind::Discarded,
        });
    }

    async fn start_tracking(&self) -> bool {
        if !self.authorized.load(Ordering::SeqCst) {
            match self.backend.request_authorization().await {
                Ok(true) => self.authorized.store(true, Ordering::SeqCst),
                Ok(false) => {
                    self.degrade(WorkoutError::AuthorizationDenied);
                    return false;
                }
                Err(e) => {
                    self.degrade(e);
                    return false;
                }
            }
        }

        match self.backend.start_activity(&self.config).await {
            Ok(()) => {
                self.slot
                    .advance(WorkoutPhase::Authorizing, WorkoutPhase::Active);
                self.emit(WorkoutEventKind::Started);
                true
            }
            Err(e) => {
                self.degrade(e);
                false
            }
        }
    }

    fn degrade(&self, error: WorkoutError) {
        warn!(workout = %self.slot.id, error = %error, "workout tracking unavailable, continuing locally");
        self.slot
            .advance(WorkoutPhase::Authorizing, WorkoutPhase::Failed);
        self.emit(WorkoutEventKind::Failed(error));
    }

    /// Wait for `end()` or the auto-end deadline, whichever comes first.
    async fn await_termination(&self) {
        let mut intent_rx = self.slot.intent.subscribe();
        let deadline = self.deadline;
        let timeout = async move {
            match deadline {
                Some(at) => time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(timeout);
        let mut timed_out = false;

        loop {
            if intent_rx.borrow_and_update().is_some() {
                return;
            }
            tokio::select! {
                changed = intent_rx.changed() => {
                    if changed.is_err() {
                        // Sender lives in the slot we hold; unreachable in practice.
                        return;
                    }
                }
                _ = &mut timeout, if !timed_out => {
                    timed_out = true;
                    if self.slot.enter_ending().is_some() {
                        debug!(workout = %self.slot.id, "workout duration elapsed, ending");
                        return;
                    }
                }
            }
        }
    }

    fn emit(&self, kind: WorkoutEventKind) {
        let _ = self.events.send(WorkoutEvent {
            workout: self.slot.id,
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[derive(Default)]
    struct ScriptedBackend {
        deny: bool,
        fail_start: bool,
        auth_delay: Duration,
        finish_delay: Duration,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WorkoutBackend for ScriptedBackend {
        async fn request_authorization(&self) -> Result<bool, WorkoutError> {
            time::sleep(self.auth_delay).await;
            self.calls.lock().unwrap().push("authorize".into());
            Ok(!self.deny)
        }

        async fn start_activity(&self, _config: &ActivityConfig) -> Result<(), WorkoutError> {
            self.calls.lock().unwrap().push("start".into());
            if self.fail_start {
                return Err(WorkoutError::SessionFailed("no sensors".into()));
            }
            Ok(())
        }

        async fn finish_activity(&self, intent: FinalizeIntent) -> Result<(), WorkoutError> {
            time::sleep(self.finish_delay).await;
            self.calls.lock().unwrap().push(format!("finish:{intent:?}"));
            Ok(())
        }
    }

    async fn collect_until_terminal(
        rx: &mut mpsc::UnboundedReceiver<WorkoutEvent>,
        id: WorkoutId,
    ) -> Vec<WorkoutEventKind> {
        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            if event.workout != id {
                continue;
            }
            let terminal = event.kind.is_terminal();
            kinds.push(event.kind);
            if terminal {
                break;
            }
        }
        kinds
    }

    #[tokio::test(start_paused = true)]
    async fn end_commits_exactly_once() {
        let backend = Arc::new(ScriptedBackend::default());
        let (mut adapter, mut rx) = WorkoutLifecycleAdapter::new(backend.clone());

        let id = adapter.begin(None);
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(adapter.phase(), Some(WorkoutPhase::Active));

        adapter.end();
        adapter.end();
        let kinds = collect_until_terminal(&mut rx, id).await;
        assert_eq!(kinds, vec![WorkoutEventKind::Started, WorkoutEventKind::Committed]);

        adapter.end();
        time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(adapter.phase(), Some(WorkoutPhase::Committed));
        assert_eq!(backend.calls(), vec!["authorize", "start", "finish:Commit"]);
    }

    #[tokio::test(start_paused = true)]
    async fn discard_before_end_rejects_the_workout() {
        let backend = Arc::new(ScriptedBackend::default());
        let (mut adapter, mut rx) = WorkoutLifecycleAdapter::new(backend.clone());

        let id = adapter.begin(None);
        time::sleep(Duration::from_millis(10)).await;
        adapter.discard();
        adapter.end();

        let kinds = collect_until_terminal(&mut rx, id).await;
        assert_eq!(kinds.last(), Some(&WorkoutEventKind::Discarded));
        assert!(!kinds.contains(&WorkoutEventKind::Committed));
        assert_eq!(backend.calls().last().unwrap(), "finish:Discard");
    }

    #[tokio::test(start_paused = true)]
    async fn denied_authorization_degrades_but_still_resolves() {
        let backend = Arc::new(ScriptedBackend {
            deny: true,
            ..Default::default()
        });
        let (mut adapter, mut rx) = WorkoutLifecycleAdapter::new(backend.clone());

        let id = adapter.begin(None);
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(adapter.phase(), Some(WorkoutPhase::Failed));
        adapter.end();

        let kinds = collect_until_terminal(&mut rx, id).await;
        assert_eq!(
            kinds,
            vec![
                WorkoutEventKind::Failed(WorkoutError::AuthorizationDenied),
                WorkoutEventKind::Committed,
            ]
        );
        assert!(!adapter.is_authorized());
        assert_eq!(backend.calls(), vec!["authorize"]);
    }

    #[tokio::test(start_paused = true)]
    async fn start_failure_is_advisory() {
        let backend = Arc::new(ScriptedBackend {
            fail_start: true,
            ..Default::default()
        });
        let (mut adapter, mut rx) = WorkoutLifecycleAdapter::new(backend.clone());

        let id = adapter.begin(None);
        adapter.end();
        let kinds = collect_until_terminal(&mut rx, id).await;

        assert!(matches!(kinds[0], WorkoutEventKind::Failed(WorkoutError::SessionFailed(_))));
        assert_eq!(kinds[1], WorkoutEventKind::Committed);
        assert!(!backend.calls().iter().any(|c| c.starts_with("finish")));
    }

    #[tokio::test(start_paused = true)]
    async fn duration_auto_ends_independently() {
        let backend = Arc::new(ScriptedBackend::default());
        let (mut adapter, mut rx) = WorkoutLifecycleAdapter::new(backend.clone());

        let started = Instant::now();
        let id = adapter.begin(Some(Duration::from_secs(60)));
        let kinds = collect_until_terminal(&mut rx, id).await;

        assert_eq!(kinds.last(), Some(&WorkoutEventKind::Committed));
        assert_eq!(started.elapsed(), Duration::from_secs(60));

        adapter.end();
        time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn end_while_authorizing_skips_the_activity() {
        let backend = Arc::new(ScriptedBackend {
            auth_delay: Duration::from_secs(3),
            ..Default::default()
        });
        let (mut adapter, mut rx) = WorkoutLifecycleAdapter::new(backend.clone());

        let id = adapter.begin(None);
        adapter.end();
        let kinds = collect_until_terminal(&mut rx, id).await;

        assert_eq!(kinds, vec![WorkoutEventKind::Committed]);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn next_workout_waits_for_previous_finalize() {
        let backend = Arc::new(ScriptedBackend {
            finish_delay: Duration::from_secs(2),
            ..Default::default()
        });
        let (mut adapter, mut rx) = WorkoutLifecycleAdapter::new(backend.clone());

        let first = adapter.begin(None);
        time::sleep(Duration::from_millis(10)).await;
        adapter.discard();
        adapter.end();
        let second = adapter.begin(None);
        assert_ne!(first, second);

        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(
            backend.calls(),
            vec!["authorize", "start", "finish:Discard", "start"]
        );

        adapter.end();
        let mut terminals = Vec::new();
        while terminals.len() < 2 {
            let event = rx.recv().await.unwrap();
            if event.kind.is_terminal() {
                terminals.push((event.workout, event.kind));
            }
        }
        assert_eq!(
            terminals,
            vec![
                (first, WorkoutEventKind::Discarded),
                (second, WorkoutEventKind::Committed),
            ]
        );
    }
}
