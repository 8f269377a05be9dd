//! Async driver for one device's recordings.
//!
//! Commands, timer ticks and workout events are multiplexed onto a single
//! task, so the state machine sees them strictly one at a time. Observers
//! read the latest [`SessionSnapshot`] from a `watch` channel and follow
//! [`Event`]s on a `broadcast` channel.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info};

use super::machine::{
    ClockReading, SessionMode, SessionOutcome, SessionPhase, SessionState, SessionStateMachine,
};
use super::record::ShotType;
use crate::delivery::DeliveryBridge;
use crate::error::{CoreError, SessionError};
use crate::events::Event;
use crate::storage::SessionStore;
use crate::timer::{Clock, Tick, TimerEngine};
use crate::workout::{WorkoutBackend, WorkoutEvent, WorkoutLifecycleAdapter};

const EVENT_CAPACITY: usize = 64;

/// Latest observable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Clock face value while recording.
    pub reading: Option<ClockReading>,
}

enum Command {
    Start {
        mode: SessionMode,
        shot_type: ShotType,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Score,
    CompleteStage,
    Finish,
    Abandon,
}

/// Cloneable front end to a running [`SessionRuntime`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<Event>,
}

impl SessionHandle {
    /// Start a recording. Fails if one is already in flight.
    pub async fn start(&self, mode: SessionMode, shot_type: ShotType) -> crate::Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start {
            mode,
            shot_type,
            reply,
        })?;
        rx.await.map_err(|_| runtime_gone())??;
        Ok(())
    }

    pub fn score(&self) -> crate::Result<()> {
        self.send(Command::Score)
    }

    pub fn complete_stage(&self) -> crate::Result<()> {
        self.send(Command::CompleteStage)
    }

    pub fn finish(&self) -> crate::Result<()> {
        self.send(Command::Finish)
    }

    pub fn abandon(&self) -> crate::Result<()> {
        self.send(Command::Abandon)
    }

    pub fn state(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    fn send(&self, command: Command) -> crate::Result<()> {
        self.commands.send(command).map_err(|_| runtime_gone())
    }
}

fn runtime_gone() -> CoreError {
    CoreError::Custom("session runtime has shut down".into())
}

pub struct SessionRuntime<S> {
    machine: SessionStateMachine<WorkoutLifecycleAdapter, TimerEngine>,
    ticks: mpsc::UnboundedReceiver<Tick>,
    workout_events: mpsc::UnboundedReceiver<WorkoutEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    clock: Arc<dyn Clock>,
    store: S,
    bridge: DeliveryBridge,
    state_tx: watch::Sender<SessionSnapshot>,
    events_tx: broadcast::Sender<Event>,
}

impl<S: SessionStore + Send + 'static> SessionRuntime<S> {
    pub fn new(
        backend: Arc<dyn WorkoutBackend>,
        clock: Arc<dyn Clock>,
        store: S,
        bridge: DeliveryBridge,
        tick_interval: Duration,
    ) -> (Self, SessionHandle) {
        let (timer, ticks) = TimerEngine::new();
        let (adapter, workout_events) = WorkoutLifecycleAdapter::new(backend);
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionSnapshot {
            state: SessionState::Idle,
            reading: None,
        });
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let handle = SessionHandle {
            commands: commands_tx,
            state: state_rx,
            events: events_tx.clone(),
        };
        let runtime = Self {
            machine: SessionStateMachine::with_tick_interval(adapter, timer, tick_interval),
            ticks,
            workout_events,
            commands,
            clock,
            store,
            bridge,
            state_tx,
            events_tx,
        };
        (runtime, handle)
    }

    /// Drive the machine until every handle is dropped.
    ///
    /// A recording still running at that point is abandoned; one already
    /// finishing is allowed to complete and is stored.
    pub async fn run(mut self) {
        let mut commands_open = true;
        loop {
            let events = tokio::select! {
                command = self.commands.recv(), if commands_open => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        commands_open = false;
                        debug!(phase = %self.machine.phase(), "all session handles dropped");
                        if self.machine.phase() == SessionPhase::Running {
                            self.machine.abandon(self.clock.now())
                        } else {
                            Vec::new()
                        }
                    }
                },
                Some(tick) = self.ticks.recv() => {
                    let now = self.clock.now();
                    self.machine.tick(&tick, now)
                }
                Some(event) = self.workout_events.recv() => {
                    let now = self.clock.now();
                    self.machine.handle_workout(&event, now)
                }
            };
            self.publish(events);

            if !commands_open && self.machine.phase() == SessionPhase::Idle {
                break;
            }
        }
        info!("session runtime stopped");
    }

    fn handle_command(&mut self, command: Command) -> Vec<Event> {
        let now = self.clock.now();
        match command {
            Command::Start {
                mode,
                shot_type,
                reply,
            } => {
                let result = self.machine.start_session(mode, shot_type, now);
                let (events, reply_value) = match result {
                    Ok(events) => (events, Ok(())),
                    Err(e) => (Vec::new(), Err(e)),
                };
                let _ = reply.send(reply_value);
                events
            }
            Command::Score => self.machine.score_attempt(now),
            Command::CompleteStage => self.machine.complete_stage(now),
            Command::Finish => self.machine.finish(now),
            Command::Abandon => self.machine.abandon(now),
        }
    }

    fn publish(&mut self, events: Vec<Event>) {
        for event in events {
            let _ = self.events_tx.send(event);
        }
        self.state_tx.send_replace(self.snapshot());

        match self.machine.take_outcome() {
            Some(SessionOutcome::Completed(record)) => {
                match self.store.insert(&record) {
                    Ok(()) => info!(session_id = %record.id, makes = record.makes, length = record.length, "session saved"),
                    Err(e) => error!(session_id = %record.id, error = %e, "failed to save session"),
                }
                self.bridge.send(&record);
            }
            Some(SessionOutcome::Discarded) => debug!("discarded session acknowledged"),
            None => return,
        }
        self.state_tx.send_replace(self.snapshot());
    }

    fn snapshot(&self) -> SessionSnapshot {
        let state = self.machine.state().clone();
        let reading = match &state {
            SessionState::Running(recording) => Some(recording.reading(self.clock.now())),
            _ => None,
        };
        SessionSnapshot { state, reading }
    }
}
