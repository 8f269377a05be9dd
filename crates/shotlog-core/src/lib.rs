//! # Shotlog Core Library
//!
//! This library provides the core logic for shotlog, a basketball
//! shot-tracking app that records shooting sessions on a watch and keeps
//! them on a phone. The CLI binary is a thin layer over the same library
//! and plays the phone side.
//!
//! ## Architecture
//!
//! - **Session**: A tagged-union state machine that owns the single in-flight
//!   recording, fed ticks, workout events and user input
//! - **Timer**: Generation-stamped tick source; elapsed time always comes from
//!   a reference timestamp
//! - **Workout**: Adapter that normalizes the host's workout tracking into
//!   started / committed / discarded
//! - **Delivery**: Watch→phone transfer with an immediate path, a queued
//!   fallback and an idempotent receiver
//! - **Stats**: Streaks and summaries computed from stored sessions
//! - **Storage**: SQLite-based session storage and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`SessionStateMachine`]: Recording lifecycle
//! - [`SessionRuntime`]: Async driver publishing state and events
//! - [`DeliveryBridge`] / [`SessionReceiver`]: Both ends of delivery
//! - [`StreakCalculator`]: Consecutive-day streaks
//! - [`Database`]: Session persistence
//! - [`Config`]: Application configuration management

pub mod delivery;
pub mod error;
pub mod events;
pub mod session;
pub mod stats;
pub mod storage;
pub mod timer;
pub mod workout;

pub use delivery::{DeliveryBridge, PeerTransport, ReceiveOutcome, SessionReceiver};
pub use error::{CoreError, DatabaseError, ConfigError, PayloadError, Result, SessionError};
pub use events::Event;
pub use session::{
    SessionHandle, SessionMode, SessionRecord, SessionRuntime, SessionState,
    SessionStateMachine, SessionType, ShotType,
};
pub use stats::{current_streak, StreakCalculator};
pub use storage::{Config, Database, SessionStore};
pub use timer::TimerEngine;
pub use workout::{WorkoutBackend, WorkoutLifecycleAdapter};
