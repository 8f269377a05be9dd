//! Wrapper around the host platform's workout-tracking subsystem.
//!
//! External tracking is best-effort telemetry: nothing in here can stop the
//! app's own timing or recording.

mod adapter;
mod backend;

pub use adapter::{
    WorkoutControl, WorkoutEvent, WorkoutEventKind, WorkoutId, WorkoutLifecycleAdapter,
    WorkoutPhase,
};
pub use backend::{ActivityConfig, FinalizeIntent, UnavailableBackend, WorkoutBackend};
