mod machine;
mod record;
mod runtime;

pub use machine::{
    ClockReading, DrillPlan, FinishReason, Recording, SessionMode, SessionOutcome, SessionPhase,
    SessionState, SessionStateMachine,
};
pub use record::{backdate, DedupKey, SessionRecord, SessionType, ShotType};
pub use runtime::{SessionHandle, SessionRuntime, SessionSnapshot};
