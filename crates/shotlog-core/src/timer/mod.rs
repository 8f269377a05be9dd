mod clock;
mod engine;

pub use clock::{Clock, SystemClock, TokioClock};
pub use engine::{Tick, TickSource, TimerEngine, DEFAULT_TICK_INTERVAL};
