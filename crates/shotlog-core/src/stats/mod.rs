//! Statistics over stored sessions.

mod streak;
mod summary;

pub use streak::{current_streak, StreakCalculator};
pub use summary::{daily_trend, summarize, DailyTotal, SessionSummary, ShotTypeBreakdown};
