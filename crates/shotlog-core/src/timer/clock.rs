//! Wall-clock sources.
//!
//! Session timing is always derived from a stored reference timestamp and the
//! current reading of a [`Clock`], never from the number of ticks observed.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::time::Instant;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The host's real-time clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall-clock anchored once, then advanced by the tokio monotonic clock.
///
/// Follows `tokio::time::pause`/`advance`, which makes it the clock to use
/// when driving a runtime under simulated time.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor_wall: DateTime<Utc>,
    anchor: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::anchored_at(Utc::now())
    }

    pub fn anchored_at(anchor_wall: DateTime<Utc>) -> Self {
        Self {
            anchor_wall,
            anchor: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = ChronoDuration::from_std(self.anchor.elapsed())
            .unwrap_or_else(|_| ChronoDuration::zero());
        self.anchor_wall + elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let clock = TokioClock::anchored_at(start);
        assert_eq!(clock.now(), start);

        tokio::time::advance(std::time::Duration::from_secs(90)).await;
        assert_eq!(clock.now(), start + ChronoDuration::seconds(90));
    }
}
