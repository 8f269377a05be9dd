//! Repeating tick source.
//!
//! The engine only says "a tick happened"; display values are recomputed from
//! a reference timestamp on every tick, so delayed or skipped ticks never
//! accumulate drift.
//!
//! ## Generations
//!
//! ```text
//! start() -> gen N ticks ... stop() -> gen N+1 (no task) -> start() -> gen N+2 ticks
//! ```
//!
//! A tick already sitting in the channel when `stop()` runs carries an old
//! generation and is rejected by [`TickSource::is_current`].

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

const MIN_TICK_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub generation: u64,
    /// 1-based sequence number within the generation.
    pub seq: u64,
}

/// Anything that can drive a recording's clock display.
pub trait TickSource {
    fn start(&mut self, interval: Duration);

    /// After this returns no tick from an earlier `start` is current.
    fn stop(&mut self);

    fn is_current(&self, tick: &Tick) -> bool;

    fn is_running(&self) -> bool;
}

/// Tokio-backed tick source; must be started from within a runtime.
pub struct TimerEngine {
    tx: mpsc::UnboundedSender<Tick>,
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl TimerEngine {
    /// Create an engine and the receiving end of its tick channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Tick>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                generation: 0,
                handle: None,
            },
            rx,
        )
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl TickSource for TimerEngine {
    fn start(&mut self, interval: Duration) {
        self.stop();
        self.generation += 1;

        let interval = interval.max(MIN_TICK_INTERVAL);
        let generation = self.generation;
        let tx = self.tx.clone();

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut seq: u64 = 0;
            loop {
                ticker.tick().await;
                seq += 1;
                if tx.send(Tick { generation, seq }).is_err() {
                    break; // receiver gone
                }
            }
        }));
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            self.generation += 1;
        }
    }

    fn is_current(&self, tick: &Tick) -> bool {
        self.handle.is_some() && tick.generation == self.generation
    }

    fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for TimerEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_interval() {
        let (mut engine, mut rx) = TimerEngine::new();
        let started = Instant::now();
        engine.start(Duration::from_secs(1));

        for expected in 1..=3 {
            let tick = rx.recv().await.unwrap();
            assert!(engine.is_current(&tick));
            assert_eq!(tick.seq, expected);
        }
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn queued_ticks_are_stale_after_stop() {
        let (mut engine, mut rx) = TimerEngine::new();
        engine.start(Duration::from_secs(1));
        time::sleep(Duration::from_millis(2500)).await;

        engine.stop();
        assert!(!engine.is_running());

        // Two ticks were sent before stop; neither may be honoured.
        let mut drained = 0;
        while let Ok(tick) = rx.try_recv() {
            assert!(!engine.is_current(&tick));
            drained += 1;
        }
        assert_eq!(drained, 2);

        time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_does_not_double_fire() {
        let (mut engine, mut rx) = TimerEngine::new();
        engine.start(Duration::from_secs(1));
        time::sleep(Duration::from_millis(500)).await;
        engine.start(Duration::from_secs(1));

        time::sleep(Duration::from_millis(3200)).await;

        let current: Vec<Tick> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|t| engine.is_current(t))
            .collect();
        assert_eq!(current.len(), 3);
        assert!(current.iter().all(|t| t.generation == engine.generation()));
    }
}
