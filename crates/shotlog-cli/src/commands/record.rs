//! Live recording driven by line commands on stdin.
//!
//! Finished sessions are saved locally and handed to the delivery bridge,
//! which writes them as payload files under `<data_dir>/outgoing/` for the
//! other device's `inbox receive`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Args;
use shotlog_core::delivery::PayloadMap;
use shotlog_core::error::TransportError;
use shotlog_core::session::{ClockReading, SessionHandle, SessionMode};
use shotlog_core::storage::data_dir;
use shotlog_core::timer::SystemClock;
use shotlog_core::workout::UnavailableBackend;
use shotlog_core::{
    Config, Database, DeliveryBridge, Event, PeerTransport, SessionRuntime, ShotType,
};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

#[derive(Args)]
pub struct RecordArgs {
    /// Shot type (layups, freeThrows, midrange, threePointers, deep, allShots)
    shot_type: ShotType,
    /// Count down instead of up
    #[arg(long, conflicts_with = "drill")]
    challenge: bool,
    /// Challenge length in seconds, defaults to the configured duration
    #[arg(long, requires = "challenge")]
    duration: Option<u32>,
    /// Staged drill using the configured stage policy
    #[arg(long)]
    drill: bool,
}

/// Transfer queue backed by a folder of payload files.
struct OutgoingFolder {
    dir: PathBuf,
}

impl OutgoingFolder {
    fn new(dir: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }
}

#[async_trait]
impl PeerTransport for OutgoingFolder {
    fn is_reachable(&self) -> bool {
        false
    }

    async fn send_message(&self, _payload: PayloadMap) -> Result<(), TransportError> {
        Err(TransportError::Unreachable)
    }

    fn queue_transfer(&self, payload: PayloadMap) -> Result<(), TransportError> {
        let name = payload
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let path = self.dir.join(format!("{name}.json"));
        let body = serde_json::to_string_pretty(&payload)
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        std::fs::write(&path, body).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        debug!(path = %path.display(), "payload written");
        Ok(())
    }
}

pub fn run(args: RecordArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let mode = if args.challenge {
        SessionMode::ChallengeCountDown {
            duration_secs: args
                .duration
                .unwrap_or(config.challenge.default_duration_secs),
        }
    } else if args.drill {
        SessionMode::DrillStaged(config.drill_plan())
    } else {
        SessionMode::FreestyleCountUp
    };

    let dir = data_dir()?;
    let db = Database::open()?;
    let transport = Arc::new(OutgoingFolder::new(dir.join("outgoing"))?);
    let bridge = DeliveryBridge::with_outbox_file(transport, config.outbox_path(&dir))?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(record(db, bridge, config.tick_interval(), mode, args.shot_type))
}

async fn record(
    db: Database,
    bridge: DeliveryBridge,
    tick_interval: Duration,
    mode: SessionMode,
    shot_type: ShotType,
) -> Result<(), Box<dyn std::error::Error>> {
    let (runtime, handle) = SessionRuntime::new(
        Arc::new(UnavailableBackend),
        Arc::new(SystemClock),
        db,
        bridge.clone(),
        tick_interval,
    );
    let events = handle.subscribe();
    let task = tokio::spawn(runtime.run());

    bridge.flush_outbox();
    let result = drive(&handle, events, mode, shot_type).await;
    drop(handle);
    task.await?;
    result
}

async fn drive(
    handle: &SessionHandle,
    mut events: broadcast::Receiver<Event>,
    mode: SessionMode,
    shot_type: ShotType,
) -> Result<(), Box<dyn std::error::Error>> {
    handle.start(mode, shot_type).await?;
    eprintln!("recording {shot_type}: s = score, n = next stage, f = finish, q = quit");

    let (line_tx, mut lines) = mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.recv(), if stdin_open => match line {
                Some(line) => match line.trim() {
                    "s" | "score" => handle.score()?,
                    "n" | "stage" => handle.complete_stage()?,
                    "f" | "finish" => handle.finish()?,
                    "q" | "quit" => handle.abandon()?,
                    "" => {}
                    other => eprintln!("unknown command '{other}'"),
                },
                None => {
                    // End of input finishes the recording.
                    stdin_open = false;
                    handle.finish()?;
                }
            },
            event = events.recv() => match event {
                Ok(Event::AttemptScored { makes, .. }) => eprintln!("makes: {makes}"),
                Ok(Event::StageAdvanced { stages_completed, stage_count, .. }) => {
                    eprintln!("stage {stages_completed}/{stage_count} done");
                }
                Ok(Event::ClockTicked { reading, .. }) => match reading {
                    ClockReading::Remaining(secs) if secs % 10 == 0 => eprintln!("{secs}s left"),
                    _ => {}
                },
                Ok(Event::WorkoutDegraded { reason, .. }) => debug!(%reason, "recording without workout tracking"),
                Ok(Event::SessionCompleted { record, .. }) => {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                    return Ok(());
                }
                Ok(Event::SessionDiscarded { .. }) => {
                    println!("session discarded");
                    return Ok(());
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    return Err("session runtime stopped unexpectedly".into());
                }
            },
        }
    }
}
