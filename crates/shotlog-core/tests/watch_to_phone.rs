//! End-to-end: record on the "watch", deliver, store on the "phone".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use shotlog_core::delivery::{Outbox, PayloadMap};
use shotlog_core::error::TransportError;
use shotlog_core::session::SessionMode;
use shotlog_core::timer::TokioClock;
use shotlog_core::workout::UnavailableBackend;
use shotlog_core::{
    current_streak, Database, DeliveryBridge, Event, PeerTransport, ReceiveOutcome,
    SessionReceiver, SessionRuntime, SessionStore, ShotType,
};

/// Records whatever the watch hands over, on either path.
#[derive(Default)]
struct Wire {
    reachable: AtomicBool,
    activated: AtomicBool,
    sent: Mutex<Vec<PayloadMap>>,
}

impl Wire {
    fn take(&self) -> Vec<PayloadMap> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

#[async_trait]
impl PeerTransport for Wire {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn send_message(&self, payload: PayloadMap) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(payload);
        Ok(())
    }

    fn queue_transfer(&self, payload: PayloadMap) -> Result<(), TransportError> {
        if !self.activated.load(Ordering::SeqCst) {
            return Err(TransportError::NotActivated);
        }
        self.sent.lock().unwrap().push(payload);
        Ok(())
    }
}

async fn record_session(
    handle: &shotlog_core::SessionHandle,
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    makes: u32,
) {
    handle
        .start(SessionMode::FreestyleCountUp, ShotType::FreeThrows)
        .await
        .unwrap();
    for _ in 0..makes {
        handle.score().unwrap();
    }
    tokio::time::advance(Duration::from_secs(30)).await;
    handle.finish().unwrap();
    loop {
        if let Event::SessionCompleted { .. } = events.recv().await.unwrap() {
            break;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn sessions_reach_the_phone_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let wire = Arc::new(Wire::default());
    let bridge =
        DeliveryBridge::with_outbox_file(wire.clone(), dir.path().join("outbox.json")).unwrap();

    let watch_db = Database::open_at(dir.path().join("watch.db")).unwrap();
    let (runtime, handle) = SessionRuntime::new(
        Arc::new(UnavailableBackend),
        Arc::new(TokioClock::new()),
        watch_db,
        bridge.clone(),
        Duration::from_secs(1),
    );
    let mut events = handle.subscribe();
    let task = tokio::spawn(runtime.run());

    // Transport not activated yet: the session waits in the outbox.
    record_session(&handle, &mut events, 4).await;
    assert_eq!(bridge.pending(), 1);
    assert!(wire.take().is_empty());

    wire.activated.store(true, Ordering::SeqCst);
    assert_eq!(bridge.flush_outbox(), 1);

    // Reachable peer: immediate message.
    wire.reachable.store(true, Ordering::SeqCst);
    record_session(&handle, &mut events, 6).await;
    drop(handle);
    task.await.unwrap();
    for _ in 0..10 {
        if wire.sent.lock().unwrap().len() >= 2 {
            break;
        }
        tokio::task::yield_now().await;
    }

    let delivered = wire.take();
    assert_eq!(delivered.len(), 2);

    let phone = Database::open_in_memory().unwrap();
    let receiver = SessionReceiver::new(&phone);
    for payload in &delivered {
        assert!(matches!(
            receiver.receive(payload).unwrap(),
            ReceiveOutcome::Inserted(_)
        ));
    }
    let streak_before = current_streak(&phone.query_all().unwrap(), &Utc::now());

    // The platform redelivers everything.
    for payload in &delivered {
        assert!(matches!(
            receiver.receive(payload).unwrap(),
            ReceiveOutcome::Duplicate { .. }
        ));
    }

    let stored = phone.query_all().unwrap();
    assert_eq!(stored.len(), 2);
    let mut makes: Vec<_> = stored.iter().map(|r| r.makes).collect();
    makes.sort_unstable();
    assert_eq!(makes, vec![4, 6]);
    assert_eq!(current_streak(&stored, &Utc::now()), streak_before);

    let watch_db = Database::open_at(dir.path().join("watch.db")).unwrap();
    assert_eq!(watch_db.query_all().unwrap().len(), 2);
}

#[test]
fn outbox_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outbox.json");
    let wire = Arc::new(Wire::default());

    let bridge = DeliveryBridge::with_outbox_file(wire.clone(), path.clone()).unwrap();
    let record = shotlog_core::SessionRecord::new(
        Utc::now(),
        12,
        240,
        ShotType::Midrange,
        shotlog_core::SessionType::Drill,
    );
    bridge.send(&record);
    drop(bridge);

    let restarted = DeliveryBridge::new(wire.clone(), {
        let mut outbox = Outbox::new_with_path(path);
        outbox.load().unwrap();
        outbox
    });
    assert_eq!(restarted.pending(), 1);

    wire.activated.store(true, Ordering::SeqCst);
    assert_eq!(restarted.flush_outbox(), 1);
    let sent = wire.take();
    assert_eq!(sent[0]["id"], serde_json::json!(record.id.to_string()));
}
