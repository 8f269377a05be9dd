//! Sending side of watch→phone delivery.
//!
//! One `send` call picks the route: an immediate message when the peer is
//! reachable, otherwise the platform's queued transfer. Whatever the
//! platform refuses lands in the [`Outbox`] until the owner calls
//! [`DeliveryBridge::flush_outbox`].

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::outbox::Outbox;
use super::payload::{self, PayloadMap, KEY_ID};
use super::transport::PeerTransport;
use crate::error::OutboxError;
use crate::session::SessionRecord;

#[derive(Clone)]
pub struct DeliveryBridge {
    transport: Arc<dyn PeerTransport>,
    outbox: Arc<Mutex<Outbox>>,
}

impl DeliveryBridge {
    pub fn new(transport: Arc<dyn PeerTransport>, outbox: Outbox) -> Self {
        Self {
            transport,
            outbox: Arc::new(Mutex::new(outbox)),
        }
    }

    /// Bridge backed by an outbox file, picking up anything left from a
    /// previous run.
    pub fn with_outbox_file(
        transport: Arc<dyn PeerTransport>,
        path: PathBuf,
    ) -> Result<Self, OutboxError> {
        let mut outbox = Outbox::new_with_path(path);
        outbox.load()?;
        if !outbox.is_empty() {
            info!(pending = outbox.len(), "loaded undelivered sessions from outbox");
        }
        Ok(Self::new(transport, outbox))
    }

    /// Deliver a finished session to the counterpart device.
    ///
    /// Never blocks and never fails; transport problems are logged and the
    /// payload is queued instead.
    pub fn send(&self, record: &SessionRecord) {
        let _ = self.dispatch(payload::encode(record));
    }

    /// Number of payloads waiting for transport activation.
    pub fn pending(&self) -> usize {
        self.lock_outbox().len()
    }

    /// Hand every outboxed payload to the platform queue. Returns how many
    /// were accepted.
    ///
    /// Nothing calls this automatically; the owner calls it once it knows
    /// the transport is activated, e.g. at startup.
    pub fn flush_outbox(&self) -> usize {
        let mut outbox = self.lock_outbox();
        let mut accepted = 0;
        for transfer in outbox.drain() {
            let id = payload_id(&transfer.payload);
            match self.transport.queue_transfer(transfer.payload.clone()) {
                Ok(()) => {
                    accepted += 1;
                    debug!(session_id = %id, attempts = transfer.attempts, "outboxed session handed to transport");
                }
                Err(e) => {
                    warn!(session_id = %id, error = %e, "outbox flush failed, keeping session queued");
                    outbox.enqueue(transfer.payload, Some(e.to_string()));
                }
            }
        }
        if let Err(e) = outbox.persist() {
            warn!(error = %e, "failed to persist outbox");
        }
        accepted
    }

    /// Route one payload. Returns the background task when the immediate
    /// path was taken.
    pub(crate) fn dispatch(&self, payload: PayloadMap) -> Option<JoinHandle<()>> {
        if self.transport.is_reachable() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let bridge = self.clone();
                return Some(handle.spawn(async move {
                    let id = payload_id(&payload);
                    match bridge.transport.send_message(payload.clone()).await {
                        Ok(()) => debug!(session_id = %id, "session delivered immediately"),
                        Err(e) => {
                            warn!(session_id = %id, error = %e, "immediate delivery failed, falling back to queued transfer");
                            bridge.queue(payload);
                        }
                    }
                }));
            }
        }
        self.queue(payload);
        None
    }

    fn queue(&self, payload: PayloadMap) {
        let id = payload_id(&payload);
        match self.transport.queue_transfer(payload.clone()) {
            Ok(()) => debug!(session_id = %id, "session queued for background transfer"),
            Err(e) => {
                warn!(session_id = %id, error = %e, "transport not ready, session kept in outbox");
                let mut outbox = self.lock_outbox();
                outbox.enqueue(payload, Some(e.to_string()));
                if let Err(e) = outbox.persist() {
                    warn!(error = %e, "failed to persist outbox");
                }
            }
        }
    }

    fn lock_outbox(&self) -> MutexGuard<'_, Outbox> {
        self.outbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn payload_id(payload: &PayloadMap) -> String {
    payload
        .get(KEY_ID)
        .and_then(|v| v.as_str())
        .unwrap_or("-")
        .to_string()
}
