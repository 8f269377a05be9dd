use async_trait::async_trait;

use super::payload::PayloadMap;
use crate::error::TransportError;

/// Device-to-device channel.
///
/// `send_message` is the immediate, best-effort path and only works while
/// the counterpart is reachable. `queue_transfer` hands the payload to the
/// platform for guaranteed background delivery; it fails only when the
/// channel itself is not activated yet.
///
/// Activation is not reported through this trait. Owners of a
/// [`DeliveryBridge`](super::DeliveryBridge) call
/// [`flush_outbox`](super::DeliveryBridge::flush_outbox) when they learn
/// the channel is up.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    fn is_reachable(&self) -> bool;

    async fn send_message(&self, payload: PayloadMap) -> Result<(), TransportError>;

    fn queue_transfer(&self, payload: PayloadMap) -> Result<(), TransportError>;
}
