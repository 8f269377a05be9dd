mod bridge;
mod outbox;
pub mod payload;
mod receiver;
mod transport;

pub use bridge::DeliveryBridge;
pub use outbox::{Outbox, PendingTransfer};
pub use payload::{DecodedSession, PayloadMap};
pub use receiver::{ReceiveOutcome, SessionReceiver};
pub use transport::PeerTransport;

#[cfg(test)]
pub(crate) use bridge::tests::FakeTransport;
