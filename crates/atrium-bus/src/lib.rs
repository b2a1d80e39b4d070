//! Pub/sub transport boundary for the session synchronizer. The real
//! broker connection (TLS, transport selection) lives behind [`BusClient`];
//! this crate ships the contract plus [`LocalBroker`], an in-memory broker
//! for tests and single-process setups.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

mod filter;
mod local;

pub use filter::filter_matches;
pub use local::{LocalBroker, LocalBusClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    Disconnected,
    Connected,
}

/// Connection lifecycle notifications, delivered out of band from message
/// subscriptions. The broker does not know whether a disconnect was
/// intentional; callers track that themselves. A `StateChanged` follows
/// the primary `Connected`/`Disconnected` event it corresponds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Connected,
    Disconnected { reason: String },
    StateChanged(BusState),
    Error(String),
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus is not connected")]
    NotConnected,
    #[error("bus channel closed")]
    Closed,
    #[error("bus transport error: {0}")]
    Transport(String),
}

pub type BusResult<T> = Result<T, BusError>;

/// A single connection to the message bus. Topic filters use the
/// single-level `+` and terminal `#` wildcard convention. Delivery is
/// at-most-once with per-topic ordering only; published messages are
/// delivered to every matching subscriber, the publisher included.
#[async_trait]
pub trait BusClient: Send + Sync {
    async fn connect(&self) -> BusResult<()>;
    async fn disconnect(&self, reason: &str) -> BusResult<()>;
    fn is_connected(&self) -> bool;
    async fn publish(&self, topic: &str, payload: Bytes) -> BusResult<()>;
    /// Resolves once the subscription is registered; messages arrive on
    /// the returned channel. The channel closes on unsubscribe or
    /// disconnect.
    async fn subscribe(&self, topic_filter: &str)
        -> BusResult<mpsc::UnboundedReceiver<BusMessage>>;
    async fn unsubscribe(&self, topic_filter: &str) -> BusResult<()>;
    fn events(&self) -> broadcast::Receiver<BusEvent>;
}
