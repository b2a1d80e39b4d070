//! In-memory broker. One [`LocalBroker`] plays the role of the remote
//! message bus; every participant holds its own [`LocalBusClient`]
//! connection minted from it. Used by tests and by single-process
//! sandboxes; delivery is synchronous fan-out with per-topic ordering.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::trace;

use crate::{filter_matches, BusClient, BusError, BusEvent, BusMessage, BusResult, BusState};

const EVENT_CHANNEL_CAPACITY: usize = 32;

struct Subscription {
    client: u64,
    filter: String,
    sender: mpsc::UnboundedSender<BusMessage>,
}

#[derive(Default)]
struct BrokerState {
    next_client: u64,
    connected: HashMap<u64, broadcast::Sender<BusEvent>>,
    subscriptions: Vec<Subscription>,
}

impl BrokerState {
    fn drop_connection(&mut self, client: u64, reason: &str) {
        self.subscriptions.retain(|sub| sub.client != client);
        if let Some(events) = self.connected.remove(&client) {
            let _ = events.send(BusEvent::Disconnected {
                reason: reason.to_string(),
            });
            let _ = events.send(BusEvent::StateChanged(BusState::Disconnected));
        }
    }
}

#[derive(Default, Clone)]
pub struct LocalBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new, initially disconnected client connection.
    pub fn client(&self) -> LocalBusClient {
        let id = {
            let mut state = self.state.lock();
            state.next_client += 1;
            state.next_client
        };
        LocalBusClient {
            state: Arc::clone(&self.state),
            id,
            events: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
        }
    }

    /// Sever a client from the broker side, as a transport failure would.
    /// The client observes an ordinary disconnect event it did not ask for.
    pub fn drop_client(&self, client: &LocalBusClient, reason: &str) {
        self.state.lock().drop_connection(client.id, reason);
    }
}

pub struct LocalBusClient {
    state: Arc<Mutex<BrokerState>>,
    id: u64,
    events: broadcast::Sender<BusEvent>,
}

#[async_trait]
impl BusClient for LocalBusClient {
    async fn connect(&self) -> BusResult<()> {
        let mut state = self.state.lock();
        state.connected.insert(self.id, self.events.clone());
        let _ = self.events.send(BusEvent::Connected);
        let _ = self.events.send(BusEvent::StateChanged(BusState::Connected));
        Ok(())
    }

    async fn disconnect(&self, reason: &str) -> BusResult<()> {
        self.state.lock().drop_connection(self.id, reason);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected.contains_key(&self.id)
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> BusResult<()> {
        let state = self.state.lock();
        if !state.connected.contains_key(&self.id) {
            return Err(BusError::NotConnected);
        }
        trace!(target: "atrium::bus", topic, bytes = payload.len(), "publish");
        let message = BusMessage {
            topic: topic.to_string(),
            payload,
        };
        for sub in &state.subscriptions {
            if state.connected.contains_key(&sub.client) && filter_matches(&sub.filter, topic) {
                let _ = sub.sender.send(message.clone());
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic_filter: &str,
    ) -> BusResult<mpsc::UnboundedReceiver<BusMessage>> {
        let mut state = self.state.lock();
        if !state.connected.contains_key(&self.id) {
            return Err(BusError::NotConnected);
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        state.subscriptions.push(Subscription {
            client: self.id,
            filter: topic_filter.to_string(),
            sender,
        });
        Ok(receiver)
    }

    async fn unsubscribe(&self, topic_filter: &str) -> BusResult<()> {
        let mut state = self.state.lock();
        state
            .subscriptions
            .retain(|sub| !(sub.client == self.id && sub.filter == topic_filter));
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<BusEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_matching_subscribers_including_sender() {
        let broker = LocalBroker::new();
        let alice = broker.client();
        let bob = broker.client();
        alice.connect().await.unwrap();
        bob.connect().await.unwrap();

        let mut alice_rx = alice.subscribe("room/#").await.unwrap();
        let mut bob_rx = bob.subscribe("room/chat").await.unwrap();

        alice
            .publish("room/chat", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let echoed = alice_rx.recv().await.unwrap();
        assert_eq!(echoed.topic, "room/chat");
        let delivered = bob_rx.recv().await.unwrap();
        assert_eq!(delivered.payload, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn publish_while_disconnected_is_an_error() {
        let broker = LocalBroker::new();
        let client = broker.client();
        let err = client
            .publish("room/chat", Bytes::new())
            .await
            .expect_err("publish should fail before connect");
        assert!(matches!(err, BusError::NotConnected));
    }

    #[tokio::test]
    async fn unsubscribe_closes_the_channel() {
        let broker = LocalBroker::new();
        let client = broker.client();
        client.connect().await.unwrap();
        let mut rx = client.subscribe("room/+").await.unwrap();
        client.unsubscribe("room/+").await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn broker_side_drop_emits_disconnect_and_stops_delivery() {
        let broker = LocalBroker::new();
        let client = broker.client();
        let mut events = client.events();
        client.connect().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), BusEvent::Connected);
        assert_eq!(
            events.recv().await.unwrap(),
            BusEvent::StateChanged(BusState::Connected)
        );

        broker.drop_client(&client, "connection reset");
        assert_eq!(
            events.recv().await.unwrap(),
            BusEvent::Disconnected {
                reason: "connection reset".into()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            BusEvent::StateChanged(BusState::Disconnected)
        );
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn reconnect_after_drop() {
        let broker = LocalBroker::new();
        let client = broker.client();
        client.connect().await.unwrap();
        broker.drop_client(&client, "gone");
        client.connect().await.unwrap();
        assert!(client.is_connected());
        client.publish("room/chat", Bytes::new()).await.unwrap();
    }
}
