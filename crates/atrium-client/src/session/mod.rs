//! Session lifecycle: connect, create/join/leave/destroy, heartbeats,
//! full-state reconciliation and reconnection. One [`SessionController`]
//! owns one bus connection and at most one session membership at a time.

mod events;
pub mod manager;
pub(crate) mod router;

pub use events::SessionEvent;
pub use manager::SyncManager;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use atrium_bus::{BusClient, BusEvent, BusMessage};
use atrium_proto::{
    topics, ClientInfo, CreateSessionRequest, BareMessage, Envelope, EntityKind,
    JoinSessionRequest, SessionOp,
};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::offset::OffsetTransform;
use crate::replica::EntityReplicator;
use crate::world::WorldBridge;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting,
    Connected,
    InSession,
    Reconnecting,
}

/// Result of a resolved full-state request.
#[derive(Debug, Clone)]
pub struct StateSummary {
    pub participants: Vec<ClientInfo>,
    pub entities: Vec<Uuid>,
}

pub(crate) struct TrackedEntity {
    pub kind: EntityKind,
}

pub(crate) struct PendingState {
    pub session_id: Uuid,
    pub reply: Option<oneshot::Sender<StateSummary>>,
}

pub(crate) struct SessionState {
    pub phase: Phase,
    pub auto_reconnect: bool,
    /// Consumed exactly once by the next disconnect notification.
    pub intentional_disconnect: bool,
    pub client_id: Option<String>,
    pub session_id: Option<Uuid>,
    pub session_tag: Option<String>,
    pub client_tag: Option<String>,
    pub participants: HashMap<String, ClientInfo>,
    /// The replicated set: entities whose mutations we mirror.
    pub entities: HashMap<Uuid, TrackedEntity>,
    /// Ids that have already been through replication this membership; an
    /// id enters the replicated set at most once per membership.
    pub retired: HashSet<Uuid>,
    pub pending_state: Option<PendingState>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: Phase::Disconnected,
            auto_reconnect: false,
            intentional_disconnect: false,
            client_id: None,
            session_id: None,
            session_tag: None,
            client_tag: None,
            participants: HashMap::new(),
            entities: HashMap::new(),
            retired: HashSet::new(),
            pending_state: None,
        }
    }

    fn clear_membership(&mut self) {
        self.session_id = None;
        self.session_tag = None;
        self.client_tag = None;
        self.participants.clear();
        self.entities.clear();
        self.retired.clear();
        self.pending_state = None;
    }
}

pub(crate) struct Shared {
    pub bus: Arc<dyn BusClient>,
    pub world: Arc<dyn WorldBridge>,
    pub config: SyncConfig,
    pub offset: OffsetTransform,
    pub state: Mutex<SessionState>,
    pub events: broadcast::Sender<SessionEvent>,
    pub inbound: mpsc::UnboundedSender<BusMessage>,
    pub tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) async fn publish<T: Serialize>(&self, topic: String, payload: &T) -> SyncResult<()> {
        let raw = atrium_proto::encode(payload)?;
        self.bus.publish(&topic, Bytes::from(raw)).await?;
        Ok(())
    }

    fn guard_connected(&self) -> SyncResult<()> {
        if self.bus.is_connected() {
            Ok(())
        } else {
            Err(SyncError::NotInitialized)
        }
    }

    /// Envelope for an operation that requires an active session. The
    /// three guards fire independently so callers see the precise reason.
    pub(crate) fn session_envelope(&self) -> SyncResult<(Uuid, Envelope)> {
        self.guard_connected()?;
        let state = self.state.lock();
        let session_id = state.session_id.ok_or(SyncError::NotInSession)?;
        let client_id = state.client_id.clone().ok_or(SyncError::NoClientId)?;
        Ok((
            session_id,
            Envelope::new(client_id, self.config.client_token.clone(), session_id),
        ))
    }

    pub(crate) fn local_client_id(&self) -> Option<String> {
        self.state.lock().client_id.clone()
    }
}

/// Forward one subscription into the single dispatch queue. All inbound
/// handling is serialized through that queue; bus callbacks never mutate
/// session state inline.
pub(crate) async fn subscribe_pump(shared: &Arc<Shared>, filter: &str) -> SyncResult<()> {
    let mut receiver = shared.bus.subscribe(filter).await?;
    let inbound = shared.inbound.clone();
    let handle = tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            if inbound.send(message).is_err() {
                break;
            }
        }
    });
    let mut tasks = shared.tasks.lock();
    tasks.retain(|task| !task.is_finished());
    tasks.push(handle);
    Ok(())
}

pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    pub fn new(
        bus: Arc<dyn BusClient>,
        world: Arc<dyn WorldBridge>,
        config: SyncConfig,
    ) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let offset = OffsetTransform::new(config.offset);
        let shared = Arc::new(Shared {
            bus,
            world,
            offset,
            config,
            state: Mutex::new(SessionState::new()),
            events: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
            inbound: inbound_tx,
            tasks: Mutex::new(Vec::new()),
        });

        let dispatcher = tokio::spawn(run_dispatcher(Arc::clone(&shared), inbound_rx));
        let heartbeat = tokio::spawn(run_heartbeat(Arc::clone(&shared)));
        // Subscribe before the first connect so no lifecycle event can
        // slip past the supervisor.
        let bus_events = shared.bus.events();
        let supervisor = tokio::spawn(supervise(Arc::clone(&shared), bus_events));
        shared
            .tasks
            .lock()
            .extend([dispatcher, heartbeat, supervisor]);

        Arc::new(Self { shared })
    }

    /// Subscribe to lifecycle notifications. Call before the operations
    /// whose outcomes you want to observe.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.shared.state.lock().phase
    }

    pub fn client_id(&self) -> Option<String> {
        self.shared.local_client_id()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.shared.state.lock().session_id
    }

    /// Human tag of the current session, once its new-session broadcast
    /// has been observed.
    pub fn session_tag(&self) -> Option<String> {
        self.shared.state.lock().session_tag.clone()
    }

    /// Entity-facing handle sharing this controller's session scope.
    pub fn replicator(self: &Arc<Self>) -> EntityReplicator {
        EntityReplicator::new(Arc::clone(&self.shared))
    }

    /// Open the transport and subscribe the session-discovery topic
    /// space. Resolves once the bus reports the connection up; the
    /// completion fires exactly once. `auto_reconnect` is remembered for
    /// later unexpected drops.
    pub async fn connect(&self, auto_reconnect: bool) -> SyncResult<()> {
        let mut bus_events = self.shared.bus.events();
        {
            let mut state = self.shared.state.lock();
            if matches!(state.phase, Phase::Connected | Phase::InSession) {
                state.auto_reconnect = auto_reconnect;
                return Ok(());
            }
            state.phase = Phase::Connecting;
            state.auto_reconnect = auto_reconnect;
            if state.client_id.is_none() {
                state.client_id = Some(
                    self.shared
                        .config
                        .client_id
                        .clone()
                        .unwrap_or_else(generate_client_id),
                );
            }
        }
        self.shared.bus.connect().await?;
        loop {
            match bus_events.recv().await {
                Ok(BusEvent::Connected) => break,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    // Connected may have been among the dropped events;
                    // trust the transport's own view.
                    if self.shared.bus.is_connected() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return Err(SyncError::NotInitialized),
            }
        }
        self.shared.state.lock().phase = Phase::Connected;
        subscribe_pump(&self.shared, topics::SESSION_DISCOVERY_FILTER).await?;
        info!(target: "atrium::session", client = ?self.client_id(), "connected to bus");
        Ok(())
    }

    /// Tear the transport down. Marks the drop as intentional so the
    /// supervisor does not attempt reconnection for it.
    pub async fn disconnect(&self) -> SyncResult<()> {
        {
            let mut state = self.shared.state.lock();
            state.intentional_disconnect = true;
            state.phase = Phase::Disconnected;
        }
        self.shared.bus.disconnect("client disconnect").await?;
        Ok(())
    }

    /// Fire-and-forget create request; session existence is confirmed
    /// asynchronously by the new-session broadcast.
    pub async fn create_session(&self, session_id: Uuid, tag: &str) -> SyncResult<()> {
        self.shared.guard_connected()?;
        let client_id = self
            .shared
            .local_client_id()
            .ok_or(SyncError::NoClientId)?;
        let request = CreateSessionRequest {
            envelope: Envelope::new(client_id, self.shared.config.client_token.clone(), session_id),
            session_tag: tag.to_string(),
        };
        self.shared
            .publish(topics::session(SessionOp::Create), &request)
            .await?;
        debug!(target: "atrium::session", %session_id, tag, "create session requested");
        Ok(())
    }

    /// Join an existing session. Status traffic may arrive before the
    /// join acknowledgement; the status tree is subscribed first so none
    /// of it is missed.
    pub async fn join_session(&self, session_id: Uuid, client_tag: &str) -> SyncResult<String> {
        self.shared.guard_connected()?;
        let client_id = {
            let mut state = self.shared.state.lock();
            if state.session_id.is_some() {
                return Err(SyncError::AlreadyInSession);
            }
            let client_id = state.client_id.clone().ok_or(SyncError::NoClientId)?;
            state.session_id = Some(session_id);
            state.client_tag = Some(client_tag.to_string());
            state.phase = Phase::InSession;
            client_id
        };
        subscribe_pump(&self.shared, &topics::status_filter(session_id)).await?;
        let request = JoinSessionRequest {
            envelope: Envelope::new(
                client_id.clone(),
                self.shared.config.client_token.clone(),
                session_id,
            ),
            client_tag: client_tag.to_string(),
        };
        self.shared
            .publish(topics::session(SessionOp::Join), &request)
            .await?;
        info!(target: "atrium::session", %session_id, client = %client_id, "joined session");
        Ok(client_id)
    }

    /// Leave the current session and unsubscribe its status tree.
    pub async fn exit_session(&self) -> SyncResult<()> {
        let (session_id, envelope) = self.shared.session_envelope()?;
        self.shared
            .publish(topics::session(SessionOp::Exit), &BareMessage { envelope })
            .await?;
        self.shared
            .bus
            .unsubscribe(&topics::status_filter(session_id))
            .await?;
        let mut state = self.shared.state.lock();
        state.clear_membership();
        state.phase = Phase::Connected;
        info!(target: "atrium::session", %session_id, "left session");
        Ok(())
    }

    /// Request destruction of the current session. Local teardown happens
    /// when the closed broadcast arrives.
    pub async fn destroy_session(&self) -> SyncResult<()> {
        let (session_id, envelope) = self.shared.session_envelope()?;
        self.shared
            .publish(topics::session(SessionOp::Destroy), &BareMessage { envelope })
            .await?;
        debug!(target: "atrium::session", %session_id, "destroy session requested");
        Ok(())
    }

    /// Request a full-state snapshot and resolve when the matching state
    /// message has been applied. Application is a wholesale replace, not a
    /// merge: every currently replicated entity is deleted first.
    pub async fn get_session_state(&self) -> SyncResult<StateSummary> {
        let (session_id, envelope) = self.shared.session_envelope()?;
        let receiver = {
            let mut state = self.shared.state.lock();
            if state.pending_state.is_some() {
                return Err(SyncError::StateRequestPending);
            }
            let (sender, receiver) = oneshot::channel();
            state.pending_state = Some(PendingState {
                session_id,
                reply: Some(sender),
            });
            receiver
        };
        self.shared
            .publish(topics::session(SessionOp::GetState), &BareMessage { envelope })
            .await?;

        let outcome = match self.shared.config.state_request_timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(result) => result.map_err(|_| SyncError::NotInitialized),
                Err(_) => {
                    self.shared.state.lock().pending_state = None;
                    warn!(target: "atrium::session", %session_id, "state request timed out");
                    return Err(SyncError::StateRequestTimeout);
                }
            },
            None => receiver.await.map_err(|_| SyncError::NotInitialized),
        };
        outcome
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        for task in self.shared.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

fn generate_client_id() -> String {
    format!("client-{:08x}", rand::random::<u32>())
}

async fn run_dispatcher(shared: Arc<Shared>, mut inbound: mpsc::UnboundedReceiver<BusMessage>) {
    while let Some(message) = inbound.recv().await {
        router::dispatch(&shared, message);
    }
}

async fn run_heartbeat(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(shared.config.heartbeat_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let envelope = {
            let state = shared.state.lock();
            match (state.phase, &state.client_id, state.session_id) {
                (Phase::InSession, Some(client_id), Some(session_id)) => Some(Envelope::new(
                    client_id.clone(),
                    shared.config.client_token.clone(),
                    session_id,
                )),
                _ => None,
            }
        };
        if let Some(envelope) = envelope {
            if let Err(err) = shared
                .publish(topics::session(SessionOp::Heartbeat), &BareMessage { envelope })
                .await
            {
                debug!(target: "atrium::session", error = %err, "heartbeat publish failed");
            }
        }
    }
}

/// Watches bus lifecycle events. The intentional-disconnect flag is
/// consumed exactly once per disconnect notification; only unexpected
/// drops with `auto_reconnect` set trigger the rejoin sequence.
async fn supervise(shared: Arc<Shared>, mut bus_events: broadcast::Receiver<BusEvent>) {
    loop {
        match bus_events.recv().await {
            Ok(BusEvent::Connected) | Ok(BusEvent::StateChanged(_)) => {}
            Ok(BusEvent::Error(error)) => {
                warn!(target: "atrium::session", %error, "bus error");
            }
            Ok(BusEvent::Disconnected { reason }) => {
                let rejoin = {
                    let mut state = shared.state.lock();
                    let intentional = std::mem::take(&mut state.intentional_disconnect);
                    // Entity state never survives a drop; the caller is
                    // expected to reconcile via get_session_state after a
                    // rejoin.
                    state.entities.clear();
                    state.retired.clear();
                    state.participants.clear();
                    state.pending_state = None;
                    if intentional || !state.auto_reconnect {
                        state.phase = Phase::Disconnected;
                        None
                    } else {
                        state.phase = Phase::Reconnecting;
                        Some((state.session_id, state.client_tag.clone()))
                    }
                };
                match rejoin {
                    None => {
                        debug!(target: "atrium::session", reason, "disconnected");
                    }
                    Some((session_id, client_tag)) => {
                        warn!(target: "atrium::session", reason, "unexpected disconnect, reconnecting");
                        reconnect(&shared, session_id, client_tag).await;
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(target: "atrium::session", skipped, "bus event stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn reconnect(shared: &Arc<Shared>, session_id: Option<Uuid>, client_tag: Option<String>) {
    let policy = shared.config.reconnect.clone();
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        if !policy.allows(attempt) {
            warn!(target: "atrium::session", attempt, "reconnect attempts exhausted");
            shared.state.lock().phase = Phase::Disconnected;
            return;
        }
        tokio::time::sleep(policy.delay_for(attempt)).await;
        if let Err(error) = shared.bus.connect().await {
            debug!(target: "atrium::session", attempt, %error, "reconnect attempt failed");
            continue;
        }
        if subscribe_pump(shared, topics::SESSION_DISCOVERY_FILTER).await.is_err() {
            continue;
        }
        match (session_id, client_tag.clone()) {
            (Some(session_id), Some(tag)) => {
                if subscribe_pump(shared, &topics::status_filter(session_id))
                    .await
                    .is_err()
                {
                    continue;
                }
                let Some(client_id) = shared.local_client_id() else {
                    shared.state.lock().phase = Phase::Connected;
                    return;
                };
                let request = JoinSessionRequest {
                    envelope: Envelope::new(
                        client_id,
                        shared.config.client_token.clone(),
                        session_id,
                    ),
                    client_tag: tag,
                };
                if shared
                    .publish(topics::session(SessionOp::Join), &request)
                    .await
                    .is_err()
                {
                    continue;
                }
                shared.state.lock().phase = Phase::InSession;
                shared.emit(SessionEvent::Reconnected { session_id });
                info!(target: "atrium::session", %session_id, attempt, "rejoined after reconnect");
            }
            _ => {
                shared.state.lock().phase = Phase::Connected;
                info!(target: "atrium::session", attempt, "reconnected");
            }
        }
        return;
    }
}
