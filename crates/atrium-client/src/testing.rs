//! A miniature session service for tests and single-process sandboxes.
//! The real coordination service lives on the far side of the bus; this
//! relay reproduces just enough of its contract — request topics reflected
//! onto status topics, a session registry, and full-state responses — for
//! multiple clients on one [`atrium_bus::LocalBroker`] to exercise the
//! whole replication path.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use atrium_bus::{BusClient, BusMessage};
use atrium_proto::{
    decode, decode_create, encode, encode_state_entity, topics, BareMessage, ClientInfo,
    CreateSessionRequest, Envelope, EntityProperty, JoinSessionRequest, NewClientNotice,
    NewSessionNotice, RequestKind, Route, SessionOp, SessionStateMessage,
};

use crate::error::SyncResult;

/// Sender id stamped on messages the service itself originates.
const SERVICE_CLIENT_ID: &str = "session";

struct RelaySession {
    tag: String,
    clients: Vec<ClientInfo>,
    /// Entity records in creation order, stored in state-entry form.
    entities: Vec<(Uuid, Value)>,
}

pub struct SessionRelay {
    task: JoinHandle<()>,
}

impl SessionRelay {
    /// Connect the given bus client and start reflecting. The relay owns
    /// the connection for its lifetime. A single subscription covers the
    /// whole topic root so requests are observed in publish order.
    pub async fn start(bus: Arc<dyn BusClient>) -> SyncResult<Self> {
        bus.connect().await?;
        let receiver = bus.subscribe("vos/#").await?;
        let task = tokio::spawn(run(bus, receiver));
        Ok(Self { task })
    }
}

impl Drop for SessionRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(bus: Arc<dyn BusClient>, mut receiver: tokio::sync::mpsc::UnboundedReceiver<BusMessage>) {
    let mut sessions: HashMap<Uuid, RelaySession> = HashMap::new();
    while let Some(message) = receiver.recv().await {
        handle(&bus, &mut sessions, message).await;
    }
}

async fn handle(
    bus: &Arc<dyn BusClient>,
    sessions: &mut HashMap<Uuid, RelaySession>,
    message: BusMessage,
) {
    let Some(route) = Route::parse(&message.topic) else {
        return;
    };
    match route {
        Route::Session(op) => handle_session_request(bus, sessions, op, &message.payload).await,
        Route::Request { session, kind } => {
            handle_entity_request(bus, sessions, session, kind, &message.payload).await;
        }
        // Status topics are the relay's own output.
        Route::Status { .. } => {}
    }
}

async fn handle_session_request(
    bus: &Arc<dyn BusClient>,
    sessions: &mut HashMap<Uuid, RelaySession>,
    op: SessionOp,
    raw: &[u8],
) {
    match op {
        SessionOp::Create => {
            let Ok(request) = decode::<CreateSessionRequest>(raw) else {
                return;
            };
            let session_id = request.envelope.session_id;
            sessions.entry(session_id).or_insert_with(|| RelaySession {
                tag: request.session_tag.clone(),
                clients: Vec::new(),
                entities: Vec::new(),
            });
            // The broadcast reuses the creator's envelope so traceability
            // survives the reflection.
            publish(
                bus,
                topics::session(SessionOp::New),
                &NewSessionNotice {
                    envelope: request.envelope,
                    session_tag: request.session_tag,
                },
            )
            .await;
        }
        SessionOp::Join => {
            let Ok(request) = decode::<JoinSessionRequest>(raw) else {
                return;
            };
            let session_id = request.envelope.session_id;
            let Some(session) = sessions.get_mut(&session_id) else {
                warn!(target: "atrium::relay", %session_id, "join for unknown session ignored");
                return;
            };
            let client_id = request.envelope.client_id.clone();
            if !session.clients.iter().any(|client| client.id == client_id) {
                session.clients.push(ClientInfo {
                    id: client_id,
                    tag: request.client_tag.clone(),
                });
            }
            publish(
                bus,
                topics::status_new_client(session_id),
                &NewClientNotice {
                    envelope: request.envelope,
                    client_tag: request.client_tag,
                },
            )
            .await;
        }
        SessionOp::Exit => {
            let Ok(request) = decode::<BareMessage>(raw) else {
                return;
            };
            let session_id = request.envelope.session_id;
            if let Some(session) = sessions.get_mut(&session_id) {
                session
                    .clients
                    .retain(|client| client.id != request.envelope.client_id);
            }
            publish(
                bus,
                topics::status_client_left(session_id),
                &BareMessage {
                    envelope: request.envelope,
                },
            )
            .await;
        }
        SessionOp::Destroy => {
            let Ok(request) = decode::<BareMessage>(raw) else {
                return;
            };
            let session_id = request.envelope.session_id;
            if let Some(session) = sessions.remove(&session_id) {
                debug!(target: "atrium::relay", %session_id, tag = %session.tag, "session destroyed");
            }
            publish(
                bus,
                topics::session(SessionOp::Closed),
                &BareMessage {
                    envelope: request.envelope,
                },
            )
            .await;
        }
        SessionOp::GetState => {
            let Ok(request) = decode::<BareMessage>(raw) else {
                return;
            };
            let session_id = request.envelope.session_id;
            let Some(session) = sessions.get(&session_id) else {
                warn!(target: "atrium::relay", %session_id, "state request for unknown session ignored");
                return;
            };
            let response = SessionStateMessage {
                envelope: Envelope::new(SERVICE_CLIENT_ID, "", session_id),
                clients: session.clients.clone(),
                entities: session
                    .entities
                    .iter()
                    .map(|(_, value)| value.clone())
                    .collect(),
            };
            publish(bus, topics::status_state(session_id), &response).await;
        }
        SessionOp::Heartbeat => {
            if let Ok(request) = decode::<BareMessage>(raw) {
                debug!(
                    target: "atrium::relay",
                    client = %request.envelope.client_id,
                    "heartbeat"
                );
            }
        }
        // The relay's own broadcasts come back on the same filter.
        SessionOp::New | SessionOp::Closed | SessionOp::State => {}
    }
}

async fn handle_entity_request(
    bus: &Arc<dyn BusClient>,
    sessions: &mut HashMap<Uuid, RelaySession>,
    session_id: Uuid,
    kind: RequestKind,
    raw: &[u8],
) {
    let Some(session) = sessions.get_mut(&session_id) else {
        warn!(target: "atrium::relay", %session_id, "request for unknown session ignored");
        return;
    };
    match kind {
        RequestKind::CreateEntity(entity_kind) => {
            match decode_create(entity_kind, raw) {
                Ok((_, create)) => {
                    if !session.entities.iter().any(|(id, _)| *id == create.entity_id) {
                        match encode_state_entity(&create) {
                            Ok(value) => session.entities.push((create.entity_id, value)),
                            Err(error) => {
                                warn!(target: "atrium::relay", %error, "entity record not stored");
                            }
                        }
                    }
                }
                Err(error) => {
                    warn!(target: "atrium::relay", %error, "bad creation request still relayed");
                }
            }
            republish(bus, topics::status_create(session_id, entity_kind), raw).await;
        }
        RequestKind::Entity { id, prop } => {
            patch_entity_record(session, id, prop, raw);
            republish(bus, topics::status_entity(session_id, id, prop), raw).await;
        }
        RequestKind::MessageCreate => {
            republish(bus, topics::status_message(session_id), raw).await;
        }
    }
}

/// Keep the stored creation records current enough that a later full-state
/// response reflects the session as it stands.
fn patch_entity_record(session: &mut RelaySession, id: Uuid, prop: EntityProperty, raw: &[u8]) {
    match prop {
        EntityProperty::Delete | EntityProperty::Remove => {
            session.entities.retain(|(entity_id, _)| *entity_id != id);
            return;
        }
        _ => {}
    }
    let Some((_, record)) = session
        .entities
        .iter_mut()
        .find(|(entity_id, _)| *entity_id == id)
    else {
        return;
    };
    let Some(object) = record.as_object_mut() else {
        return;
    };
    let Ok(value) = serde_json::from_slice::<Value>(raw) else {
        return;
    };
    match prop {
        EntityProperty::Position | EntityProperty::Rotation => {
            let field = prop.as_str();
            if let Some(update) = value.get(field) {
                object.insert(field.to_string(), update.clone());
            }
        }
        EntityProperty::Scale => {
            if let Some(update) = value.get("scale") {
                object.insert("scale".into(), update.clone());
                object.remove("size");
            }
        }
        EntityProperty::Size => {
            if let Some(update) = value.get("size") {
                object.insert("size".into(), update.clone());
                object.remove("scale");
            }
        }
        EntityProperty::Parent => {
            match value.get("parent-id") {
                Some(Value::Null) | None => object.remove("parent-id"),
                Some(update) => object.insert("parent-id".into(), update.clone()),
            };
        }
        EntityProperty::TerrainMod => {
            if let Some(modification) = value.get("modification") {
                let log = object
                    .entry("terrain-modification")
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Some(log) = log.as_array_mut() {
                    log.push(modification.clone());
                }
            }
        }
        // Remaining properties are not part of the creation record.
        _ => {}
    }
}

async fn publish<T: serde::Serialize>(bus: &Arc<dyn BusClient>, topic: String, payload: &T) {
    match encode(payload) {
        Ok(raw) => {
            if let Err(error) = bus.publish(&topic, Bytes::from(raw)).await {
                warn!(target: "atrium::relay", %topic, %error, "relay publish failed");
            }
        }
        Err(error) => warn!(target: "atrium::relay", %topic, %error, "relay encode failed"),
    }
}

async fn republish(bus: &Arc<dyn BusClient>, topic: String, raw: &[u8]) {
    if let Err(error) = bus.publish(&topic, Bytes::copy_from_slice(raw)).await {
        warn!(target: "atrium::relay", %topic, %error, "relay republish failed");
    }
}
