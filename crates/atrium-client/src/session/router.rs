//! Maps inbound (topic, payload) pairs to handlers. Guards that apply to
//! every entity-bearing message run here, once, before kind-specific
//! handling: envelope decode, self-echo suppression and session scoping.

use std::sync::Arc;

use tracing::{debug, trace, warn};
use uuid::Uuid;

use atrium_bus::BusMessage;
use atrium_proto::{
    decode, decode_state_entity, BareMessage, NewClientNotice, NewSessionNotice, Route, SessionOp,
    SessionStateMessage, StatusKind, MessagePayload,
};

use super::{SessionEvent, Shared, StateSummary};
use crate::replica::incoming;

pub(crate) fn dispatch(shared: &Arc<Shared>, message: BusMessage) {
    let Some(route) = Route::parse(&message.topic) else {
        warn!(target: "atrium::router", topic = %message.topic, "unrecognized topic dropped");
        return;
    };
    match route {
        Route::Session(op) => handle_session(shared, op, &message.payload),
        Route::Status { session, kind } => handle_status(shared, session, kind, &message.payload),
        Route::Request { .. } => {
            // Request topics are consumed by the session service, not by
            // participants; seeing one here means an over-broad filter.
            trace!(target: "atrium::router", topic = %message.topic, "request topic ignored");
        }
    }
}

fn handle_session(shared: &Arc<Shared>, op: SessionOp, raw: &[u8]) {
    match op {
        SessionOp::New => match decode::<NewSessionNotice>(raw) {
            Ok(notice) => {
                let session_id = notice.envelope.session_id;
                {
                    let mut state = shared.state.lock();
                    if state.session_id == Some(session_id) {
                        state.session_tag = Some(notice.session_tag.clone());
                    }
                }
                shared.emit(SessionEvent::SessionAvailable {
                    session_id,
                    tag: notice.session_tag,
                });
            }
            Err(error) => warn!(target: "atrium::router", %error, "bad new-session notice"),
        },
        SessionOp::Closed => match decode::<BareMessage>(raw) {
            Ok(notice) => handle_session_closed(shared, notice.envelope.session_id),
            Err(error) => warn!(target: "atrium::router", %error, "bad session-closed notice"),
        },
        SessionOp::State => handle_state(shared, raw),
        // The remaining session-level topics carry participant requests;
        // other participants' requests are not ours to act on.
        SessionOp::Create
        | SessionOp::Destroy
        | SessionOp::Join
        | SessionOp::Exit
        | SessionOp::Heartbeat
        | SessionOp::GetState => {
            trace!(target: "atrium::router", op = op.as_str(), "session request ignored");
        }
    }
}

fn handle_session_closed(shared: &Arc<Shared>, session_id: Uuid) {
    let is_current = {
        let mut state = shared.state.lock();
        if state.session_id == Some(session_id) {
            state.clear_membership();
            state.phase = super::Phase::Connected;
            true
        } else {
            false
        }
    };
    if is_current {
        debug!(target: "atrium::session", %session_id, "session closed by the bus");
    }
    shared.emit(SessionEvent::SessionClosed { session_id });
}

fn handle_status(shared: &Arc<Shared>, session: Uuid, kind: StatusKind, raw: &[u8]) {
    // Scope guard: stale subscriptions can deliver traffic for a session
    // we are no longer part of.
    if shared.state.lock().session_id != Some(session) {
        trace!(target: "atrium::router", %session, "status for foreign session dropped");
        return;
    }

    match kind {
        StatusKind::NewClient => match decode::<NewClientNotice>(raw) {
            Ok(notice) => handle_new_client(shared, notice),
            Err(error) => warn!(target: "atrium::router", %error, "bad new-client notice"),
        },
        StatusKind::ClientLeft => match decode::<BareMessage>(raw) {
            Ok(notice) => {
                let client_id = notice.envelope.client_id;
                shared.state.lock().participants.remove(&client_id);
                shared.emit(SessionEvent::ClientLeft { client_id });
            }
            Err(error) => warn!(target: "atrium::router", %error, "bad client-left notice"),
        },
        StatusKind::State => handle_state(shared, raw),
        StatusKind::MessageNew => match decode::<MessagePayload>(raw) {
            Ok(payload) => shared.emit(SessionEvent::Message {
                topic: payload.topic,
                message: payload.message,
            }),
            Err(error) => warn!(target: "atrium::router", %error, "bad passthrough message"),
        },
        StatusKind::CreateEntity(kind) => {
            if is_self_echo(shared, raw) {
                return;
            }
            incoming::apply_create_message(shared, kind, raw);
        }
        StatusKind::Entity { id, prop } => {
            if is_self_echo(shared, raw) {
                return;
            }
            incoming::apply_update(shared, id, prop, raw);
        }
    }
}

/// Centralized echo guard: every entity status message whose sender is the
/// local client is a reflection of our own request and must produce no
/// local state change.
fn is_self_echo(shared: &Arc<Shared>, raw: &[u8]) -> bool {
    let Ok(message) = decode::<BareMessage>(raw) else {
        // Let the kind-specific decoder report the malformed payload.
        return false;
    };
    match shared.local_client_id() {
        Some(local) => message.envelope.client_id == local,
        None => false,
    }
}

fn handle_new_client(shared: &Arc<Shared>, notice: NewClientNotice) {
    let client_id = notice.envelope.client_id.clone();
    let is_self = shared.local_client_id().as_deref() == Some(client_id.as_str());
    {
        let mut state = shared.state.lock();
        if state.participants.contains_key(&client_id) {
            warn!(target: "atrium::session", %client_id, "duplicate participant dropped");
            return;
        }
        state.participants.insert(
            client_id.clone(),
            atrium_proto::ClientInfo {
                id: client_id.clone(),
                tag: notice.client_tag.clone(),
            },
        );
    }
    if !is_self {
        shared.emit(SessionEvent::ClientJoined {
            client_id,
            tag: notice.client_tag,
        });
    }
}

/// Full-state reconciliation: a wholesale replace, never a merge. Only the
/// response matching the pending request's session id is honored; anything
/// else is ignored while the request is outstanding.
fn handle_state(shared: &Arc<Shared>, raw: &[u8]) {
    let message = match decode::<SessionStateMessage>(raw) {
        Ok(message) => message,
        Err(error) => {
            warn!(target: "atrium::router", %error, "bad session state payload");
            return;
        }
    };

    let (mut pending, previous, participants) = {
        let mut state = shared.state.lock();
        let Some(pending) = state.pending_state.take() else {
            debug!(target: "atrium::session", "unsolicited session state dropped");
            return;
        };
        if pending.session_id != message.envelope.session_id {
            debug!(
                target: "atrium::session",
                got = %message.envelope.session_id,
                want = %pending.session_id,
                "state for different session ignored while pending"
            );
            state.pending_state = Some(pending);
            return;
        }

        // Participants are replaced wholesale; duplicate ids are a
        // warning, first occurrence wins.
        state.participants.clear();
        let mut participants = Vec::with_capacity(message.clients.len());
        for client in &message.clients {
            if state.participants.contains_key(&client.id) {
                warn!(target: "atrium::session", client = %client.id, "duplicate participant in state dropped");
                continue;
            }
            state.participants.insert(client.id.clone(), client.clone());
            participants.push(client.clone());
        }

        let previous: Vec<Uuid> = state.entities.drain().map(|(id, _)| id).collect();
        state.retired.clear();
        (pending, previous, participants)
    };

    // Delete everything we were replicating before re-instantiating the
    // listed set.
    for entity_id in previous {
        match shared.world.find_entity(entity_id) {
            Some(entity) => {
                if let Err(error) = shared.world.delete_entity(entity) {
                    warn!(target: "atrium::replica", %entity_id, %error, "stale entity delete failed");
                }
            }
            None => {
                warn!(target: "atrium::replica", %entity_id, "stale entity already gone");
            }
        }
    }

    let mut entity_ids = Vec::new();
    for value in &message.entities {
        match decode_state_entity(value) {
            Ok(create) => {
                let entity_id = create.entity_id;
                if incoming::apply_create_record(shared, create) {
                    entity_ids.push(entity_id);
                }
            }
            Err(error) => {
                warn!(target: "atrium::replica", %error, "state entity skipped");
            }
        }
    }

    let summary = StateSummary {
        participants,
        entities: entity_ids,
    };
    shared.emit(SessionEvent::StateReplaced {
        participants: summary.participants.len(),
        entities: summary.entities.len(),
    });
    if let Some(reply) = pending.reply.take() {
        let _ = reply.send(summary);
    }
}
