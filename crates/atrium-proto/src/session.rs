use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::Envelope;

/// A session participant as it appears in membership payloads. The
/// authentication token never appears here; it travels only on envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClientInfo {
    pub id: String,
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateSessionRequest {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub session_tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JoinSessionRequest {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub client_tag: String,
}

/// Payload shape shared by destroy/leave/heartbeat/get-state requests and
/// the closed/client-left notices: nothing beyond the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BareMessage {
    #[serde(flatten)]
    pub envelope: Envelope,
}

/// Broadcast confirming a session now exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NewSessionNotice {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub session_tag: String,
}

/// Broadcast announcing a new participant. The envelope's client id is the
/// joiner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NewClientNotice {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    pub client_tag: String,
}

/// Full-state response. Entities are kept as raw objects here; each entry
/// carries a `kind` field and is decoded through
/// [`crate::wire::decode_state_entity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionStateMessage {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    pub clients: Vec<ClientInfo>,
    #[serde(default)]
    pub entities: Vec<Value>,
}
