use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields carried on every request and status message. The message id is
/// used only for traceability; deduplication happens on entity ids, never
/// on message ids. The token is forwarded opaquely and never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Envelope {
    pub message_id: Uuid,
    pub client_id: String,
    #[serde(default)]
    pub client_token: String,
    pub session_id: Uuid,
}

impl Envelope {
    pub fn new(client_id: impl Into<String>, client_token: impl Into<String>, session_id: Uuid) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            client_id: client_id.into(),
            client_token: client_token.into(),
            session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_uses_wire_field_names() {
        let env = Envelope::new("client-1", "tok", Uuid::nil());
        let value = serde_json::to_value(&env).unwrap();
        let obj = value.as_object().unwrap();
        for key in ["message-id", "client-id", "client-token", "session-id"] {
            assert!(obj.contains_key(key), "missing field {key}");
        }
    }

    #[test]
    fn missing_token_decodes_to_empty() {
        let raw = format!(
            r#"{{"message-id":"{}","client-id":"c","session-id":"{}"}}"#,
            Uuid::new_v4(),
            Uuid::nil()
        );
        let env: Envelope = serde_json::from_str(&raw).unwrap();
        assert!(env.client_token.is_empty());
    }
}
