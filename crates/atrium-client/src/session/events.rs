use uuid::Uuid;

use atrium_proto::EntityKind;

/// Notifications surfaced to the embedding application. Delivered on a
/// broadcast channel; slow consumers may observe lag, never blocking the
/// dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A session now exists somewhere on the bus.
    SessionAvailable { session_id: Uuid, tag: String },
    /// The current session was closed bus-side.
    SessionClosed { session_id: Uuid },
    ClientJoined { client_id: String, tag: String },
    ClientLeft { client_id: String },
    /// A remote participant's entity was instantiated locally.
    EntityReplicated { entity_id: Uuid, kind: EntityKind },
    /// A remote delete removed the entity from the local world.
    EntityDeleted { entity_id: Uuid },
    /// A remote remove stopped replication; the local entity survives.
    EntityRemoved { entity_id: Uuid },
    /// Generic pub/sub passthrough traffic.
    Message { topic: String, message: String },
    /// A full-state response was applied wholesale.
    StateReplaced { participants: usize, entities: usize },
    /// An unexpected drop was recovered and the session rejoined.
    Reconnected { session_id: Uuid },
}
