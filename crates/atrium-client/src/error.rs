use thiserror::Error;
use uuid::Uuid;

use crate::world::WorldError;

/// Failure taxonomy for the public API. The first four variants are the
/// independent precondition guards run by every mutating operation; they
/// are programmer errors and nothing is published when one fires.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("synchronizer is not connected to the bus")]
    NotInitialized,
    #[error("no active session")]
    NotInSession,
    #[error("client id has not been assigned")]
    NoClientId,
    #[error("entity {0} is not known to the synchronizer")]
    InvalidEntity(Uuid),

    #[error("already joined a session")]
    AlreadyInSession,
    #[error("entity {0} already entered replication this session")]
    AlreadyReplicated(Uuid),
    #[error("a session state request is already pending")]
    StateRequestPending,
    #[error("session state request timed out")]
    StateRequestTimeout,
    #[error("structurally invalid entity: {0}")]
    Structural(String),

    #[error(transparent)]
    Bus(#[from] atrium_bus::BusError),
    #[error(transparent)]
    Wire(#[from] atrium_proto::WireError),
    #[error(transparent)]
    World(#[from] WorldError),
}

pub type SyncResult<T> = Result<T, SyncError>;
