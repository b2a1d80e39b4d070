//! Session synchronization client for shared virtual worlds. Keeps a
//! local replica of a session's entity graph consistent with the copies
//! held by other participants, over a pub/sub message bus.

pub mod config;
pub mod error;
pub mod offset;
pub mod replica;
pub mod session;
pub mod telemetry;
pub mod testing;
pub mod world;

pub use config::{ReconnectPolicy, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use offset::OffsetTransform;
pub use replica::EntityReplicator;
pub use session::{Phase, SessionController, SessionEvent, StateSummary, SyncManager};
pub use world::{MemoryWorld, WorldBridge};
