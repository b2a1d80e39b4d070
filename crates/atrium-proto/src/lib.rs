//! Wire protocol for the atrium session bus.
//! Keeping this in a dedicated crate allows the payload schema to be
//! reused by tooling and test harnesses without pulling in the runtime.

pub mod entity;
pub mod envelope;
pub mod geometry;
pub mod session;
pub mod topics;
pub mod update;
pub mod wire;

pub use entity::{
    AirplaneFields, AudioFields, AutomobileFields, ButtonFields, CharacterFields, DropdownFields,
    EntityCreate, EntityCreateSpec, EntityKind, HtmlFields, ImageFields, InputFields, MeshFields,
    TerrainBrush, TerrainFields, TerrainKind, TerrainLayer, TerrainModification, TerrainOperation,
    TextFields,
};
pub use envelope::Envelope;
pub use geometry::{Extent, Quat, Vec2, Vec3};
pub use session::{
    BareMessage, ClientInfo, CreateSessionRequest, JoinSessionRequest, NewClientNotice,
    NewSessionNotice, SessionStateMessage,
};
pub use topics::{EntityProperty, RequestKind, Route, SessionOp, StatusKind};
pub use update::{
    CanvasKind, CanvasTypeUpdate, HighlightUpdate, InteractionState, InteractionStateUpdate,
    MessagePayload, MotionUpdate, ParentUpdate, PhysicalPropertiesUpdate, PositionUpdate,
    RotationUpdate, ScaleUpdate, SizeUpdate, TerrainModUpdate, VisibilityUpdate,
};
pub use wire::{
    decode, decode_create, decode_state_entity, encode, encode_create, encode_state_entity,
    WireError,
};
