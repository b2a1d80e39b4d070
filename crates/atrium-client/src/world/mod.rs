//! Narrow interface to the external world store. The replicator reads and
//! writes entities exclusively through [`WorldBridge`]; geometry, physics
//! and script execution stay on the far side of this trait.

mod memory;

pub use memory::{MemoryWorld, WorldEntity};

use thiserror::Error;
use uuid::Uuid;

use atrium_proto::{
    AirplaneFields, AudioFields, AutomobileFields, ButtonFields, CanvasKind, CharacterFields,
    DropdownFields, EntityKind, HtmlFields, ImageFields, InputFields, InteractionState, MeshFields,
    Quat, TerrainFields, TerrainKind, TerrainModification, TextFields, Vec3,
};

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("entity {0} does not exist in the world")]
    NotFound(Uuid),
    #[error("world backend error: {0}")]
    Backend(String),
}

/// Opaque handle to a world entity, enough for the replicator to route
/// property writes and validate terrain operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityRef {
    pub id: Uuid,
    pub kind: EntityKind,
    /// Set only for terrain entities.
    pub terrain_kind: Option<TerrainKind>,
}

/// A parsed automobile wheel definition. The wire carries these as
/// `"<submesh>:<radius>"` strings; parsing failures are per-entry
/// warnings, not errors.
#[derive(Debug, Clone, PartialEq)]
pub struct Wheel {
    pub submesh: String,
    pub radius: f64,
}

impl Wheel {
    pub fn parse(raw: &str) -> Option<Wheel> {
        let (submesh, radius) = raw.split_once(':')?;
        if submesh.is_empty() {
            return None;
        }
        let radius: f64 = radius.trim().parse().ok()?;
        Some(Wheel {
            submesh: submesh.to_string(),
            radius,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Motion {
    pub angular_velocity: Vec3,
    pub velocity: Vec3,
    pub stationary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhysicalProperties {
    pub angular_drag: f64,
    pub center_of_mass: Vec3,
    pub drag: f64,
    pub gravitational: bool,
    pub mass: f64,
}

/// Entities are created invisible; the replicator makes them visible once
/// fully configured. Loaders return the id actually assigned, which must
/// equal the requested id for replicated entities.
pub trait WorldBridge: Send + Sync {
    fn find_entity(&self, id: Uuid) -> Option<EntityRef>;
    fn exists(&self, id: Uuid) -> bool;

    fn load_mesh(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &MeshFields,
    ) -> Result<Uuid, WorldError>;
    fn load_container(&self, id: Uuid, parent: Option<Uuid>) -> Result<Uuid, WorldError>;
    fn load_character(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &CharacterFields,
    ) -> Result<Uuid, WorldError>;
    fn load_button(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &ButtonFields,
    ) -> Result<Uuid, WorldError>;
    fn load_canvas(&self, id: Uuid, parent: Option<Uuid>) -> Result<Uuid, WorldError>;
    fn load_input(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &InputFields,
    ) -> Result<Uuid, WorldError>;
    fn load_light(&self, id: Uuid, parent: Option<Uuid>) -> Result<Uuid, WorldError>;
    fn load_terrain(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &TerrainFields,
    ) -> Result<Uuid, WorldError>;
    fn load_text(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &TextFields,
    ) -> Result<Uuid, WorldError>;
    fn load_voxel(&self, id: Uuid, parent: Option<Uuid>) -> Result<Uuid, WorldError>;
    fn load_airplane(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &AirplaneFields,
    ) -> Result<Uuid, WorldError>;
    fn load_audio(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &AudioFields,
    ) -> Result<Uuid, WorldError>;
    fn load_automobile(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &AutomobileFields,
        wheels: &[Wheel],
    ) -> Result<Uuid, WorldError>;
    fn load_dropdown(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &DropdownFields,
    ) -> Result<Uuid, WorldError>;
    fn load_html(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &HtmlFields,
    ) -> Result<Uuid, WorldError>;
    fn load_image(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &ImageFields,
    ) -> Result<Uuid, WorldError>;

    fn set_tag(&self, entity: EntityRef, tag: &str) -> Result<(), WorldError>;
    fn set_position(&self, entity: EntityRef, position: Vec3) -> Result<(), WorldError>;
    fn set_rotation(&self, entity: EntityRef, rotation: Quat) -> Result<(), WorldError>;
    fn set_scale(&self, entity: EntityRef, scale: Vec3) -> Result<(), WorldError>;
    fn set_size(&self, entity: EntityRef, size: Vec3) -> Result<(), WorldError>;
    fn set_visibility(&self, entity: EntityRef, visible: bool) -> Result<(), WorldError>;
    fn set_parent(&self, entity: EntityRef, parent: Option<Uuid>) -> Result<(), WorldError>;
    fn set_motion(&self, entity: EntityRef, motion: Motion) -> Result<(), WorldError>;
    fn set_physical_properties(
        &self,
        entity: EntityRef,
        properties: PhysicalProperties,
    ) -> Result<(), WorldError>;
    fn set_highlight(&self, entity: EntityRef, highlighted: bool) -> Result<(), WorldError>;
    fn set_interaction_state(
        &self,
        entity: EntityRef,
        state: InteractionState,
    ) -> Result<(), WorldError>;
    fn set_canvas_type(&self, entity: EntityRef, kind: CanvasKind) -> Result<(), WorldError>;

    fn build_terrain(
        &self,
        entity: EntityRef,
        modification: &TerrainModification,
    ) -> Result<(), WorldError>;
    fn dig_terrain(
        &self,
        entity: EntityRef,
        modification: &TerrainModification,
    ) -> Result<(), WorldError>;

    fn delete_entity(&self, entity: EntityRef) -> Result<(), WorldError>;
}
