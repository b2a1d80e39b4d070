//! In-memory world store used by tests and single-process sandboxes. It
//! records everything the bridge is asked to do so assertions can inspect
//! the resulting replica.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use atrium_proto::{
    AirplaneFields, AudioFields, AutomobileFields, ButtonFields, CanvasKind, CharacterFields,
    DropdownFields, EntityKind, HtmlFields, ImageFields, InputFields, InteractionState, MeshFields,
    Quat, TerrainFields, TerrainKind, TerrainModification, TerrainOperation, TextFields, Vec3,
};

use super::{EntityRef, Motion, PhysicalProperties, Wheel, WorldBridge, WorldError};

#[derive(Debug, Clone)]
pub struct WorldEntity {
    pub id: Uuid,
    pub kind: EntityKind,
    pub terrain_kind: Option<TerrainKind>,
    pub tag: String,
    pub parent: Option<Uuid>,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Option<Vec3>,
    pub size: Option<Vec3>,
    pub visible: bool,
    pub highlighted: bool,
    pub interaction_state: InteractionState,
    pub canvas_kind: CanvasKind,
    pub motion: Motion,
    pub physical: PhysicalProperties,
    /// `(slot, source)` pairs for script callback fields; execution is the
    /// embedder's script facility, recorded here verbatim.
    pub callbacks: Vec<(String, String)>,
    /// Primary resource path for mesh-backed kinds.
    pub asset: Option<String>,
    pub wheels: Vec<Wheel>,
    pub terrain_log: Vec<TerrainModification>,
}

impl WorldEntity {
    fn new(id: Uuid, kind: EntityKind, parent: Option<Uuid>) -> Self {
        Self {
            id,
            kind,
            terrain_kind: None,
            tag: String::new(),
            parent,
            position: Vec3::default(),
            rotation: Quat::IDENTITY,
            scale: Some(Vec3::splat(1.0)),
            size: None,
            visible: false,
            highlighted: false,
            interaction_state: InteractionState::default(),
            canvas_kind: CanvasKind::default(),
            motion: Motion::default(),
            physical: PhysicalProperties::default(),
            callbacks: Vec::new(),
            asset: None,
            wheels: Vec::new(),
            terrain_log: Vec::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryWorld {
    entities: Arc<RwLock<HashMap<Uuid, WorldEntity>>>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<WorldEntity> {
        self.entities.read().get(&id).cloned()
    }

    pub fn count(&self) -> usize {
        self.entities.read().len()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.entities.read().keys().copied().collect()
    }

    /// Place a pre-existing local entity, as the embedding application
    /// would before announcing it for replication.
    pub fn spawn(&self, id: Uuid, kind: EntityKind) -> EntityRef {
        self.spawn_with_parent(id, kind, None)
    }

    pub fn spawn_with_parent(&self, id: Uuid, kind: EntityKind, parent: Option<Uuid>) -> EntityRef {
        let mut entity = WorldEntity::new(id, kind, parent);
        entity.visible = true;
        if kind == EntityKind::Terrain {
            entity.terrain_kind = Some(TerrainKind::Hybrid);
        }
        let terrain_kind = entity.terrain_kind;
        self.entities.write().insert(id, entity);
        EntityRef {
            id,
            kind,
            terrain_kind,
        }
    }

    /// Override a terrain entity's sub-kind (tests use this to model
    /// heightmap-only terrains).
    pub fn set_terrain_kind(&self, id: Uuid, terrain_kind: TerrainKind) {
        if let Some(entity) = self.entities.write().get_mut(&id) {
            entity.terrain_kind = Some(terrain_kind);
        }
    }

    fn insert(&self, entity: WorldEntity) -> Result<Uuid, WorldError> {
        let id = entity.id;
        let mut entities = self.entities.write();
        if entities.contains_key(&id) {
            return Err(WorldError::Backend(format!("entity {id} already loaded")));
        }
        entities.insert(id, entity);
        Ok(id)
    }

    fn update<T>(
        &self,
        entity: EntityRef,
        mutate: impl FnOnce(&mut WorldEntity) -> T,
    ) -> Result<T, WorldError> {
        let mut entities = self.entities.write();
        let record = entities
            .get_mut(&entity.id)
            .ok_or(WorldError::NotFound(entity.id))?;
        Ok(mutate(record))
    }
}

impl WorldBridge for MemoryWorld {
    fn find_entity(&self, id: Uuid) -> Option<EntityRef> {
        self.entities.read().get(&id).map(|entity| EntityRef {
            id: entity.id,
            kind: entity.kind,
            terrain_kind: entity.terrain_kind,
        })
    }

    fn exists(&self, id: Uuid) -> bool {
        self.entities.read().contains_key(&id)
    }

    fn load_mesh(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &MeshFields,
    ) -> Result<Uuid, WorldError> {
        let mut entity = WorldEntity::new(id, EntityKind::Mesh, parent);
        entity.asset = Some(fields.mesh_object.clone());
        self.insert(entity)
    }

    fn load_container(&self, id: Uuid, parent: Option<Uuid>) -> Result<Uuid, WorldError> {
        self.insert(WorldEntity::new(id, EntityKind::Container, parent))
    }

    fn load_character(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &CharacterFields,
    ) -> Result<Uuid, WorldError> {
        let mut entity = WorldEntity::new(id, EntityKind::Character, parent);
        entity.asset = fields.mesh_object.clone();
        self.insert(entity)
    }

    fn load_button(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &ButtonFields,
    ) -> Result<Uuid, WorldError> {
        let mut entity = WorldEntity::new(id, EntityKind::Button, parent);
        if let Some(source) = &fields.on_click {
            entity.callbacks.push(("on-click".into(), source.clone()));
        }
        self.insert(entity)
    }

    fn load_canvas(&self, id: Uuid, parent: Option<Uuid>) -> Result<Uuid, WorldError> {
        self.insert(WorldEntity::new(id, EntityKind::Canvas, parent))
    }

    fn load_input(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        _fields: &InputFields,
    ) -> Result<Uuid, WorldError> {
        self.insert(WorldEntity::new(id, EntityKind::Input, parent))
    }

    fn load_light(&self, id: Uuid, parent: Option<Uuid>) -> Result<Uuid, WorldError> {
        self.insert(WorldEntity::new(id, EntityKind::Light, parent))
    }

    fn load_terrain(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &TerrainFields,
    ) -> Result<Uuid, WorldError> {
        let mut entity = WorldEntity::new(id, EntityKind::Terrain, parent);
        entity.terrain_kind = Some(fields.terrain_kind);
        entity.terrain_log = fields.modifications.clone();
        self.insert(entity)
    }

    fn load_text(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &TextFields,
    ) -> Result<Uuid, WorldError> {
        let mut entity = WorldEntity::new(id, EntityKind::Text, parent);
        entity.asset = Some(fields.text.clone());
        self.insert(entity)
    }

    fn load_voxel(&self, id: Uuid, parent: Option<Uuid>) -> Result<Uuid, WorldError> {
        self.insert(WorldEntity::new(id, EntityKind::Voxel, parent))
    }

    fn load_airplane(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &AirplaneFields,
    ) -> Result<Uuid, WorldError> {
        let mut entity = WorldEntity::new(id, EntityKind::Airplane, parent);
        entity.asset = Some(fields.mesh_object.clone());
        entity.physical.mass = fields.mass;
        self.insert(entity)
    }

    fn load_audio(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &AudioFields,
    ) -> Result<Uuid, WorldError> {
        let mut entity = WorldEntity::new(id, EntityKind::Audio, parent);
        entity.asset = Some(fields.audio_file.clone());
        self.insert(entity)
    }

    fn load_automobile(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &AutomobileFields,
        wheels: &[Wheel],
    ) -> Result<Uuid, WorldError> {
        let mut entity = WorldEntity::new(id, EntityKind::Automobile, parent);
        entity.asset = Some(fields.mesh_object.clone());
        entity.physical.mass = fields.mass;
        entity.wheels = wheels.to_vec();
        self.insert(entity)
    }

    fn load_dropdown(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &DropdownFields,
    ) -> Result<Uuid, WorldError> {
        let mut entity = WorldEntity::new(id, EntityKind::Dropdown, parent);
        if let Some(source) = &fields.on_change {
            entity.callbacks.push(("on-change".into(), source.clone()));
        }
        self.insert(entity)
    }

    fn load_html(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &HtmlFields,
    ) -> Result<Uuid, WorldError> {
        let mut entity = WorldEntity::new(id, EntityKind::Html, parent);
        entity.asset = fields.url.clone();
        if let Some(source) = &fields.on_message {
            entity.callbacks.push(("on-message".into(), source.clone()));
        }
        self.insert(entity)
    }

    fn load_image(
        &self,
        id: Uuid,
        parent: Option<Uuid>,
        fields: &ImageFields,
    ) -> Result<Uuid, WorldError> {
        let mut entity = WorldEntity::new(id, EntityKind::Image, parent);
        entity.asset = Some(fields.image_file.clone());
        self.insert(entity)
    }

    fn set_tag(&self, entity: EntityRef, tag: &str) -> Result<(), WorldError> {
        self.update(entity, |record| record.tag = tag.to_string())
    }

    fn set_position(&self, entity: EntityRef, position: Vec3) -> Result<(), WorldError> {
        self.update(entity, |record| record.position = position)
    }

    fn set_rotation(&self, entity: EntityRef, rotation: Quat) -> Result<(), WorldError> {
        self.update(entity, |record| record.rotation = rotation)
    }

    fn set_scale(&self, entity: EntityRef, scale: Vec3) -> Result<(), WorldError> {
        self.update(entity, |record| {
            record.scale = Some(scale);
            record.size = None;
        })
    }

    fn set_size(&self, entity: EntityRef, size: Vec3) -> Result<(), WorldError> {
        self.update(entity, |record| {
            record.size = Some(size);
            record.scale = None;
        })
    }

    fn set_visibility(&self, entity: EntityRef, visible: bool) -> Result<(), WorldError> {
        self.update(entity, |record| record.visible = visible)
    }

    fn set_parent(&self, entity: EntityRef, parent: Option<Uuid>) -> Result<(), WorldError> {
        self.update(entity, |record| record.parent = parent)
    }

    fn set_motion(&self, entity: EntityRef, motion: Motion) -> Result<(), WorldError> {
        self.update(entity, |record| record.motion = motion)
    }

    fn set_physical_properties(
        &self,
        entity: EntityRef,
        properties: PhysicalProperties,
    ) -> Result<(), WorldError> {
        self.update(entity, |record| record.physical = properties)
    }

    fn set_highlight(&self, entity: EntityRef, highlighted: bool) -> Result<(), WorldError> {
        self.update(entity, |record| record.highlighted = highlighted)
    }

    fn set_interaction_state(
        &self,
        entity: EntityRef,
        state: InteractionState,
    ) -> Result<(), WorldError> {
        self.update(entity, |record| record.interaction_state = state)
    }

    fn set_canvas_type(&self, entity: EntityRef, kind: CanvasKind) -> Result<(), WorldError> {
        self.update(entity, |record| record.canvas_kind = kind)
    }

    fn build_terrain(
        &self,
        entity: EntityRef,
        modification: &TerrainModification,
    ) -> Result<(), WorldError> {
        debug_assert_eq!(modification.operation, TerrainOperation::Build);
        self.update(entity, |record| {
            record.terrain_log.push(modification.clone());
        })
    }

    fn dig_terrain(
        &self,
        entity: EntityRef,
        modification: &TerrainModification,
    ) -> Result<(), WorldError> {
        debug_assert_eq!(modification.operation, TerrainOperation::Dig);
        self.update(entity, |record| {
            record.terrain_log.push(modification.clone());
        })
    }

    fn delete_entity(&self, entity: EntityRef) -> Result<(), WorldError> {
        self.entities
            .write()
            .remove(&entity.id)
            .map(|_| ())
            .ok_or(WorldError::NotFound(entity.id))
    }
}
