//! Entity replication: announcing local entities, mirroring local
//! mutations onto the bus, and applying remote messages to the local
//! world. Outgoing operations run four independent guard clauses (not
//! initialized / not in session / no client id / invalid entity) and
//! publish nothing when any of them fires.

pub(crate) mod incoming;

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use atrium_proto::{
    topics, CanvasKind, CanvasTypeUpdate, EntityCreate, EntityCreateSpec, EntityKind,
    EntityProperty, HighlightUpdate, InteractionState, InteractionStateUpdate, BareMessage,
    MessagePayload, MotionUpdate, ParentUpdate, PhysicalPropertiesUpdate, PositionUpdate, Quat,
    RotationUpdate, ScaleUpdate, SizeUpdate, TerrainKind, TerrainModUpdate, TerrainModification,
    TerrainOperation, TextFields, Vec3, VisibilityUpdate,
};

use crate::error::{SyncError, SyncResult};
use crate::session::{Shared, TrackedEntity};
use crate::world::{Motion, PhysicalProperties, Wheel};

pub struct EntityReplicator {
    shared: Arc<Shared>,
}

impl EntityReplicator {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Ids currently replicated by this participant.
    pub fn tracked_entities(&self) -> Vec<Uuid> {
        self.shared.state.lock().entities.keys().copied().collect()
    }

    pub fn is_tracked(&self, entity_id: Uuid) -> bool {
        self.shared.state.lock().entities.contains_key(&entity_id)
    }

    /// Announce an already-existing local entity and start mirroring its
    /// mutations. Fails without publishing on any guard or structural
    /// violation; on success the entity has entered replication and later
    /// local mutations must be mirrored through the setters here.
    pub async fn add_synchronized_entity(&self, create: EntityCreate) -> SyncResult<()> {
        let (session_id, envelope) = self.shared.session_envelope()?;
        if !self.shared.world.exists(create.entity_id) {
            return Err(SyncError::InvalidEntity(create.entity_id));
        }
        {
            let state = self.shared.state.lock();
            if state.entities.contains_key(&create.entity_id)
                || state.retired.contains(&create.entity_id)
            {
                return Err(SyncError::AlreadyReplicated(create.entity_id));
            }
        }
        self.validate_structure(&create)?;

        let kind = create.kind();
        let mut outbound = create;
        outbound.position = self.shared.offset.to_session(outbound.position);
        let raw = atrium_proto::encode_create(&envelope, &outbound)?;
        self.shared
            .bus
            .publish(
                &topics::request_create(session_id, kind),
                bytes::Bytes::from(raw),
            )
            .await?;

        self.shared
            .state
            .lock()
            .entities
            .insert(outbound.entity_id, TrackedEntity { kind });
        debug!(target: "atrium::replica", entity = %outbound.entity_id, %kind, "entity announced");
        Ok(())
    }

    /// Stop mirroring without touching the local entity.
    pub async fn remove_synchronized_entity(&self, entity_id: Uuid) -> SyncResult<()> {
        let (session_id, envelope, _) = self.entity_envelope(entity_id)?;
        self.shared
            .publish(
                topics::request_entity(session_id, entity_id, EntityProperty::Remove),
                &BareMessage { envelope },
            )
            .await?;
        let mut state = self.shared.state.lock();
        state.entities.remove(&entity_id);
        state.retired.insert(entity_id);
        debug!(target: "atrium::replica", entity = %entity_id, "entity removed from replication");
        Ok(())
    }

    /// Delete everywhere: locally, from the replicated set, and (through
    /// status propagation) from every other participant's world.
    pub async fn delete_synchronized_entity(&self, entity_id: Uuid) -> SyncResult<()> {
        let (session_id, envelope, _) = self.entity_envelope(entity_id)?;
        self.shared
            .publish(
                topics::request_entity(session_id, entity_id, EntityProperty::Delete),
                &BareMessage { envelope },
            )
            .await?;
        {
            let mut state = self.shared.state.lock();
            state.entities.remove(&entity_id);
            state.retired.insert(entity_id);
        }
        // The status echo is suppressed locally, so the local world delete
        // happens here.
        if let Some(entity) = self.shared.world.find_entity(entity_id) {
            self.shared.world.delete_entity(entity)?;
        }
        debug!(target: "atrium::replica", entity = %entity_id, "entity deleted");
        Ok(())
    }

    /// Position is the one frame-dependent property: translated into the
    /// session frame before publication.
    pub async fn set_position(&self, entity_id: Uuid, position: Vec3) -> SyncResult<()> {
        let (session_id, envelope, _) = self.entity_envelope(entity_id)?;
        self.shared
            .publish(
                topics::request_entity(session_id, entity_id, EntityProperty::Position),
                &PositionUpdate {
                    envelope,
                    position: self.shared.offset.to_session(position),
                },
            )
            .await
    }

    pub async fn set_rotation(&self, entity_id: Uuid, rotation: Quat) -> SyncResult<()> {
        let (session_id, envelope, _) = self.entity_envelope(entity_id)?;
        self.shared
            .publish(
                topics::request_entity(session_id, entity_id, EntityProperty::Rotation),
                &RotationUpdate { envelope, rotation },
            )
            .await
    }

    pub async fn set_scale(&self, entity_id: Uuid, scale: Vec3) -> SyncResult<()> {
        let (session_id, envelope, _) = self.entity_envelope(entity_id)?;
        self.shared
            .publish(
                topics::request_entity(session_id, entity_id, EntityProperty::Scale),
                &ScaleUpdate { envelope, scale },
            )
            .await
    }

    pub async fn set_size(&self, entity_id: Uuid, size: Vec3) -> SyncResult<()> {
        let (session_id, envelope, _) = self.entity_envelope(entity_id)?;
        self.shared
            .publish(
                topics::request_entity(session_id, entity_id, EntityProperty::Size),
                &SizeUpdate { envelope, size },
            )
            .await
    }

    pub async fn set_visibility(&self, entity_id: Uuid, visible: bool) -> SyncResult<()> {
        let (session_id, envelope, _) = self.entity_envelope(entity_id)?;
        self.shared
            .publish(
                topics::request_entity(session_id, entity_id, EntityProperty::Visibility),
                &VisibilityUpdate { envelope, visible },
            )
            .await
    }

    pub async fn set_parent(&self, entity_id: Uuid, parent_id: Option<Uuid>) -> SyncResult<()> {
        let (session_id, envelope, _) = self.entity_envelope(entity_id)?;
        self.shared
            .publish(
                topics::request_entity(session_id, entity_id, EntityProperty::Parent),
                &ParentUpdate {
                    envelope,
                    parent_id,
                },
            )
            .await
    }

    pub async fn set_motion(&self, entity_id: Uuid, motion: Motion) -> SyncResult<()> {
        let (session_id, envelope, _) = self.entity_envelope(entity_id)?;
        self.shared
            .publish(
                topics::request_entity(session_id, entity_id, EntityProperty::Motion),
                &MotionUpdate {
                    envelope,
                    angular_velocity: motion.angular_velocity,
                    velocity: motion.velocity,
                    stationary: motion.stationary,
                },
            )
            .await
    }

    pub async fn set_physical_properties(
        &self,
        entity_id: Uuid,
        properties: PhysicalProperties,
    ) -> SyncResult<()> {
        let (session_id, envelope, _) = self.entity_envelope(entity_id)?;
        self.shared
            .publish(
                topics::request_entity(session_id, entity_id, EntityProperty::PhysicalProperties),
                &PhysicalPropertiesUpdate {
                    envelope,
                    angular_drag: properties.angular_drag,
                    center_of_mass: properties.center_of_mass,
                    drag: properties.drag,
                    gravitational: properties.gravitational,
                    mass: properties.mass,
                },
            )
            .await
    }

    pub async fn set_highlight(&self, entity_id: Uuid, highlighted: bool) -> SyncResult<()> {
        let (session_id, envelope, _) = self.entity_envelope(entity_id)?;
        self.shared
            .publish(
                topics::request_entity(session_id, entity_id, EntityProperty::Highlight),
                &HighlightUpdate {
                    envelope,
                    highlighted,
                },
            )
            .await
    }

    pub async fn set_interaction_state(
        &self,
        entity_id: Uuid,
        interaction_state: InteractionState,
    ) -> SyncResult<()> {
        let (session_id, envelope, _) = self.entity_envelope(entity_id)?;
        self.shared
            .publish(
                topics::request_entity(session_id, entity_id, EntityProperty::InteractionState),
                &InteractionStateUpdate {
                    envelope,
                    interaction_state,
                },
            )
            .await
    }

    pub async fn make_screen_canvas(&self, entity_id: Uuid) -> SyncResult<()> {
        self.set_canvas_type(entity_id, CanvasKind::Screen).await
    }

    pub async fn make_world_canvas(&self, entity_id: Uuid) -> SyncResult<()> {
        self.set_canvas_type(entity_id, CanvasKind::World).await
    }

    async fn set_canvas_type(&self, entity_id: Uuid, canvas_type: CanvasKind) -> SyncResult<()> {
        let (session_id, envelope, kind) = self.entity_envelope(entity_id)?;
        if kind != EntityKind::Canvas {
            return Err(SyncError::Structural(format!(
                "{kind} entity {entity_id} cannot switch canvas type"
            )));
        }
        self.shared
            .publish(
                topics::request_entity(session_id, entity_id, EntityProperty::CanvasType),
                &CanvasTypeUpdate {
                    envelope,
                    canvas_type,
                },
            )
            .await
    }

    /// Mirror a local terrain edit. Only the hybrid terrain kind carries a
    /// modification log.
    pub async fn modify_terrain_entity(
        &self,
        entity_id: Uuid,
        modification: TerrainModification,
    ) -> SyncResult<()> {
        let (session_id, envelope, kind) = self.entity_envelope(entity_id)?;
        if kind != EntityKind::Terrain {
            return Err(SyncError::Structural(format!(
                "{kind} entity {entity_id} is not a terrain"
            )));
        }
        let terrain_kind = self
            .shared
            .world
            .find_entity(entity_id)
            .and_then(|entity| entity.terrain_kind);
        if terrain_kind != Some(TerrainKind::Hybrid) {
            return Err(SyncError::Structural(format!(
                "terrain {entity_id} does not accept modifications"
            )));
        }
        if modification.operation == TerrainOperation::Unset {
            return Err(SyncError::Structural(
                "terrain modification operation is unset".into(),
            ));
        }
        self.shared
            .publish(
                topics::request_entity(session_id, entity_id, EntityProperty::TerrainMod),
                &TerrainModUpdate {
                    envelope,
                    modification,
                },
            )
            .await
    }

    /// Generic pub/sub passthrough to every participant.
    pub async fn send_message(&self, topic: &str, message: &str) -> SyncResult<()> {
        let (session_id, envelope) = self.shared.session_envelope()?;
        self.shared
            .publish(
                topics::request_message(session_id),
                &MessagePayload {
                    envelope,
                    topic: topic.to_string(),
                    message: message.to_string(),
                },
            )
            .await
    }

    /// The three session guards plus the invalid-entity guard, each with
    /// its own failure reason.
    fn entity_envelope(
        &self,
        entity_id: Uuid,
    ) -> SyncResult<(Uuid, atrium_proto::Envelope, EntityKind)> {
        let (session_id, envelope) = self.shared.session_envelope()?;
        let state = self.shared.state.lock();
        let tracked = state
            .entities
            .get(&entity_id)
            .ok_or(SyncError::InvalidEntity(entity_id))?;
        Ok((session_id, envelope, tracked.kind))
    }

    /// Kind-specific validation for outgoing creations.
    fn validate_structure(&self, create: &EntityCreate) -> SyncResult<()> {
        let kind = create.kind();
        if kind.requires_canvas_parent() {
            let parent = create.parent_id.ok_or_else(|| {
                SyncError::Structural(format!("{kind} entity requires a canvas parent"))
            })?;
            let parent_kind = self
                .shared
                .world
                .find_entity(parent)
                .map(|entity| entity.kind);
            if parent_kind != Some(EntityKind::Canvas) {
                return Err(SyncError::Structural(format!(
                    "{kind} entity parent {parent} is not a canvas"
                )));
            }
        }
        match &create.spec {
            EntityCreateSpec::Terrain(fields) => {
                let rows = fields.heights.len();
                if rows == 0 {
                    return Err(SyncError::Structural("terrain has an empty heightfield".into()));
                }
                let columns = fields.heights[0].len();
                if columns == 0 || fields.heights.iter().any(|row| row.len() != columns) {
                    return Err(SyncError::Structural(
                        "terrain heightfield is not rectangular".into(),
                    ));
                }
                if fields.layer_masks.len() > fields.layers.len() {
                    return Err(SyncError::Structural(
                        "terrain has more layer masks than layers".into(),
                    ));
                }
            }
            EntityCreateSpec::Automobile(fields) => {
                for raw in &fields.wheels {
                    if Wheel::parse(raw).is_none() {
                        return Err(SyncError::Structural(format!(
                            "malformed wheel definition {raw:?}"
                        )));
                    }
                }
            }
            EntityCreateSpec::Mesh(fields) if fields.mesh_object.is_empty() => {
                return Err(SyncError::Structural("mesh entity has no mesh object".into()));
            }
            EntityCreateSpec::Audio(fields) if fields.audio_file.is_empty() => {
                return Err(SyncError::Structural("audio entity has no audio file".into()));
            }
            EntityCreateSpec::Image(fields) if fields.image_file.is_empty() => {
                return Err(SyncError::Structural("image entity has no image file".into()));
            }
            EntityCreateSpec::Text(TextFields { font_size: 0, .. }) => {
                return Err(SyncError::Structural("text entity font size is zero".into()));
            }
            _ => {}
        }
        Ok(())
    }
}
