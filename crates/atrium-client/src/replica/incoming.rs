//! Application of remote status messages to the local world replica. Echo
//! suppression has already happened at the router; everything here runs
//! on behalf of another participant. Failures are protocol-tolerant: the
//! offending message is skipped with a warning and processing continues.

use std::sync::Arc;

use tracing::{error, warn};
use uuid::Uuid;

use atrium_proto::{
    decode, decode_create, CanvasTypeUpdate, EntityCreate, EntityCreateSpec, EntityKind,
    EntityProperty, HighlightUpdate, InteractionStateUpdate, MotionUpdate, ParentUpdate,
    PhysicalPropertiesUpdate, PositionUpdate, RotationUpdate, ScaleUpdate, SizeUpdate,
    TerrainKind, TerrainModUpdate, TerrainOperation, VisibilityUpdate,
};

use crate::session::{SessionEvent, Shared, TrackedEntity};
use crate::world::{EntityRef, Motion, PhysicalProperties, Wheel, WorldError};

pub(crate) fn apply_create_message(shared: &Arc<Shared>, kind: EntityKind, raw: &[u8]) {
    match decode_create(kind, raw) {
        Ok((_envelope, create)) => {
            apply_create_record(shared, create);
        }
        Err(error) => {
            warn!(target: "atrium::replica", %kind, %error, "bad creation message");
        }
    }
}

/// Instantiate a remote entity locally. Returns false when the record was
/// skipped. Duplicate delivery is idempotent: an id that already exists is
/// a warning, not an error.
pub(crate) fn apply_create_record(shared: &Arc<Shared>, create: EntityCreate) -> bool {
    let entity_id = create.entity_id;
    let kind = create.kind();
    {
        let state = shared.state.lock();
        if state.entities.contains_key(&entity_id) || state.retired.contains(&entity_id) {
            warn!(target: "atrium::replica", entity = %entity_id, "duplicate creation dropped");
            return false;
        }
    }
    if shared.world.exists(entity_id) {
        warn!(target: "atrium::replica", entity = %entity_id, "entity already exists locally, creation dropped");
        return false;
    }

    if let Err(error) = load_entity(shared, &create) {
        warn!(target: "atrium::replica", entity = %entity_id, %kind, %error, "entity load failed");
        return false;
    }
    let Some(entity) = shared.world.find_entity(entity_id) else {
        warn!(target: "atrium::replica", entity = %entity_id, "loader did not produce the entity");
        return false;
    };

    // The loader creates the entity invisible; configure it fully, then
    // reveal it.
    if let Err(error) = configure_entity(shared, entity, &create) {
        warn!(target: "atrium::replica", entity = %entity_id, %error, "entity configuration failed");
    }
    if let Err(error) = shared.world.set_visibility(entity, true) {
        warn!(target: "atrium::replica", entity = %entity_id, %error, "entity reveal failed");
    }

    shared
        .state
        .lock()
        .entities
        .insert(entity_id, TrackedEntity { kind });
    shared.emit(SessionEvent::EntityReplicated { entity_id, kind });
    true
}

/// The per-kind loader dispatch. One exhaustive match over the creation
/// union, mirrored by the encoder and decoder matches in the protocol
/// crate.
fn load_entity(shared: &Arc<Shared>, create: &EntityCreate) -> Result<Uuid, WorldError> {
    let id = create.entity_id;
    let parent = create.parent_id;
    let world = &shared.world;
    match &create.spec {
        EntityCreateSpec::Mesh(fields) => world.load_mesh(id, parent, fields),
        EntityCreateSpec::Container => world.load_container(id, parent),
        EntityCreateSpec::Character(fields) => world.load_character(id, parent, fields),
        EntityCreateSpec::Button(fields) => world.load_button(id, parent, fields),
        EntityCreateSpec::Canvas => world.load_canvas(id, parent),
        EntityCreateSpec::Input(fields) => world.load_input(id, parent, fields),
        EntityCreateSpec::Light => world.load_light(id, parent),
        EntityCreateSpec::Terrain(fields) => {
            if fields.layer_masks.len() > fields.layers.len() {
                warn!(
                    target: "atrium::replica",
                    entity = %id,
                    masks = fields.layer_masks.len(),
                    layers = fields.layers.len(),
                    "terrain layer mask count exceeds layer count"
                );
            }
            world.load_terrain(id, parent, fields)
        }
        EntityCreateSpec::Text(fields) => world.load_text(id, parent, fields),
        EntityCreateSpec::Voxel => world.load_voxel(id, parent),
        EntityCreateSpec::Airplane(fields) => world.load_airplane(id, parent, fields),
        EntityCreateSpec::Audio(fields) => world.load_audio(id, parent, fields),
        EntityCreateSpec::Automobile(fields) => {
            let mut wheels = Vec::with_capacity(fields.wheels.len());
            for raw in &fields.wheels {
                match Wheel::parse(raw) {
                    Some(wheel) => wheels.push(wheel),
                    None => {
                        warn!(target: "atrium::replica", entity = %id, wheel = %raw, "malformed wheel definition skipped");
                    }
                }
            }
            world.load_automobile(id, parent, fields, &wheels)
        }
        EntityCreateSpec::Dropdown(fields) => world.load_dropdown(id, parent, fields),
        EntityCreateSpec::Html(fields) => world.load_html(id, parent, fields),
        EntityCreateSpec::Image(fields) => world.load_image(id, parent, fields),
    }
}

fn configure_entity(
    shared: &Arc<Shared>,
    entity: EntityRef,
    create: &EntityCreate,
) -> Result<(), WorldError> {
    let world = &shared.world;
    world.set_tag(entity, &create.tag)?;
    world.set_position(entity, shared.offset.to_local(create.position))?;
    world.set_rotation(entity, create.rotation)?;
    if create.extent.is_size() {
        world.set_size(entity, create.extent.vector())?;
    } else {
        world.set_scale(entity, create.extent.vector())?;
    }
    Ok(())
}

/// Apply one property-mutation status message. A missing target is a
/// non-fatal warning; nothing is queued for retry.
pub(crate) fn apply_update(shared: &Arc<Shared>, entity_id: Uuid, prop: EntityProperty, raw: &[u8]) {
    let Some(entity) = shared.world.find_entity(entity_id) else {
        warn!(target: "atrium::replica", entity = %entity_id, prop = prop.as_str(), "entity not found, update dropped");
        return;
    };

    let outcome = match prop {
        EntityProperty::Delete => {
            if let Err(error) = shared.world.delete_entity(entity) {
                warn!(target: "atrium::replica", entity = %entity_id, %error, "remote delete failed");
            }
            let mut state = shared.state.lock();
            state.entities.remove(&entity_id);
            state.retired.insert(entity_id);
            drop(state);
            shared.emit(SessionEvent::EntityDeleted { entity_id });
            Ok(())
        }
        EntityProperty::Remove => {
            let mut state = shared.state.lock();
            state.entities.remove(&entity_id);
            state.retired.insert(entity_id);
            drop(state);
            shared.emit(SessionEvent::EntityRemoved { entity_id });
            Ok(())
        }
        EntityProperty::Position => decode::<PositionUpdate>(raw).map(|update| {
            apply_world(entity_id, || {
                shared
                    .world
                    .set_position(entity, shared.offset.to_local(update.position))
            })
        }),
        EntityProperty::Rotation => decode::<RotationUpdate>(raw).map(|update| {
            apply_world(entity_id, || {
                shared.world.set_rotation(entity, update.rotation)
            })
        }),
        EntityProperty::Scale => decode::<ScaleUpdate>(raw).map(|update| {
            apply_world(entity_id, || {
                shared.world.set_scale(entity, update.scale)
            })
        }),
        EntityProperty::Size => decode::<SizeUpdate>(raw).map(|update| {
            apply_world(entity_id, || {
                shared.world.set_size(entity, update.size)
            })
        }),
        EntityProperty::Visibility => decode::<VisibilityUpdate>(raw).map(|update| {
            apply_world(entity_id, || {
                shared.world.set_visibility(entity, update.visible)
            })
        }),
        EntityProperty::Parent => decode::<ParentUpdate>(raw).map(|update| {
            apply_world(entity_id, || {
                shared.world.set_parent(entity, update.parent_id)
            })
        }),
        EntityProperty::Motion => decode::<MotionUpdate>(raw).map(|update| {
            apply_world(entity_id, || {
                shared.world.set_motion(
                    entity,
                    Motion {
                        angular_velocity: update.angular_velocity,
                        velocity: update.velocity,
                        stationary: update.stationary,
                    },
                )
            })
        }),
        EntityProperty::PhysicalProperties => decode::<PhysicalPropertiesUpdate>(raw).map(|update| {
            apply_world(entity_id, || {
                shared.world.set_physical_properties(
                    entity,
                    PhysicalProperties {
                        angular_drag: update.angular_drag,
                        center_of_mass: update.center_of_mass,
                        drag: update.drag,
                        gravitational: update.gravitational,
                        mass: update.mass,
                    },
                )
            })
        }),
        EntityProperty::Highlight => decode::<HighlightUpdate>(raw).map(|update| {
            apply_world(entity_id, || {
                shared.world.set_highlight(entity, update.highlighted)
            })
        }),
        EntityProperty::CanvasType => decode::<CanvasTypeUpdate>(raw).map(|update| {
            apply_world(entity_id, || {
                shared.world.set_canvas_type(entity, update.canvas_type)
            })
        }),
        EntityProperty::InteractionState => decode::<InteractionStateUpdate>(raw).map(|update| {
            apply_world(entity_id, || {
                shared
                    .world
                    .set_interaction_state(entity, update.interaction_state)
            })
        }),
        EntityProperty::TerrainMod => {
            decode::<TerrainModUpdate>(raw).map(|update| apply_terrain_mod(shared, entity, update))
        }
    };

    if let Err(error) = outcome {
        warn!(target: "atrium::replica", entity = %entity_id, prop = prop.as_str(), %error, "bad mutation payload");
    }
}

fn apply_world(entity_id: Uuid, write: impl FnOnce() -> Result<(), WorldError>) {
    if let Err(error) = write() {
        warn!(target: "atrium::replica", entity = %entity_id, %error, "world write failed");
    }
}

/// Terrain modifications are only valid against the hybrid terrain kind;
/// anything else is an error and produces no mutation.
fn apply_terrain_mod(shared: &Arc<Shared>, entity: EntityRef, update: TerrainModUpdate) {
    if entity.kind != EntityKind::Terrain || entity.terrain_kind != Some(TerrainKind::Hybrid) {
        error!(
            target: "atrium::replica",
            entity = %entity.id,
            kind = %entity.kind,
            "terrain modification against non-hybrid entity rejected"
        );
        return;
    }
    let modification = update.modification;
    let result = match modification.operation {
        TerrainOperation::Build => shared.world.build_terrain(entity, &modification),
        TerrainOperation::Dig => shared.world.dig_terrain(entity, &modification),
        TerrainOperation::Unset => {
            warn!(target: "atrium::replica", entity = %entity.id, "terrain modification with unset operation skipped");
            return;
        }
    };
    if let Err(error) = result {
        warn!(target: "atrium::replica", entity = %entity.id, %error, "terrain modification failed");
    }
}
