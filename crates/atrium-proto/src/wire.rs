//! Encode/decode between payload types and the flat JSON objects carried
//! on the bus. Pure functions, no side effects. Encoding always emits the
//! full field set for the declared payload type; decoding is tolerant of
//! unknown and missing optional fields.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::entity::{
    AirplaneFields, AudioFields, AutomobileFields, ButtonFields, CharacterFields, DropdownFields,
    EntityCreate, EntityCreateSpec, EntityKind, HtmlFields, ImageFields, InputFields, MeshFields,
    TerrainFields, TextFields,
};
use crate::envelope::Envelope;
use crate::geometry::{Extent, Quat, Vec3};

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not a json object")]
    NotAnObject,
    #[error("scale and size are mutually exclusive")]
    ScaleAndSize,
    #[error("state entity is missing its kind field")]
    MissingKind,
    #[error("unknown entity kind: {0}")]
    UnknownKind(String),
}

pub fn encode<T: Serialize>(payload: &T) -> Result<Vec<u8>, WireError> {
    Ok(serde_json::to_vec(payload)?)
}

pub fn decode<T: DeserializeOwned>(raw: &[u8]) -> Result<T, WireError> {
    Ok(serde_json::from_slice(raw)?)
}

/// Common creation fields shared by every entity kind. Scale and size are
/// separate optional wire fields so the decoder's "is size" branch is
/// driven by field presence, never by a sentinel value.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CreateCommon {
    entity_id: Uuid,
    #[serde(default)]
    tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<Uuid>,
    #[serde(default)]
    position: Vec3,
    #[serde(default)]
    rotation: Quat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scale: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size: Option<Vec3>,
    #[serde(default)]
    delete_with_client: bool,
}

impl CreateCommon {
    fn from_create(create: &EntityCreate) -> Self {
        let (scale, size) = create.extent.to_wire();
        Self {
            entity_id: create.entity_id,
            tag: create.tag.clone(),
            parent_id: create.parent_id,
            position: create.position,
            rotation: create.rotation,
            scale,
            size,
            delete_with_client: create.delete_with_client,
        }
    }

    fn extent(&self) -> Result<Extent, WireError> {
        match (self.scale, self.size) {
            (Some(_), Some(_)) => Err(WireError::ScaleAndSize),
            (Some(v), None) => Ok(Extent::Scale(v)),
            (None, Some(v)) => Ok(Extent::Size(v)),
            (None, None) => Ok(Extent::default()),
        }
    }
}

fn into_object(value: Value) -> Result<Map<String, Value>, WireError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(WireError::NotAnObject),
    }
}

fn spec_fields(spec: &EntityCreateSpec) -> Result<Map<String, Value>, WireError> {
    let value = match spec {
        EntityCreateSpec::Mesh(fields) => serde_json::to_value(fields)?,
        EntityCreateSpec::Character(fields) => serde_json::to_value(fields)?,
        EntityCreateSpec::Button(fields) => serde_json::to_value(fields)?,
        EntityCreateSpec::Input(fields) => serde_json::to_value(fields)?,
        EntityCreateSpec::Terrain(fields) => serde_json::to_value(fields)?,
        EntityCreateSpec::Text(fields) => serde_json::to_value(fields)?,
        EntityCreateSpec::Airplane(fields) => serde_json::to_value(fields)?,
        EntityCreateSpec::Audio(fields) => serde_json::to_value(fields)?,
        EntityCreateSpec::Automobile(fields) => serde_json::to_value(fields)?,
        EntityCreateSpec::Dropdown(fields) => serde_json::to_value(fields)?,
        EntityCreateSpec::Html(fields) => serde_json::to_value(fields)?,
        EntityCreateSpec::Image(fields) => serde_json::to_value(fields)?,
        EntityCreateSpec::Container
        | EntityCreateSpec::Canvas
        | EntityCreateSpec::Light
        | EntityCreateSpec::Voxel => Value::Object(Map::new()),
    };
    into_object(value)
}

fn decode_spec(kind: EntityKind, value: &Value) -> Result<EntityCreateSpec, WireError> {
    Ok(match kind {
        EntityKind::Mesh => EntityCreateSpec::Mesh(MeshFields::deserialize(value)?),
        EntityKind::Container => EntityCreateSpec::Container,
        EntityKind::Character => EntityCreateSpec::Character(CharacterFields::deserialize(value)?),
        EntityKind::Button => EntityCreateSpec::Button(ButtonFields::deserialize(value)?),
        EntityKind::Canvas => EntityCreateSpec::Canvas,
        EntityKind::Input => EntityCreateSpec::Input(InputFields::deserialize(value)?),
        EntityKind::Light => EntityCreateSpec::Light,
        EntityKind::Terrain => EntityCreateSpec::Terrain(TerrainFields::deserialize(value)?),
        EntityKind::Text => EntityCreateSpec::Text(TextFields::deserialize(value)?),
        EntityKind::Voxel => EntityCreateSpec::Voxel,
        EntityKind::Airplane => EntityCreateSpec::Airplane(AirplaneFields::deserialize(value)?),
        EntityKind::Audio => EntityCreateSpec::Audio(AudioFields::deserialize(value)?),
        EntityKind::Automobile => {
            EntityCreateSpec::Automobile(AutomobileFields::deserialize(value)?)
        }
        EntityKind::Dropdown => EntityCreateSpec::Dropdown(DropdownFields::deserialize(value)?),
        EntityKind::Html => EntityCreateSpec::Html(HtmlFields::deserialize(value)?),
        EntityKind::Image => EntityCreateSpec::Image(ImageFields::deserialize(value)?),
    })
}

fn create_body(create: &EntityCreate) -> Result<Map<String, Value>, WireError> {
    let mut body = into_object(serde_json::to_value(CreateCommon::from_create(create))?)?;
    body.extend(spec_fields(&create.spec)?);
    Ok(body)
}

/// Encode a creation message: envelope fields, common fields and the
/// kind-specific fields as one flat object. The kind itself is carried by
/// the topic the message is published on.
pub fn encode_create(envelope: &Envelope, create: &EntityCreate) -> Result<Vec<u8>, WireError> {
    let mut object = into_object(serde_json::to_value(envelope)?)?;
    object.extend(create_body(create)?);
    Ok(serde_json::to_vec(&Value::Object(object))?)
}

/// Decode a creation message delivered on a `create<kind>entity` topic.
pub fn decode_create(kind: EntityKind, raw: &[u8]) -> Result<(Envelope, EntityCreate), WireError> {
    let value: Value = serde_json::from_slice(raw)?;
    let envelope = Envelope::deserialize(&value)?;
    let create = decode_create_value(kind, &value)?;
    Ok((envelope, create))
}

fn decode_create_value(kind: EntityKind, value: &Value) -> Result<EntityCreate, WireError> {
    let common = CreateCommon::deserialize(value)?;
    let extent = common.extent()?;
    let spec = decode_spec(kind, value)?;
    Ok(EntityCreate {
        entity_id: common.entity_id,
        tag: common.tag,
        parent_id: common.parent_id,
        position: common.position,
        rotation: common.rotation,
        extent,
        delete_with_client: common.delete_with_client,
        spec,
    })
}

/// Encode one entity entry of a full-state response. Unlike creation
/// messages there is no topic to carry the kind, so it travels as an
/// explicit `kind` field.
pub fn encode_state_entity(create: &EntityCreate) -> Result<Value, WireError> {
    let mut body = create_body(create)?;
    body.insert("kind".into(), Value::String(create.kind().as_str().into()));
    Ok(Value::Object(body))
}

/// Decode one entity entry of a full-state response.
pub fn decode_state_entity(value: &Value) -> Result<EntityCreate, WireError> {
    let kind = value
        .get("kind")
        .and_then(Value::as_str)
        .ok_or(WireError::MissingKind)?;
    let kind = EntityKind::parse(kind).ok_or_else(|| WireError::UnknownKind(kind.to_string()))?;
    decode_create_value(kind, value)
}
