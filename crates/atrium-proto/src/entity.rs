use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Extent, Quat, Vec2, Vec3};

/// Closed set of replicated entity kinds. The kind never travels as a
/// payload field on creation messages; it is carried by the topic
/// (`create<kind>entity`) and re-attached during decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Mesh,
    Container,
    Character,
    Button,
    Canvas,
    Input,
    Light,
    Terrain,
    Text,
    Voxel,
    Airplane,
    Audio,
    Automobile,
    Dropdown,
    Html,
    Image,
}

impl EntityKind {
    pub const ALL: [EntityKind; 16] = [
        EntityKind::Mesh,
        EntityKind::Container,
        EntityKind::Character,
        EntityKind::Button,
        EntityKind::Canvas,
        EntityKind::Input,
        EntityKind::Light,
        EntityKind::Terrain,
        EntityKind::Text,
        EntityKind::Voxel,
        EntityKind::Airplane,
        EntityKind::Audio,
        EntityKind::Automobile,
        EntityKind::Dropdown,
        EntityKind::Html,
        EntityKind::Image,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Mesh => "mesh",
            EntityKind::Container => "container",
            EntityKind::Character => "character",
            EntityKind::Button => "button",
            EntityKind::Canvas => "canvas",
            EntityKind::Input => "input",
            EntityKind::Light => "light",
            EntityKind::Terrain => "terrain",
            EntityKind::Text => "text",
            EntityKind::Voxel => "voxel",
            EntityKind::Airplane => "airplane",
            EntityKind::Audio => "audio",
            EntityKind::Automobile => "automobile",
            EntityKind::Dropdown => "dropdown",
            EntityKind::Html => "html",
            EntityKind::Image => "image",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.as_str() == raw)
    }

    /// Widget kinds that must be parented to a canvas entity.
    pub fn requires_canvas_parent(&self) -> bool {
        matches!(
            self,
            EntityKind::Button
                | EntityKind::Input
                | EntityKind::Text
                | EntityKind::Dropdown
                | EntityKind::Html
                | EntityKind::Image
        )
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerrainKind {
    Heightmap,
    Voxel,
    #[default]
    Hybrid,
}

/// One layer of terrain surface material.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TerrainLayer {
    #[serde(default)]
    pub diffuse_texture: Option<String>,
    #[serde(default)]
    pub normal_texture: Option<String>,
    #[serde(default)]
    pub specular_texture: Option<String>,
    #[serde(default = "TerrainLayer::default_metre_size")]
    pub size_factor: f64,
}

impl TerrainLayer {
    fn default_metre_size() -> f64 {
        1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerrainBrush {
    #[default]
    Sphere,
    RoundedCube,
}

impl TerrainBrush {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerrainBrush::Sphere => "sphere",
            TerrainBrush::RoundedCube => "rounded-cube",
        }
    }
}

impl Serialize for TerrainBrush {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// Unknown brush strings decode to the default brush; the mismatch is
// reported where the modification is applied, not in the codec.
impl<'de> Deserialize<'de> for TerrainBrush {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "rounded-cube" => TerrainBrush::RoundedCube,
            _ => TerrainBrush::Sphere,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerrainOperation {
    Dig,
    Build,
    #[default]
    Unset,
}

impl TerrainOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerrainOperation::Dig => "dig",
            TerrainOperation::Build => "build",
            TerrainOperation::Unset => "unset",
        }
    }
}

impl Serialize for TerrainOperation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// Unknown operation strings decode to `unset`, which the replicator skips
// with a warning.
impl<'de> Deserialize<'de> for TerrainOperation {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "dig" => TerrainOperation::Dig,
            "build" => TerrainOperation::Build,
            _ => TerrainOperation::Unset,
        })
    }
}

/// One entry of the ordered terrain modification log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TerrainModification {
    #[serde(default)]
    pub operation: TerrainOperation,
    pub position: Vec3,
    #[serde(default)]
    pub brush_type: TerrainBrush,
    #[serde(default)]
    pub layer: u32,
    #[serde(default = "TerrainModification::default_size")]
    pub size: f64,
}

impl TerrainModification {
    fn default_size() -> f64 {
        1.0
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MeshFields {
    pub mesh_object: String,
    #[serde(default)]
    pub mesh_resources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CharacterFields {
    #[serde(default)]
    pub mesh_object: Option<String>,
    #[serde(default)]
    pub mesh_resources: Vec<String>,
    #[serde(default)]
    pub mesh_offset: Vec3,
    #[serde(default)]
    pub mesh_rotation: Quat,
    #[serde(default)]
    pub label_offset: Vec3,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ButtonFields {
    #[serde(default)]
    pub position_percent: Vec2,
    #[serde(default)]
    pub size_percent: Vec2,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_click: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InputFields {
    #[serde(default)]
    pub position_percent: Vec2,
    #[serde(default)]
    pub size_percent: Vec2,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TerrainFields {
    #[serde(default)]
    pub length: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub heights: Vec<Vec<f32>>,
    #[serde(default)]
    pub layers: Vec<TerrainLayer>,
    #[serde(default)]
    pub layer_masks: Vec<String>,
    #[serde(default, rename = "type")]
    pub terrain_kind: TerrainKind,
    #[serde(default, rename = "terrain-modification")]
    pub modifications: Vec<TerrainModification>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TextFields {
    #[serde(default)]
    pub text: String,
    #[serde(default = "TextFields::default_font_size")]
    pub font_size: u32,
    #[serde(default)]
    pub position_percent: Vec2,
    #[serde(default)]
    pub size_percent: Vec2,
}

impl TextFields {
    fn default_font_size() -> u32 {
        12
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AirplaneFields {
    pub mesh_object: String,
    #[serde(default)]
    pub mesh_offset: Vec3,
    #[serde(default)]
    pub mesh_rotation: Quat,
    #[serde(default)]
    pub mass: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AudioFields {
    pub audio_file: String,
    #[serde(default)]
    pub auto_play: bool,
    #[serde(default, rename = "loop")]
    pub looping: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AutomobileFields {
    pub mesh_object: String,
    #[serde(default)]
    pub mesh_offset: Vec3,
    #[serde(default)]
    pub mesh_rotation: Quat,
    #[serde(default)]
    pub mass: f64,
    #[serde(default, rename = "type")]
    pub automobile_type: String,
    /// Encoded `"<submesh>:<radius>"` entries. Malformed entries are a
    /// warning at apply time, not a codec error.
    #[serde(default)]
    pub wheels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DropdownFields {
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_change: Option<String>,
    #[serde(default)]
    pub position_percent: Vec2,
    #[serde(default)]
    pub size_percent: Vec2,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HtmlFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub position_percent: Vec2,
    #[serde(default)]
    pub size_percent: Vec2,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ImageFields {
    pub image_file: String,
    #[serde(default)]
    pub position_percent: Vec2,
    #[serde(default)]
    pub size_percent: Vec2,
}

/// Kind discriminant plus the kind-specific creation payload. Encode,
/// decode and apply are each one exhaustive match over this union.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityCreateSpec {
    Mesh(MeshFields),
    Container,
    Character(CharacterFields),
    Button(ButtonFields),
    Canvas,
    Input(InputFields),
    Light,
    Terrain(TerrainFields),
    Text(TextFields),
    Voxel,
    Airplane(AirplaneFields),
    Audio(AudioFields),
    Automobile(AutomobileFields),
    Dropdown(DropdownFields),
    Html(HtmlFields),
    Image(ImageFields),
}

impl EntityCreateSpec {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityCreateSpec::Mesh(_) => EntityKind::Mesh,
            EntityCreateSpec::Container => EntityKind::Container,
            EntityCreateSpec::Character(_) => EntityKind::Character,
            EntityCreateSpec::Button(_) => EntityKind::Button,
            EntityCreateSpec::Canvas => EntityKind::Canvas,
            EntityCreateSpec::Input(_) => EntityKind::Input,
            EntityCreateSpec::Light => EntityKind::Light,
            EntityCreateSpec::Terrain(_) => EntityKind::Terrain,
            EntityCreateSpec::Text(_) => EntityKind::Text,
            EntityCreateSpec::Voxel => EntityKind::Voxel,
            EntityCreateSpec::Airplane(_) => EntityKind::Airplane,
            EntityCreateSpec::Audio(_) => EntityKind::Audio,
            EntityCreateSpec::Automobile(_) => EntityKind::Automobile,
            EntityCreateSpec::Dropdown(_) => EntityKind::Dropdown,
            EntityCreateSpec::Html(_) => EntityKind::Html,
            EntityCreateSpec::Image(_) => EntityKind::Image,
        }
    }
}

/// A complete entity creation record: the common fields shared by every
/// kind plus the kind payload. This is the unit carried by creation
/// messages and by full-state responses.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityCreate {
    pub entity_id: Uuid,
    pub tag: String,
    pub parent_id: Option<Uuid>,
    pub position: Vec3,
    pub rotation: Quat,
    pub extent: Extent,
    pub delete_with_client: bool,
    pub spec: EntityCreateSpec,
}

impl EntityCreate {
    pub fn kind(&self) -> EntityKind {
        self.spec.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::parse("hologram"), None);
    }

    #[test]
    fn widget_kinds_require_canvas_parent() {
        assert!(EntityKind::Button.requires_canvas_parent());
        assert!(EntityKind::Dropdown.requires_canvas_parent());
        assert!(!EntityKind::Mesh.requires_canvas_parent());
        assert!(!EntityKind::Canvas.requires_canvas_parent());
    }

    #[test]
    fn terrain_enum_wire_strings() {
        assert_eq!(
            serde_json::to_string(&TerrainBrush::RoundedCube).unwrap(),
            "\"rounded-cube\""
        );
        assert_eq!(serde_json::to_string(&TerrainBrush::Sphere).unwrap(), "\"sphere\"");
        assert_eq!(serde_json::to_string(&TerrainOperation::Dig).unwrap(), "\"dig\"");
        assert_eq!(serde_json::to_string(&TerrainOperation::Build).unwrap(), "\"build\"");
        assert_eq!(serde_json::to_string(&TerrainOperation::Unset).unwrap(), "\"unset\"");
    }

    #[test]
    fn unknown_operation_and_brush_decode_to_defaults() {
        let raw = r#"{"position":{"x":0.0,"y":0.0,"z":0.0},"operation":"smooth","brush-type":"cone"}"#;
        let m: TerrainModification = serde_json::from_str(raw).unwrap();
        assert_eq!(m.operation, TerrainOperation::Unset);
        assert_eq!(m.brush_type, TerrainBrush::Sphere);
        assert_eq!(m.size, 1.0);
    }
}
