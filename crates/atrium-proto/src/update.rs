//! Per-property entity mutation payloads. Each message carries the
//! envelope plus exactly the property being changed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::TerrainModification;
use crate::envelope::Envelope;
use crate::geometry::{Quat, Vec3};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub position: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationUpdate {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub rotation: Quat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleUpdate {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub scale: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeUpdate {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub size: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibilityUpdate {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub visible: bool,
}

/// `parent-id: null` reparents to the world root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ParentUpdate {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MotionUpdate {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    pub angular_velocity: Vec3,
    #[serde(default)]
    pub velocity: Vec3,
    #[serde(default)]
    pub stationary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CanvasKind {
    #[default]
    World,
    Screen,
}

impl CanvasKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanvasKind::World => "world",
            CanvasKind::Screen => "screen",
        }
    }
}

impl Serialize for CanvasKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// Unknown canvas type strings decode to the world canvas; the receiver
// logs the mismatch when applying.
impl<'de> Deserialize<'de> for CanvasKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "screen" => CanvasKind::Screen,
            _ => CanvasKind::World,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CanvasTypeUpdate {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub canvas_type: CanvasKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightUpdate {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub highlighted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionState {
    Hidden,
    #[default]
    Static,
    Physical,
    Placing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InteractionStateUpdate {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub interaction_state: InteractionState,
}

/// The five physical-properties fields always travel together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PhysicalPropertiesUpdate {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    pub angular_drag: f64,
    #[serde(default)]
    pub center_of_mass: Vec3,
    #[serde(default)]
    pub drag: f64,
    #[serde(default)]
    pub gravitational: bool,
    #[serde(default)]
    pub mass: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TerrainModUpdate {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub modification: TerrainModification,
}

/// Generic pub/sub passthrough carried over the session bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub topic: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> Envelope {
        Envelope::new("client-1", "tok", Uuid::nil())
    }

    #[test]
    fn parent_update_serializes_null_for_root() {
        let update = ParentUpdate {
            envelope: envelope(),
            parent_id: None,
        };
        let value = serde_json::to_value(&update).unwrap();
        assert!(value.get("parent-id").unwrap().is_null());
    }

    #[test]
    fn unknown_canvas_type_decodes_to_world() {
        let raw = serde_json::json!({
            "message-id": Uuid::new_v4(),
            "client-id": "c",
            "client-token": "t",
            "session-id": Uuid::nil(),
            "canvas-type": "holographic",
        });
        let update: CanvasTypeUpdate = serde_json::from_value(raw).unwrap();
        assert_eq!(update.canvas_type, CanvasKind::World);
    }

    #[test]
    fn motion_update_round_trip() {
        let update = MotionUpdate {
            envelope: envelope(),
            angular_velocity: Vec3::new(0.0, 1.0, 0.0),
            velocity: Vec3::new(2.0, 0.0, 0.0),
            stationary: false,
        };
        let raw = serde_json::to_vec(&update).unwrap();
        let back: MotionUpdate = serde_json::from_slice(&raw).unwrap();
        assert_eq!(back, update);
    }
}
