use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const fn splat(v: f64) -> Self {
        Self { x: v, y: v, z: v }
    }
}

impl std::ops::Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Normalized 2-D coordinate used by canvas-relative widget placement
/// (`position-percent` / `size-percent` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An entity carries exactly one of a scale vector or a size vector.
/// On the wire this is presence-driven: the set variant is emitted under
/// its own field name and the other field is omitted entirely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extent {
    Scale(Vec3),
    Size(Vec3),
}

impl Extent {
    pub fn scale(v: Vec3) -> Self {
        Extent::Scale(v)
    }

    pub fn size(v: Vec3) -> Self {
        Extent::Size(v)
    }

    pub fn is_size(&self) -> bool {
        matches!(self, Extent::Size(_))
    }

    pub fn vector(&self) -> Vec3 {
        match self {
            Extent::Scale(v) | Extent::Size(v) => *v,
        }
    }

    /// Split into the optional wire fields `(scale, size)`.
    pub fn to_wire(&self) -> (Option<Vec3>, Option<Vec3>) {
        match self {
            Extent::Scale(v) => (Some(*v), None),
            Extent::Size(v) => (None, Some(*v)),
        }
    }
}

impl Default for Extent {
    fn default() -> Self {
        Extent::Scale(Vec3::splat(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_wire_split_is_exclusive() {
        let (scale, size) = Extent::scale(Vec3::splat(2.0)).to_wire();
        assert!(scale.is_some() && size.is_none());

        let (scale, size) = Extent::size(Vec3::new(1.0, 2.0, 3.0)).to_wire();
        assert!(scale.is_none() && size.is_some());
    }

    #[test]
    fn default_extent_is_unit_scale() {
        match Extent::default() {
            Extent::Scale(v) => assert_eq!(v, Vec3::splat(1.0)),
            Extent::Size(_) => panic!("default extent must be a scale"),
        }
    }
}
