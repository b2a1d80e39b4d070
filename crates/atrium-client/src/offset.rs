use atrium_proto::Vec3;

/// Fixed per-participant translation between the locally rendered frame
/// and the session's shared frame. Positions are the only frame-dependent
/// property; everything else travels as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct OffsetTransform {
    offset: Vec3,
}

impl OffsetTransform {
    pub fn new(offset: Vec3) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    /// Local frame → shared session frame, applied before publication.
    pub fn to_session(&self, position: Vec3) -> Vec3 {
        position - self.offset
    }

    /// Shared session frame → local frame, applied before the world write.
    pub fn to_local(&self, position: Vec3) -> Vec3 {
        position + self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a.x - b.x).abs() < TOLERANCE
            && (a.y - b.y).abs() < TOLERANCE
            && (a.z - b.z).abs() < TOLERANCE
    }

    #[test]
    fn transforms_are_mutually_inverse() {
        let cases = [
            (Vec3::default(), Vec3::new(1.0, 2.0, 3.0)),
            (Vec3::new(10.5, -4.25, 0.125), Vec3::new(-7.0, 3.5, 9.75)),
            (Vec3::new(-1e6, 1e6, 0.0), Vec3::new(0.1, 0.2, 0.3)),
        ];
        for (offset, position) in cases {
            let transform = OffsetTransform::new(offset);
            assert!(close(
                transform.to_local(transform.to_session(position)),
                position
            ));
            assert!(close(
                transform.to_session(transform.to_local(position)),
                position
            ));
        }
    }
}
