//! Facial landmark model consumed by the mask builder.
//!
//! A detector hands back normalized 2-D points (origin top-left, `x`/`y` in
//! `[0, 1]`). A [`LandmarkTopology`] names which of those points outline the
//! face contour, the two eyes, and the mouth as closed index rings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum number of vertices for a ring to enclose an area.
pub const MIN_RING_POINTS: usize = 3;

/// A landmark position in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f32,
    pub y: f32,
}

impl NormalizedPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Scale into pixel space for an image of the given dimensions.
    pub fn to_pixels(self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }

    fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f32; 2]> for NormalizedPoint {
    fn from([x, y]: [f32; 2]) -> Self {
        Self { x, y }
    }
}

/// The four closed contours the mask builder needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ring {
    FaceContour,
    LeftEye,
    RightEye,
    Mouth,
}

impl Ring {
    pub const ALL: [Ring; 4] = [Ring::FaceContour, Ring::LeftEye, Ring::RightEye, Ring::Mouth];
    /// Rings whose interior must stay untouched.
    pub const EXCLUDED: [Ring; 3] = [Ring::LeftEye, Ring::RightEye, Ring::Mouth];

    pub fn name(self) -> &'static str {
        match self {
            Ring::FaceContour => "face contour",
            Ring::LeftEye => "left eye",
            Ring::RightEye => "right eye",
            Ring::Mouth => "mouth",
        }
    }
}

impl std::fmt::Display for Ring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// Face-mesh (468/478 point) contour indices.
const FACE_MESH_OVAL: [usize; 36] = [
    10, 338, 297, 332, 284, 251, 389, 356, 454, 323, 361, 288, 397, 365, 379, 378, 400, 377, 152,
    148, 176, 149, 150, 136, 172, 58, 132, 93, 234, 127, 162, 21, 54, 103, 67, 109,
];
const FACE_MESH_LEFT_EYE: [usize; 16] = [
    362, 382, 381, 380, 374, 373, 390, 249, 263, 466, 388, 387, 386, 385, 384, 398,
];
const FACE_MESH_RIGHT_EYE: [usize; 16] = [
    33, 7, 163, 144, 145, 153, 154, 155, 133, 173, 157, 158, 159, 160, 161, 246,
];
const FACE_MESH_LIPS: [usize; 20] = [
    61, 146, 91, 181, 84, 17, 314, 405, 321, 375, 291, 409, 270, 269, 267, 0, 37, 39, 40, 185,
];

/// Index rings partitioning a landmark list into named contours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandmarkTopology {
    face: Vec<usize>,
    left_eye: Vec<usize>,
    right_eye: Vec<usize>,
    mouth: Vec<usize>,
}

impl LandmarkTopology {
    pub fn new(
        face: Vec<usize>,
        left_eye: Vec<usize>,
        right_eye: Vec<usize>,
        mouth: Vec<usize>,
    ) -> Self {
        Self {
            face,
            left_eye,
            right_eye,
            mouth,
        }
    }

    /// Standard face-mesh ordering: face oval, both eye outlines, outer lips.
    pub fn face_mesh() -> Self {
        Self::new(
            FACE_MESH_OVAL.to_vec(),
            FACE_MESH_LEFT_EYE.to_vec(),
            FACE_MESH_RIGHT_EYE.to_vec(),
            FACE_MESH_LIPS.to_vec(),
        )
    }

    /// Rings stored back to back: `[face.., left_eye.., right_eye.., mouth..]`.
    pub fn sequential(lengths: [usize; 4]) -> Self {
        let mut offset = 0;
        let mut rings = lengths.map(|len| {
            let ring: Vec<usize> = (offset..offset + len).collect();
            offset += len;
            ring
        });
        Self::new(
            std::mem::take(&mut rings[0]),
            std::mem::take(&mut rings[1]),
            std::mem::take(&mut rings[2]),
            std::mem::take(&mut rings[3]),
        )
    }

    pub fn ring(&self, ring: Ring) -> &[usize] {
        match ring {
            Ring::FaceContour => &self.face,
            Ring::LeftEye => &self.left_eye,
            Ring::RightEye => &self.right_eye,
            Ring::Mouth => &self.mouth,
        }
    }
}

/// Malformed detector output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LandmarkError {
    #[error("landmark set contains no points")]
    Empty,
    #[error("{ring} ring has {len} points; at least {MIN_RING_POINTS} are required")]
    RingTooSmall { ring: Ring, len: usize },
    #[error("{ring} ring references landmark {index} but only {available} points were supplied")]
    IndexOutOfRange {
        ring: Ring,
        index: usize,
        available: usize,
    },
    #[error("landmark {index} has a non-finite coordinate")]
    NonFinite { index: usize },
}

/// One detected face: its points plus the topology naming the rings.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<NormalizedPoint>,
    topology: LandmarkTopology,
}

impl LandmarkSet {
    pub fn new(points: Vec<NormalizedPoint>, topology: LandmarkTopology) -> Self {
        Self { points, topology }
    }

    /// Points in face-mesh ordering.
    pub fn face_mesh(points: Vec<NormalizedPoint>) -> Self {
        Self::new(points, LandmarkTopology::face_mesh())
    }

    /// Build a set from explicit per-ring point lists.
    pub fn from_rings(
        face: Vec<NormalizedPoint>,
        left_eye: Vec<NormalizedPoint>,
        right_eye: Vec<NormalizedPoint>,
        mouth: Vec<NormalizedPoint>,
    ) -> Self {
        let topology =
            LandmarkTopology::sequential([face.len(), left_eye.len(), right_eye.len(), mouth.len()]);
        let mut points = face;
        points.extend(left_eye);
        points.extend(right_eye);
        points.extend(mouth);
        Self { points, topology }
    }

    pub fn points(&self) -> &[NormalizedPoint] {
        &self.points
    }

    pub fn topology(&self) -> &LandmarkTopology {
        &self.topology
    }

    /// Check that every ring can be rasterized.
    pub fn validate(&self) -> Result<(), LandmarkError> {
        if self.points.is_empty() {
            return Err(LandmarkError::Empty);
        }
        for ring in Ring::ALL {
            let indices = self.topology.ring(ring);
            if indices.len() < MIN_RING_POINTS {
                return Err(LandmarkError::RingTooSmall {
                    ring,
                    len: indices.len(),
                });
            }
            for &index in indices {
                let point = self
                    .points
                    .get(index)
                    .ok_or(LandmarkError::IndexOutOfRange {
                        ring,
                        index,
                        available: self.points.len(),
                    })?;
                if !point.is_finite() {
                    return Err(LandmarkError::NonFinite { index });
                }
            }
        }
        Ok(())
    }

    /// Pixel-space vertices of `ring`; indices outside the point list are skipped.
    pub fn ring_pixels(&self, ring: Ring, width: u32, height: u32) -> Vec<(f32, f32)> {
        self.topology
            .ring(ring)
            .iter()
            .filter_map(|&index| self.points.get(index))
            .map(|point| point.to_pixels(width, height))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(cx: f32, cy: f32, half: f32) -> Vec<NormalizedPoint> {
        vec![
            NormalizedPoint::new(cx - half, cy - half),
            NormalizedPoint::new(cx + half, cy - half),
            NormalizedPoint::new(cx + half, cy + half),
            NormalizedPoint::new(cx - half, cy + half),
        ]
    }

    #[test]
    fn from_rings_lays_rings_back_to_back() {
        let set = LandmarkSet::from_rings(
            square(0.5, 0.5, 0.3),
            square(0.4, 0.4, 0.05),
            square(0.6, 0.4, 0.05),
            square(0.5, 0.7, 0.05),
        );
        assert!(set.validate().is_ok());
        assert_eq!(set.points().len(), 16);
        assert_eq!(set.topology().ring(Ring::RightEye), &[8, 9, 10, 11]);

        let mouth = set.ring_pixels(Ring::Mouth, 200, 100);
        assert_eq!(mouth[0], (0.45 * 200.0, 0.65 * 100.0));
    }

    #[test]
    fn validation_rejects_short_rings() {
        let set = LandmarkSet::from_rings(
            square(0.5, 0.5, 0.3),
            square(0.4, 0.4, 0.05)[..2].to_vec(),
            square(0.6, 0.4, 0.05),
            square(0.5, 0.7, 0.05),
        );
        assert_eq!(
            set.validate(),
            Err(LandmarkError::RingTooSmall {
                ring: Ring::LeftEye,
                len: 2
            })
        );
    }

    #[test]
    fn face_mesh_topology_needs_full_point_list() {
        let set = LandmarkSet::face_mesh(vec![NormalizedPoint::new(0.5, 0.5); 100]);
        match set.validate() {
            Err(LandmarkError::IndexOutOfRange {
                ring: Ring::FaceContour,
                available: 100,
                ..
            }) => {}
            other => panic!("expected out-of-range error, got {other:?}"),
        }

        let full = LandmarkSet::face_mesh(vec![NormalizedPoint::new(0.5, 0.5); 468]);
        assert!(full.validate().is_ok());
    }

    #[test]
    fn validation_rejects_empty_and_nan() {
        let empty = LandmarkSet::new(Vec::new(), LandmarkTopology::face_mesh());
        assert_eq!(empty.validate(), Err(LandmarkError::Empty));

        let mut face = square(0.5, 0.5, 0.3);
        face[2].x = f32::NAN;
        let set = LandmarkSet::from_rings(
            face,
            square(0.4, 0.4, 0.05),
            square(0.6, 0.4, 0.05),
            square(0.5, 0.7, 0.05),
        );
        assert_eq!(set.validate(), Err(LandmarkError::NonFinite { index: 2 }));
    }
}
