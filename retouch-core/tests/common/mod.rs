#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use retouch_core::{LandmarkSet, NormalizedPoint};

pub const SIZE: u32 = 512;

/// Face square spans `[FACE_MIN, FACE_MAX]` in normalized coordinates.
pub const FACE_MIN: f32 = 0.2;
pub const FACE_MAX: f32 = 0.8;

/// `(cx, cy, rx, ry)` of the left eye, right eye and mouth.
pub const FEATURES: [(f32, f32, f32, f32); 3] = [
    (0.37, 0.4, 0.05, 0.05),
    (0.63, 0.4, 0.05, 0.05),
    (0.5, 0.65, 0.1, 0.045),
];

pub fn ellipse(cx: f32, cy: f32, rx: f32, ry: f32, n: usize) -> Vec<NormalizedPoint> {
    (0..n)
        .map(|i| {
            let a = i as f32 / n as f32 * std::f32::consts::TAU;
            NormalizedPoint::new(cx + rx * a.cos(), cy + ry * a.sin())
        })
        .collect()
}

/// Square face contour, circular eyes and an oval mouth.
pub fn synthetic_face() -> LandmarkSet {
    let [left, right, mouth] = FEATURES;
    LandmarkSet::from_rings(
        vec![
            NormalizedPoint::new(FACE_MIN, FACE_MIN),
            NormalizedPoint::new(FACE_MAX, FACE_MIN),
            NormalizedPoint::new(FACE_MAX, FACE_MAX),
            NormalizedPoint::new(FACE_MIN, FACE_MAX),
        ],
        ellipse(left.0, left.1, left.2, left.3, 32),
        ellipse(right.0, right.1, right.2, right.3, 32),
        ellipse(mouth.0, mouth.1, mouth.2, mouth.3, 32),
    )
}

/// Skin-like tone with fine deterministic grain for the filter to remove.
pub fn textured_portrait(size: u32) -> RgbaImage {
    RgbaImage::from_fn(size, size, |x, y| {
        let grain = ((x.wrapping_mul(7919) ^ y.wrapping_mul(104_729)) % 17) as u8;
        Rgba([170 + grain, 125 + grain / 2, 105 + grain, 255])
    })
}

/// `true` when the normalized point lies inside any feature ellipse.
pub fn inside_feature(u: f32, v: f32) -> bool {
    FEATURES.iter().any(|&(cx, cy, rx, ry)| {
        let dx = (u - cx) / rx;
        let dy = (v - cy) / ry;
        dx * dx + dy * dy <= 0.9
    })
}

pub fn max_abs_diff(a: &RgbaImage, b: &RgbaImage) -> u8 {
    a.as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(x, y)| x.abs_diff(*y))
        .max()
        .unwrap_or(0)
}
