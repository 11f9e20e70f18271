//! Landmark-driven skin mask construction.
//!
//! The face contour is filled with anti-aliasing and blurred so the smoothed
//! area fades into untouched skin. Eyes and the mouth are then carved out
//! with an outward feather: coverage is exactly zero inside each ring and
//! ramps back up over `inner` pixels outside it, which keeps lashes and lip
//! lines sharp no matter how wide the outer feather is.

use std::sync::Arc;

use image::{GrayImage, Luma, imageops};
use log::{Level, debug};
use rayon::prelude::*;
use retouch_utils::{config::MaskSettings, telemetry::timing_guard};
use thiserror::Error;
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Transform};

use crate::landmarks::{LandmarkError, LandmarkSet, Ring};

/// Single-channel skin coverage raster, same size as the source image.
#[derive(Debug, Clone, PartialEq)]
pub struct SkinMask {
    raster: Arc<GrayImage>,
}

impl SkinMask {
    pub fn from_gray(raster: GrayImage) -> Self {
        Self {
            raster: Arc::new(raster),
        }
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.raster.dimensions()
    }

    /// Coverage at a pixel in `[0, 1]`.
    pub fn value_at(&self, x: u32, y: u32) -> f32 {
        f32::from(self.raster.get_pixel(x, y)[0]) / 255.0
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.raster
    }
}

/// Feather radii in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatherRadii {
    /// Blur radius applied to the face contour.
    pub outer: f32,
    /// Outward ramp around each excluded ring.
    pub inner: f32,
}

impl Default for FeatherRadii {
    fn default() -> Self {
        (&MaskSettings::default()).into()
    }
}

impl From<&MaskSettings> for FeatherRadii {
    fn from(settings: &MaskSettings) -> Self {
        Self {
            outer: settings.outer_feather_px.max(0.0),
            inner: settings.inner_feather_px.max(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MaskError {
    #[error("no face was detected")]
    NoDetection,
    #[error("malformed landmarks: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("image has zero area ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
}

/// Build the skin mask for a single face.
pub fn build_mask(
    dimensions: (u32, u32),
    landmarks: &LandmarkSet,
    radii: FeatherRadii,
) -> Result<SkinMask, MaskError> {
    build_mask_for_faces(dimensions, std::slice::from_ref(landmarks), radii)
}

/// Build the skin mask covering every detected face.
///
/// Overlapping faces combine with a per-pixel maximum.
pub fn build_mask_for_faces(
    dimensions: (u32, u32),
    faces: &[LandmarkSet],
    radii: FeatherRadii,
) -> Result<SkinMask, MaskError> {
    let (width, height) = dimensions;
    if width == 0 || height == 0 {
        return Err(MaskError::EmptyImage { width, height });
    }
    if faces.is_empty() {
        return Err(MaskError::NoDetection);
    }
    for face in faces {
        face.validate()?;
    }

    let _guard = timing_guard(
        format!("retouch_core::build_mask {}x{} ({} faces)", width, height, faces.len()),
        Level::Debug,
    );

    let mut combined = GrayImage::new(width, height);
    for face in faces {
        let face_mask = rasterize_face(width, height, face, radii)?;
        for (dst, src) in combined.iter_mut().zip(face_mask.iter()) {
            *dst = (*dst).max(*src);
        }
    }

    debug!(
        "Built {}x{} skin mask (outer feather {:.1}px, inner feather {:.1}px)",
        width, height, radii.outer, radii.inner
    );
    Ok(SkinMask::from_gray(combined))
}

fn rasterize_face(
    width: u32,
    height: u32,
    face: &LandmarkSet,
    radii: FeatherRadii,
) -> Result<GrayImage, MaskError> {
    let contour = face.ring_pixels(Ring::FaceContour, width, height);
    let mut coverage = fill_polygon(width, height, &contour)?;

    if radii.outer > 0.0 {
        // Gaussian sigma of a third of the radius keeps ~99% of the falloff inside it.
        coverage = imageops::blur(&coverage, radii.outer / 3.0);
    }

    let exclusions: Vec<Polygon> = Ring::EXCLUDED
        .iter()
        .map(|&ring| Polygon::new(face.ring_pixels(ring, width, height)))
        .collect();

    let row_len = width as usize;
    coverage
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            let py = y as f32 + 0.5;
            for (x, value) in row.iter_mut().enumerate() {
                if *value == 0 {
                    continue;
                }
                let px = x as f32 + 0.5;
                let excluded = exclusions
                    .iter()
                    .map(|polygon| polygon.exclusion(px, py, radii.inner))
                    .fold(0.0f32, f32::max);
                if excluded > 0.0 {
                    let kept = f32::from(*value) * (1.0 - excluded);
                    *value = kept.round().clamp(0.0, 255.0) as u8;
                }
            }
        });

    Ok(coverage)
}

fn fill_polygon(width: u32, height: u32, vertices: &[(f32, f32)]) -> Result<GrayImage, MaskError> {
    let mut pixmap = Pixmap::new(width, height).ok_or(MaskError::EmptyImage { width, height })?;
    let mut out = GrayImage::new(width, height);

    let Some(&(first_x, first_y)) = vertices.first() else {
        return Ok(out);
    };
    let mut builder = PathBuilder::new();
    builder.move_to(first_x, first_y);
    for &(x, y) in vertices.iter().skip(1) {
        builder.line_to(x, y);
    }
    builder.close();
    // Collinear or zero-area contours produce no path and therefore no skin.
    let Some(path) = builder.finish() else {
        return Ok(out);
    };

    let mut paint = Paint::default();
    paint.set_color_rgba8(255, 255, 255, 255);
    paint.anti_alias = true;
    pixmap.fill_path(
        &path,
        &paint,
        FillRule::Winding,
        Transform::identity(),
        None,
    );

    for (dst, src) in out.pixels_mut().zip(pixmap.data().chunks_exact(4)) {
        *dst = Luma([src[3]]);
    }
    Ok(out)
}

/// Closed polygon in pixel space with a cached bounding box.
struct Polygon {
    vertices: Vec<(f32, f32)>,
    min: (f32, f32),
    max: (f32, f32),
}

impl Polygon {
    fn new(vertices: Vec<(f32, f32)>) -> Self {
        let mut min = (f32::INFINITY, f32::INFINITY);
        let mut max = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for &(x, y) in &vertices {
            min = (min.0.min(x), min.1.min(y));
            max = (max.0.max(x), max.1.max(y));
        }
        Self { vertices, min, max }
    }

    /// Ray casting point-in-polygon test.
    fn contains(&self, x: f32, y: f32) -> bool {
        let n = self.vertices.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.vertices[i];
            let (xj, yj) = self.vertices[j];
            if ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi) {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    fn distance_to_edge(&self, x: f32, y: f32) -> f32 {
        let n = self.vertices.len();
        (0..n)
            .map(|i| segment_distance((x, y), self.vertices[i], self.vertices[(i + 1) % n]))
            .fold(f32::INFINITY, f32::min)
    }

    /// Exclusion strength in `[0, 1]`: 1 inside, smooth falloff to 0 at `feather` px outside.
    fn exclusion(&self, x: f32, y: f32, feather: f32) -> f32 {
        if x < self.min.0 - feather
            || x > self.max.0 + feather
            || y < self.min.1 - feather
            || y > self.max.1 + feather
        {
            return 0.0;
        }
        if self.contains(x, y) {
            return 1.0;
        }
        if feather <= 0.0 {
            return 0.0;
        }
        let distance = self.distance_to_edge(x, y);
        1.0 - smoothstep(0.0, feather, distance)
    }
}

fn segment_distance(p: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    let (abx, aby) = (b.0 - a.0, b.1 - a.1);
    let (apx, apy) = (p.0 - a.0, p.1 - a.1);
    let len_sq = abx * abx + aby * aby;
    let t = if len_sq > 0.0 {
        ((apx * abx + apy * aby) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (dx, dy) = (apx - t * abx, apy - t * aby);
    (dx * dx + dy * dy).sqrt()
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
