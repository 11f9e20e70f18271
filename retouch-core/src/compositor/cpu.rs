use image::{GrayImage, RgbaImage};
use log::Level;
use rayon::prelude::*;
use retouch_utils::telemetry::timing_guard;

use super::{CompositorBackend, KernelSettings, OutputSize, check_output};
use crate::{
    error::PipelineError, mask::SkinMask, params::DerivedFilterParameters, source::SourceImage,
};

/// Reference implementation of the compositing program on the CPU.
///
/// Sampling mirrors the GPU path: normalized coordinates at pixel centres,
/// bilinear filtering and clamp-to-edge addressing, with rows spread across
/// the rayon pool.
#[derive(Debug, Default)]
pub struct CpuCompositor {
    kernel: KernelSettings,
    resident: Option<(SourceImage, SkinMask)>,
}

impl CpuCompositor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompositorBackend for CpuCompositor {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn prepare(&mut self, kernel: KernelSettings) -> Result<(), PipelineError> {
        self.kernel = kernel;
        Ok(())
    }

    fn upload(&mut self, image: &SourceImage, mask: &SkinMask) -> Result<(), PipelineError> {
        self.release();
        if image.dimensions() != mask.dimensions() {
            return Err(PipelineError::Resource(format!(
                "mask {:?} does not match image {:?}",
                mask.dimensions(),
                image.dimensions()
            )));
        }
        self.resident = Some((image.clone(), mask.clone()));
        Ok(())
    }

    fn render(
        &mut self,
        params: DerivedFilterParameters,
        output: OutputSize,
    ) -> Result<RgbaImage, PipelineError> {
        check_output(&*self, output)?;
        let (image, mask) = self
            .resident
            .as_ref()
            .ok_or_else(|| PipelineError::Resource("no textures uploaded".into()))?;
        let _guard = timing_guard(
            format!("retouch_core::cpu_composite {}x{}", output.width, output.height),
            Level::Debug,
        );
        Ok(composite(
            image.pixels(),
            mask.as_gray(),
            params,
            self.kernel,
            output,
        ))
    }

    fn release(&mut self) {
        self.resident = None;
    }
}

fn composite(
    source: &RgbaImage,
    mask: &GrayImage,
    params: DerivedFilterParameters,
    kernel: KernelSettings,
    output: OutputSize,
) -> RgbaImage {
    let (src_w, src_h) = source.dimensions();
    let texel = (1.0 / src_w as f32, 1.0 / src_h as f32);
    let radius = kernel.radius as i32;
    let spatial_denom = 2.0 * params.spatial_sigma * params.spatial_sigma;
    let range_denom = 2.0 * params.range_sigma * params.range_sigma;
    let passthrough = params.is_passthrough();

    let mut out = RgbaImage::new(output.width, output.height);
    let row_len = output.width as usize * 4;
    out.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            let v = (y as f32 + 0.5) / output.height as f32;
            for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
                let u = (x as f32 + 0.5) / output.width as f32;
                let original = sample_rgba(source, u, v);
                let coverage = sample_gray(mask, u, v);

                let color = if passthrough || coverage < kernel.mask_threshold {
                    original
                } else {
                    let mut sum = [0.0f32; 3];
                    let mut total = 0.0f32;
                    for dy in -radius..=radius {
                        for dx in -radius..=radius {
                            let tap = sample_rgba(
                                source,
                                u + dx as f32 * texel.0,
                                v + dy as f32 * texel.1,
                            );
                            let diff = [
                                tap[0] - original[0],
                                tap[1] - original[1],
                                tap[2] - original[2],
                            ];
                            let dist_sq = (dx * dx + dy * dy) as f32;
                            let color_sq = diff[0] * diff[0] + diff[1] * diff[1] + diff[2] * diff[2];
                            let weight =
                                (-dist_sq / spatial_denom).exp() * (-color_sq / range_denom).exp();
                            for c in 0..3 {
                                sum[c] += tap[c] * weight;
                            }
                            total += weight;
                        }
                    }
                    let mut blended = original;
                    for c in 0..3 {
                        let filtered = sum[c] / total;
                        blended[c] = original[c] + (filtered - original[c]) * coverage;
                    }
                    blended
                };

                for (dst, value) in pixel.iter_mut().zip(color) {
                    *dst = (value * 255.0).round().clamp(0.0, 255.0) as u8;
                }
            }
        });
    out
}

/// Bilinear lookup with clamp-to-edge addressing; `u`/`v` are normalized.
fn bilinear_taps(u: f32, v: f32, width: u32, height: u32) -> [(u32, u32, f32); 4] {
    let fx = u * width as f32 - 0.5;
    let fy = v * height as f32 - 0.5;
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;
    let clamp_x = |x: f32| x.clamp(0.0, (width - 1) as f32) as u32;
    let clamp_y = |y: f32| y.clamp(0.0, (height - 1) as f32) as u32;
    let (xa, xb) = (clamp_x(x0), clamp_x(x0 + 1.0));
    let (ya, yb) = (clamp_y(y0), clamp_y(y0 + 1.0));
    [
        (xa, ya, (1.0 - tx) * (1.0 - ty)),
        (xb, ya, tx * (1.0 - ty)),
        (xa, yb, (1.0 - tx) * ty),
        (xb, yb, tx * ty),
    ]
}

fn sample_rgba(image: &RgbaImage, u: f32, v: f32) -> [f32; 4] {
    let mut acc = [0.0f32; 4];
    for (x, y, w) in bilinear_taps(u, v, image.width(), image.height()) {
        let px = image.get_pixel(x, y).0;
        for c in 0..4 {
            acc[c] += f32::from(px[c]) / 255.0 * w;
        }
    }
    acc
}

fn sample_gray(image: &GrayImage, u: f32, v: f32) -> f32 {
    bilinear_taps(u, v, image.width(), image.height())
        .into_iter()
        .map(|(x, y, w)| f32::from(image.get_pixel(x, y)[0]) / 255.0 * w)
        .sum()
}
