//! Edge-preserving compositing backends.
//!
//! Both backends run the same joint bilateral filter: for each output pixel a
//! `(2r+1)²` neighborhood of the source is averaged with weights
//! `exp(-d²/2σs²) · exp(-|Δc|²/2σr²)`, normalized by their sum, and blended
//! over the original by the skin mask. Pixels whose mask falls below the
//! threshold, and every pixel while `range_sigma` is zero, pass through.

mod cpu;
mod gpu;

pub use cpu::CpuCompositor;
pub use gpu::GpuCompositor;

use image::RgbaImage;
use log::{info, warn};
use retouch_utils::{
    GpuAvailability, GpuContext, GpuContextOptions,
    config::SmoothingSettings,
    gpu::GPU_TARGET,
};

use crate::{error::PipelineError, mask::SkinMask, params::DerivedFilterParameters, source::SourceImage};

/// WGSL source of the compositing program.
pub const COMPOSITE_WGSL: &str = include_str!("composite.wgsl");

/// Kernel shape shared by every render of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelSettings {
    /// Half-width of the neighborhood; 2 gives 5×5 taps.
    pub radius: u32,
    /// Mask values below this skip filtering.
    pub mask_threshold: f32,
}

impl Default for KernelSettings {
    fn default() -> Self {
        (&SmoothingSettings::default()).into()
    }
}

impl From<&SmoothingSettings> for KernelSettings {
    fn from(settings: &SmoothingSettings) -> Self {
        let mut settings = *settings;
        settings.sanitize();
        Self {
            radius: settings.kernel_radius,
            mask_threshold: settings.mask_threshold,
        }
    }
}

/// Pixel dimensions of a rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSize {
    pub width: u32,
    pub height: u32,
}

impl OutputSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Native resolution of `image`.
    pub fn of(image: &SourceImage) -> Self {
        Self::new(image.width(), image.height())
    }

    /// Reject empty frames and frames larger than `max_dimension` on either side.
    pub fn validate(self, max_dimension: Option<u32>) -> Result<Self, PipelineError> {
        let invalid = |reason: String| PipelineError::InvalidOutput {
            width: self.width,
            height: self.height,
            reason,
        };
        if self.width == 0 || self.height == 0 {
            return Err(invalid("zero area".into()));
        }
        if let Some(max) = max_dimension
            && (self.width > max || self.height > max)
        {
            return Err(invalid(format!("exceeds the backend limit of {max}px")));
        }
        Ok(self)
    }
}

/// Pixel work behind the render loop.
///
/// The controller calls `prepare` once, `upload` once per image/mask pair,
/// `render` on every parameter change and `release` when a session ends.
pub trait CompositorBackend {
    /// Short identifier for logs.
    fn name(&self) -> &'static str;

    /// Compile programs and allocate session-independent state.
    fn prepare(&mut self, kernel: KernelSettings) -> Result<(), PipelineError>;

    /// Replace the resident source and mask. Previous resources are dropped first.
    fn upload(&mut self, image: &SourceImage, mask: &SkinMask) -> Result<(), PipelineError>;

    /// Composite one frame at `output` resolution.
    fn render(
        &mut self,
        params: DerivedFilterParameters,
        output: OutputSize,
    ) -> Result<RgbaImage, PipelineError>;

    /// Free resident textures. Safe to call repeatedly.
    fn release(&mut self);

    /// Largest frame side `render` accepts; `None` means unbounded.
    fn max_output_dimension(&self) -> Option<u32> {
        None
    }
}

impl<B: CompositorBackend + ?Sized> CompositorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn prepare(&mut self, kernel: KernelSettings) -> Result<(), PipelineError> {
        (**self).prepare(kernel)
    }

    fn upload(&mut self, image: &SourceImage, mask: &SkinMask) -> Result<(), PipelineError> {
        (**self).upload(image, mask)
    }

    fn render(
        &mut self,
        params: DerivedFilterParameters,
        output: OutputSize,
    ) -> Result<RgbaImage, PipelineError> {
        (**self).render(params, output)
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn max_output_dimension(&self) -> Option<u32> {
        (**self).max_output_dimension()
    }
}

/// Pick the GPU compositor when an adapter is available, otherwise the CPU reference.
pub fn select_backend(options: &GpuContextOptions) -> Box<dyn CompositorBackend> {
    match GpuContext::init_with_fallback(options) {
        GpuAvailability::Available(context) => {
            info!(
                target: GPU_TARGET,
                "Compositing on GPU '{}' ({:?})",
                context.adapter_info().name,
                context.adapter_info().backend
            );
            Box::new(GpuCompositor::new(context))
        }
        GpuAvailability::Disabled { reason } => {
            info!(target: GPU_TARGET, "GPU compositing disabled: {reason}");
            Box::new(CpuCompositor::new())
        }
        GpuAvailability::Unavailable { error } => {
            warn!(target: GPU_TARGET, "GPU unavailable ({error}); compositing on CPU");
            Box::new(CpuCompositor::new())
        }
    }
}

fn check_output(backend: &impl CompositorBackend, output: OutputSize) -> Result<(), PipelineError> {
    output.validate(backend.max_output_dimension()).map(drop)
}
