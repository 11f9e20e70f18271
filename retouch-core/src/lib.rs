//! Landmark-guided skin smoothing.
//!
//! This crate turns facial landmarks into a feathered skin mask, keeps the
//! source and mask resident on the compositor backend, and re-renders an
//! edge-preserving smoothing pass whenever the intensity or compare control
//! changes.

/// Edge-preserving compositor backends (wgpu and CPU reference).
pub mod compositor;
/// Render loop controller and its state machine.
pub mod controller;
/// Background landmark detection jobs.
pub mod detection;
/// Controller error taxonomy.
pub mod error;
/// Before/after export for the plan generator.
pub mod export;
/// Landmark points and ring topology.
pub mod landmarks;
/// Skin mask construction.
pub mod mask;
/// Intensity to filter parameter mapping.
pub mod params;
/// Decoded source image.
pub mod source;
/// GPU-resident source and mask textures.
pub mod textures;

/// Log target for controller state transitions and detection bookkeeping.
pub const PIPELINE_TARGET: &str = "retouch::pipeline";

pub use compositor::{
    COMPOSITE_WGSL, CompositorBackend, CpuCompositor, GpuCompositor, KernelSettings, OutputSize,
    select_backend,
};
pub use controller::{DetectionOutcome, PipelineConfig, PipelineState, RenderController};
pub use detection::{
    DetectionMessage, LandmarkDetector, SessionToken, StaticLandmarks, start_detection,
};
pub use error::PipelineError;
pub use export::{EncodedPayload, ExportPair, PlanRequest};
pub use landmarks::{LandmarkError, LandmarkSet, LandmarkTopology, NormalizedPoint, Ring};
pub use mask::{FeatherRadii, MaskError, SkinMask, build_mask, build_mask_for_faces};
pub use params::{DerivedFilterParameters, FilterMapping, RenderParameters};
pub use source::SourceImage;

/// Returns the crate version for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
