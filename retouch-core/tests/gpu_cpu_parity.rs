mod common;

use std::sync::Arc;

use common::{max_abs_diff, synthetic_face, textured_portrait};
use retouch_core::{
    CompositorBackend, CpuCompositor, FeatherRadii, FilterMapping, GpuCompositor, KernelSettings,
    OutputSize, PipelineConfig, PipelineError, PipelineState, RenderController, RenderParameters,
    SkinMask, SourceImage, build_mask,
};
use retouch_utils::gpu::{GpuAvailability, GpuContext, GpuContextOptions};

const CHANNEL_TOLERANCE: u8 = 4;

fn gpu_context() -> Option<Arc<GpuContext>> {
    match GpuContext::init_with_fallback(&GpuContextOptions::default()) {
        GpuAvailability::Available(ctx) => Some(ctx),
        GpuAvailability::Disabled { reason } => {
            eprintln!("skipping GPU compositor test (GPU disabled: {reason})");
            None
        }
        GpuAvailability::Unavailable { error } => {
            eprintln!("skipping GPU compositor test (GPU unavailable: {error})");
            None
        }
    }
}

fn fixture(size: u32) -> (SourceImage, SkinMask) {
    let image = SourceImage::new(textured_portrait(size));
    let mask = build_mask(image.dimensions(), &synthetic_face(), FeatherRadii::default())
        .expect("mask builds");
    (image, mask)
}

fn render_with<B: CompositorBackend>(
    backend: &mut B,
    image: &SourceImage,
    mask: &SkinMask,
    intensity: u8,
    output: OutputSize,
) -> image::RgbaImage {
    backend.prepare(KernelSettings::default()).expect("prepare");
    backend.upload(image, mask).expect("upload");
    let params = FilterMapping::default().derive(&RenderParameters::new(intensity));
    let frame = backend.render(params, output).expect("render");
    backend.release();
    frame
}

#[test]
fn gpu_frame_matches_cpu_reference() {
    let Some(ctx) = gpu_context() else {
        return;
    };
    let (image, mask) = fixture(128);
    let output = OutputSize::of(&image);

    for intensity in [25, 50, 100] {
        let cpu = render_with(&mut CpuCompositor::new(), &image, &mask, intensity, output);
        let gpu = render_with(&mut GpuCompositor::new(ctx.clone()), &image, &mask, intensity, output);
        assert_eq!(cpu.dimensions(), gpu.dimensions());
        let delta = max_abs_diff(&cpu, &gpu);
        assert!(
            delta <= CHANNEL_TOLERANCE,
            "intensity {intensity}: GPU differs from CPU by {delta}"
        );
    }
}

#[test]
fn gpu_passthrough_returns_source() {
    let Some(ctx) = gpu_context() else {
        return;
    };
    let (image, mask) = fixture(64);
    let frame = render_with(
        &mut GpuCompositor::new(ctx),
        &image,
        &mask,
        0,
        OutputSize::of(&image),
    );
    assert!(max_abs_diff(&frame, image.pixels()) <= 1);
}

#[test]
fn gpu_renders_at_requested_resolution() {
    let Some(ctx) = gpu_context() else {
        return;
    };
    let (image, mask) = fixture(64);
    // Odd width exercises row padding on readback.
    let frame = render_with(
        &mut GpuCompositor::new(ctx),
        &image,
        &mask,
        50,
        OutputSize::new(37, 20),
    );
    assert_eq!(frame.dimensions(), (37, 20));
}

#[test]
fn invalid_program_fails_session() {
    let Some(ctx) = gpu_context() else {
        return;
    };
    let backend = GpuCompositor::with_shader_source(ctx, "fn fs_main( -> {");
    let mut controller = RenderController::new(backend, PipelineConfig::default());

    let err = controller.load_image(textured_portrait(32)).unwrap_err();
    assert!(matches!(err, PipelineError::ShaderCompile(_)), "got {err:?}");
    assert!(matches!(
        controller.state(),
        PipelineState::Failed(PipelineError::ShaderCompile(_))
    ));
    assert_eq!(
        controller.load_image(textured_portrait(32)).unwrap_err(),
        PipelineError::SessionFailed
    );
}
