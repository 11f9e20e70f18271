mod args;
mod config;
mod landmarks_file;

use std::{
    fs,
    path::Path,
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{Level, error, info};
use retouch_core::{
    CompositorBackend, CpuCompositor, PipelineConfig, PipelineError, RenderController,
    SourceImage, StaticLandmarks, select_backend,
};
use retouch_utils::{
    configure_telemetry, init_logging, normalize_path,
    output::{ExportFormat, save_gray_png, save_rgba_image},
    timing_guard,
};

use crate::{
    args::RetouchArgs,
    config::{apply_cli_overrides, load_settings},
    landmarks_file::load_landmarks,
};

/// Exit status when the image itself cannot be processed (no usable face).
const EXIT_UNPROCESSABLE: u8 = 2;

const DETECTION_TIMEOUT: Duration = Duration::from_secs(60);

fn main() -> ExitCode {
    if let Err(err) = init_logging(log::LevelFilter::Info) {
        eprintln!("failed to initialize logging: {err:#}");
    }
    let args = RetouchArgs::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let pipeline = err
                .chain()
                .find_map(|cause| cause.downcast_ref::<PipelineError>());
            match pipeline {
                Some(PipelineError::NoFace(reason)) => {
                    eprintln!("cannot process this image: {reason}");
                    ExitCode::from(EXIT_UNPROCESSABLE)
                }
                _ => {
                    error!("{err:#}");
                    eprintln!("retouch failed: {err:#}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn run(args: &RetouchArgs) -> Result<()> {
    let mut settings = load_settings(args.config.as_ref())?;
    apply_cli_overrides(&mut settings, args);
    configure_telemetry(
        settings.telemetry.enabled,
        settings.telemetry.level_filter(),
    );
    let _guard = timing_guard("retouch_cli::run", Level::Info);

    let input_path = normalize_path(&args.input)?;
    let landmarks_path = normalize_path(&args.landmarks)?;
    let image = SourceImage::open(&input_path)?;
    let faces = load_landmarks(&landmarks_path)?;
    info!(
        "Loaded {}x{} image {} with {} face(s)",
        image.width(),
        image.height(),
        input_path.display(),
        faces.len()
    );

    let backend: Box<dyn CompositorBackend> = if settings.gpu.enabled {
        select_backend(&(&settings.gpu).into())
    } else {
        info!("GPU compositing disabled; using CPU compositor");
        Box::new(CpuCompositor::new())
    };
    let mut controller = RenderController::new(backend, PipelineConfig::from(&settings));
    info!("Compositing with {} backend", controller.backend().name());

    controller.load_image_with(image, Arc::new(StaticLandmarks::new(faces)))?;
    controller.wait_for_detection(DETECTION_TIMEOUT)?;
    if args.compare {
        controller.press_compare()?;
    }
    info!(
        "Rendered at intensity {}{}",
        controller.parameters().intensity,
        if args.compare { " (compare held)" } else { "" }
    );

    if let Some(path) = args.output.as_ref() {
        let format = ExportFormat::from_path(path, settings.export.jpeg_quality).with_context(
            || format!("unsupported output extension for {} (use .png or .jpg)", path.display()),
        )?;
        let frame = controller
            .frame()
            .ok_or(PipelineError::NotReady {
                state: controller.state().name(),
            })?;
        save_rgba_image(frame, path, format)?;
        info!("Saved retouched image to {}", path.display());
    }

    if let Some(path) = args.mask_out.as_ref()
        && let Some(mask) = controller.mask()
    {
        save_gray_png(mask.as_gray(), path)?;
        info!("Saved skin mask to {}", path.display());
    }

    if let Some(dir) = args.export_dir.as_ref() {
        let profile = match args.profile.as_ref() {
            Some(path) => read_profile(path)?,
            None => serde_json::Value::Object(Default::default()),
        };
        write_export(&controller, settings.export.format(), profile, dir)?;
    }

    Ok(())
}

fn read_profile(path: &Path) -> Result<serde_json::Value> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read profile {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse profile JSON at {}", path.display()))
}

fn write_export<B: CompositorBackend>(
    controller: &RenderController<B>,
    format: ExportFormat,
    profile: serde_json::Value,
    dir: &Path,
) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export directory {}", dir.display()))?;

    let pair = controller.export_pair(format)?;
    let ext = format.extension();
    for (name, encoded) in [("original", &pair.original), ("retouched", &pair.retouched)] {
        let path = dir.join(format!("{name}.{ext}"));
        fs::write(&path, &encoded.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    let request_path = dir.join("plan_request.json");
    let request = pair.into_plan_request(profile);
    let file = fs::File::create(&request_path)
        .with_context(|| format!("failed to create {}", request_path.display()))?;
    serde_json::to_writer_pretty(file, &request)
        .with_context(|| format!("failed to write {}", request_path.display()))?;
    info!("Exported before/after pair to {}", dir.display());
    Ok(())
}
