//! Common helpers shared across the retouch crates.

/// Application configuration and settings management.
pub mod config;
/// Shared GPU context initialization helpers.
pub mod gpu;
/// Image loading helpers.
pub mod image_utils;
/// Declarative macros for wgpu render boilerplate.
pub mod macros;
/// Image encoding helpers (PNG/JPEG, base64 payloads).
pub mod output;
/// Instrumentation helpers for optional performance tracing.
pub mod telemetry;

use std::path::Path;

use anyhow::Result;
use log::LevelFilter;

pub use config::{
    AppSettings, ExportFormatKind, ExportSettings, GpuSettings, MaskSettings, SmoothingSettings,
    TelemetrySettings, default_settings_path,
};
pub use gpu::{GpuAvailability, GpuContext, GpuContextOptions, GpuInitError};
pub use image_utils::load_rgba_image;
pub use output::{EncodedImage, ExportFormat, encode_rgba, save_gray_png, save_rgba_image};
pub use telemetry::{
    TimingGuard, configure as configure_telemetry, telemetry_allows, telemetry_enabled,
    timing_guard,
};

/// Initialize logging once for CLI and embedding hosts.
///
/// This function respects the `RUST_LOG` environment variable if it is set.
/// Otherwise, it falls back to the provided default filter level.
///
/// # Arguments
///
/// * `default_filter` - The `LevelFilter` to use if `RUST_LOG` is not set.
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module(telemetry::TELEMETRY_TARGET, LevelFilter::Trace);

    if builder.try_init().is_err() {
        // Logger already initialized; nothing to do.
    }
    Ok(())
}

/// Validate that a path exists and resolve it to an absolute path.
///
/// # Arguments
///
/// * `path` - The path to validate and normalize.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> Result<std::path::PathBuf> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
    Ok(path.canonicalize()?)
}
