//! Command-line argument definitions for retouch-cli.

use clap::{ArgAction, Parser};
use retouch_utils::config::ExportFormatKind;
use std::path::PathBuf;

/// Smooth facial skin in a portrait using precomputed landmarks.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct RetouchArgs {
    /// Portrait to retouch (PNG, JPEG or WebP).
    #[arg(short, long)]
    pub input: PathBuf,

    /// Landmark JSON describing the face contour, eyes and mouth in normalized coordinates.
    #[arg(short, long)]
    pub landmarks: PathBuf,

    /// Where to write the retouched frame; the extension selects PNG or JPEG.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Smoothing intensity (0-100). Defaults to the configured value.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub intensity: Option<u8>,

    /// Render with the compare control held (writes the untouched source).
    #[arg(long, action = ArgAction::SetTrue)]
    pub compare: bool,

    /// Optional settings JSON. Defaults to `config/retouch_settings.json` when present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Composite on the CPU even if a GPU adapter is available.
    #[arg(long = "no-gpu", action = ArgAction::SetTrue)]
    pub no_gpu: bool,

    /// Directory receiving the encoded before/after pair and `plan_request.json`.
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// Encoding for the export pair (`jpeg` or `png`).
    #[arg(long, value_name = "FORMAT")]
    pub export_format: Option<ExportFormatKind>,

    /// JPEG quality for exports and `.jpg` outputs (1-100).
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: Option<u8>,

    /// Override the blur radius of the face contour edge (pixels).
    #[arg(long)]
    pub outer_feather: Option<f32>,

    /// Override the outward feather around eyes and mouth (pixels).
    #[arg(long)]
    pub inner_feather: Option<f32>,

    /// Write the skin mask as a grayscale PNG.
    #[arg(long)]
    pub mask_out: Option<PathBuf>,

    /// Optional JSON file with the user profile embedded in `plan_request.json`.
    #[arg(long, requires = "export_dir")]
    pub profile: Option<PathBuf>,

    /// Enable telemetry timing logs (defaults to settings file).
    #[arg(long, action = ArgAction::SetTrue)]
    pub telemetry: bool,
}
