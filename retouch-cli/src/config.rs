//! Configuration loading and CLI override logic.

use std::path::PathBuf;

use anyhow::Result;
use retouch_utils::{config::AppSettings, normalize_path};

use crate::args::RetouchArgs;

/// Resolve `--config` against the working directory and load settings.
pub fn load_settings(config_path: Option<&PathBuf>) -> Result<AppSettings> {
    let resolved = config_path.map(normalize_path).transpose()?;
    AppSettings::load_or_default(resolved.as_deref())
}

/// Apply command-line arguments to override loaded or default settings.
pub fn apply_cli_overrides(settings: &mut AppSettings, args: &RetouchArgs) {
    if args.no_gpu {
        settings.gpu.enabled = false;
    }
    if args.telemetry {
        settings.telemetry.enabled = true;
    }

    if let Some(intensity) = args.intensity {
        settings.smoothing.default_intensity = intensity;
    }
    if let Some(outer) = args.outer_feather {
        settings.mask.outer_feather_px = outer;
    }
    if let Some(inner) = args.inner_feather {
        settings.mask.inner_feather_px = inner;
    }

    if let Some(format) = args.export_format {
        settings.export.format = format;
    }
    if let Some(quality) = args.jpeg_quality {
        settings.export.jpeg_quality = quality;
    }

    settings.sanitize();
}
