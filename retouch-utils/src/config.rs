//! Shared configuration types consumed across the retouch workspace.
//!
//! Every tunable constant of the smoothing pipeline lives here so that hosts
//! can persist them as JSON and tweak perceived quality without a rebuild.

use crate::{gpu::GpuContextOptions, output::ExportFormat};

use anyhow::{Context, Result};
use log::{LevelFilter, debug, info};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Largest feather radius accepted for either mask ring, in pixels.
pub const MAX_FEATHER_PX: f32 = 128.0;
/// Largest supported bilateral kernel radius (9×9 taps).
pub const MAX_KERNEL_RADIUS: u32 = 4;

/// Feathering applied while rasterizing the skin mask.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MaskSettings {
    /// Blur radius (pixels) applied to the outer face contour.
    pub outer_feather_px: f32,
    /// Outward feather radius (pixels) around each excluded eye/mouth ring.
    pub inner_feather_px: f32,
}

impl Default for MaskSettings {
    fn default() -> Self {
        Self {
            outer_feather_px: 15.0,
            inner_feather_px: 9.0,
        }
    }
}

impl MaskSettings {
    /// Clamp radii to the supported range; non-finite values fall back to defaults.
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        self.outer_feather_px = sanitize_radius(self.outer_feather_px, defaults.outer_feather_px);
        self.inner_feather_px = sanitize_radius(self.inner_feather_px, defaults.inner_feather_px);
    }
}

fn sanitize_radius(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, MAX_FEATHER_PX)
    } else {
        fallback
    }
}

/// Constants mapping the 0–100 intensity control onto bilateral filter sigmas.
///
/// `spatial_sigma = base_spatial + (intensity / 100) * spatial_range` and
/// `range_sigma = (intensity / 100) * range_max`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SmoothingSettings {
    /// Spatial sigma (pixels) at intensity 0.
    pub base_spatial: f32,
    /// Additional spatial sigma reached at intensity 100.
    pub spatial_range: f32,
    /// Range sigma in normalized color units at intensity 100.
    pub range_max: f32,
    /// Half-width of the sampling kernel; 2 gives the 5×5 neighborhood.
    pub kernel_radius: u32,
    /// Mask values below this skip filtering entirely.
    pub mask_threshold: f32,
    /// Intensity applied to a freshly loaded image.
    pub default_intensity: u8,
}

impl Default for SmoothingSettings {
    fn default() -> Self {
        Self {
            base_spatial: 3.0,
            spatial_range: 5.0,
            range_max: 0.2,
            kernel_radius: 2,
            mask_threshold: 0.05,
            default_intensity: 50,
        }
    }
}

impl SmoothingSettings {
    /// Clamp values so every intensity maps to finite, non-negative sigmas.
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        self.base_spatial = positive_or(self.base_spatial, defaults.base_spatial).max(0.1);
        self.spatial_range = positive_or(self.spatial_range, defaults.spatial_range);
        self.range_max = positive_or(self.range_max, defaults.range_max).min(1.0);
        self.kernel_radius = self.kernel_radius.clamp(1, MAX_KERNEL_RADIUS);
        self.mask_threshold = positive_or(self.mask_threshold, defaults.mask_threshold).min(1.0);
        self.default_intensity = self.default_intensity.min(100);
    }
}

fn positive_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        fallback
    }
}

/// Encoding used when the before/after pair is exported.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportSettings {
    /// `jpeg` or `png`.
    pub format: ExportFormatKind,
    /// JPEG quality (1-100, only used when format is jpeg)
    pub jpeg_quality: u8,
}

/// Serializable name of an export encoding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormatKind {
    #[default]
    Jpeg,
    Png,
}

impl std::str::FromStr for ExportFormatKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            other => Err(format!(
                "invalid export format '{other}'; expected 'jpeg' or 'png'"
            )),
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            format: ExportFormatKind::Jpeg,
            jpeg_quality: 85,
        }
    }
}

impl ExportSettings {
    /// Resolve the concrete encoder configuration.
    pub fn format(&self) -> ExportFormat {
        match self.format {
            ExportFormatKind::Png => ExportFormat::Png,
            ExportFormatKind::Jpeg => ExportFormat::Jpeg {
                quality: self.jpeg_quality.clamp(1, 100),
            },
        }
    }
}

/// Settings controlling optional runtime telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Whether telemetry timing logs are enabled.
    pub enabled: bool,
    /// Logging level for telemetry output (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Resolve the configured level string into a `LevelFilter`.
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" | "warning" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "trace" => LevelFilter::Trace,
            _ => LevelFilter::Debug,
        }
    }
}

/// GPU runtime preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuSettings {
    /// Composite on the GPU when an adapter is available.
    pub enabled: bool,
    /// Respect `WGPU_*` environment overrides when initializing the backend.
    pub respect_env: bool,
}

impl Default for GpuSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            respect_env: true,
        }
    }
}

impl From<&GpuSettings> for GpuContextOptions {
    fn from(settings: &GpuSettings) -> Self {
        GpuContextOptions {
            enabled: settings.enabled,
            respect_env: settings.respect_env,
            ..Default::default()
        }
    }
}

/// Persistent settings for a retouch host.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppSettings {
    pub mask: MaskSettings,
    pub smoothing: SmoothingSettings,
    pub export: ExportSettings,
    pub gpu: GpuSettings,
    pub telemetry: TelemetrySettings,
}

impl AppSettings {
    /// Clamp every section to its supported range.
    pub fn sanitize(&mut self) {
        self.mask.sanitize();
        self.smoothing.sanitize();
    }

    /// Load settings from a JSON file; missing sections fall back to defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let mut settings: AppSettings = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))?;
        settings.sanitize();
        Ok(settings)
    }

    /// Load from `explicit` if given, else from [`default_settings_path`] when
    /// that file exists, else fall back to defaults.
    ///
    /// A missing explicit file is an error; a missing default file is not.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        Self::load_or(explicit, &default_settings_path())
    }

    fn load_or(explicit: Option<&Path>, fallback: &Path) -> Result<Self> {
        let path = match explicit {
            Some(path) => path,
            None if fallback.exists() => fallback,
            None => {
                debug!("No settings file at {}; using defaults", fallback.display());
                return Ok(Self::default());
            }
        };
        let settings = Self::load_from_path(path)?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Serialize settings to disk as pretty-printed JSON, overwriting any existing file.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let payload =
            serde_json::to_string_pretty(self).context("failed to serialize settings JSON")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings file {}", path.display()))?;
        Ok(())
    }
}

/// Default location of persisted settings (`config/retouch_settings.json`).
pub fn default_settings_path() -> PathBuf {
    env::current_dir()
        .map(|dir| dir.join("config/retouch_settings.json"))
        .unwrap_or_else(|_| PathBuf::from("config/retouch_settings.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn default_settings_round_trip() {
        let file = NamedTempFile::new().expect("tempfile");
        let settings = AppSettings::default();
        settings.save_to_path(file.path()).expect("save");

        let loaded = AppSettings::load_from_path(file.path()).expect("load");
        assert_eq!(loaded.mask, settings.mask);
        assert_eq!(loaded.smoothing, settings.smoothing);
        assert_eq!(loaded.export, settings.export);
        assert_eq!(loaded.gpu.enabled, settings.gpu.enabled);
        assert_eq!(loaded.telemetry.level, settings.telemetry.level);
    }

    #[test]
    fn partial_json_keeps_defaults_and_sanitizes() {
        let file = NamedTempFile::new().expect("tempfile");
        let json = r#"{
            "mask": { "outer_feather_px": 500.0 },
            "smoothing": { "kernel_radius": 12, "range_max": -1.0 }
        }"#;
        fs::write(file.path(), json).expect("write custom settings");

        let loaded = AppSettings::load_from_path(file.path()).expect("load");
        assert_eq!(loaded.mask.outer_feather_px, MAX_FEATHER_PX);
        assert_eq!(loaded.mask.inner_feather_px, 9.0);
        assert_eq!(loaded.smoothing.kernel_radius, MAX_KERNEL_RADIUS);
        assert_eq!(loaded.smoothing.range_max, 0.2);
        assert_eq!(loaded.smoothing.base_spatial, 3.0);
        assert_eq!(loaded.export.format, ExportFormatKind::Jpeg);
    }

    #[test]
    fn export_format_resolves_quality() {
        let settings = ExportSettings {
            format: ExportFormatKind::Jpeg,
            jpeg_quality: 0,
        };
        assert_eq!(settings.format(), ExportFormat::Jpeg { quality: 1 });
        assert_eq!("PNG".parse::<ExportFormatKind>(), Ok(ExportFormatKind::Png));
        assert!("tiff".parse::<ExportFormatKind>().is_err());
    }

    #[test]
    fn load_or_default_prefers_explicit_then_fallback() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let fallback = dir.path().join("retouch_settings.json");

        let settings = AppSettings::load_or(None, &fallback).expect("defaults");
        assert_eq!(settings.smoothing.default_intensity, 50);
        assert!(settings.gpu.enabled);

        let mut saved = AppSettings::default();
        saved.smoothing.default_intensity = 12;
        saved.save_to_path(&fallback).expect("save");
        let settings = AppSettings::load_or(None, &fallback).expect("fallback");
        assert_eq!(settings.smoothing.default_intensity, 12);

        let explicit = dir.path().join("explicit.json");
        assert!(AppSettings::load_or(Some(&explicit), &fallback).is_err());
        fs::write(&explicit, r#"{ "smoothing": { "default_intensity": 70 } }"#).expect("write");
        let settings = AppSettings::load_or(Some(&explicit), &fallback).expect("explicit");
        assert_eq!(settings.smoothing.default_intensity, 70);
    }

    #[test]
    fn telemetry_level_parses_variants() {
        let telemetry = TelemetrySettings {
            enabled: true,
            level: "TRACE".into(),
        };
        assert_eq!(telemetry.level_filter(), LevelFilter::Trace);
        let telemetry = TelemetrySettings {
            enabled: true,
            level: "bogus".into(),
        };
        assert_eq!(telemetry.level_filter(), LevelFilter::Debug);
    }
}
