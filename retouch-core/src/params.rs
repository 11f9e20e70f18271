//! User-facing render parameters and their mapping onto filter sigmas.

use retouch_utils::config::SmoothingSettings;

/// Largest accepted intensity value.
pub const MAX_INTENSITY: u8 = 100;

/// The only mutable inputs of the render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderParameters {
    /// Smoothing strength in `0..=100`.
    pub intensity: u8,
    /// Momentary before/after comparison; forces pass-through while held.
    pub compare_held: bool,
}

impl RenderParameters {
    pub fn new(intensity: u8) -> Self {
        Self {
            intensity: intensity.min(MAX_INTENSITY),
            compare_held: false,
        }
    }
}

impl Default for RenderParameters {
    fn default() -> Self {
        Self::new(SmoothingSettings::default().default_intensity)
    }
}

/// Gaussian spreads consumed by the compositor for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedFilterParameters {
    /// Spatial spread in source pixels.
    pub spatial_sigma: f32,
    /// Color spread in normalized `[0, 1]` units. Zero disables filtering.
    pub range_sigma: f32,
}

impl DerivedFilterParameters {
    /// `true` when the compositor must emit the source unchanged.
    pub fn is_passthrough(&self) -> bool {
        self.range_sigma <= 0.0
    }
}

/// Monotonic intensity → sigma mapping.
///
/// `spatial = base_spatial + t * spatial_range` and `range = t * range_max`
/// where `t = intensity / 100`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterMapping {
    pub base_spatial: f32,
    pub spatial_range: f32,
    pub range_max: f32,
}

impl Default for FilterMapping {
    fn default() -> Self {
        (&SmoothingSettings::default()).into()
    }
}

impl From<&SmoothingSettings> for FilterMapping {
    fn from(settings: &SmoothingSettings) -> Self {
        let mut settings = *settings;
        settings.sanitize();
        Self {
            base_spatial: settings.base_spatial,
            spatial_range: settings.spatial_range,
            range_max: settings.range_max,
        }
    }
}

impl FilterMapping {
    pub fn derive(&self, params: &RenderParameters) -> DerivedFilterParameters {
        if params.compare_held || params.intensity == 0 {
            return self.passthrough();
        }
        let t = f32::from(params.intensity.min(MAX_INTENSITY)) / f32::from(MAX_INTENSITY);
        DerivedFilterParameters {
            spatial_sigma: self.base_spatial + t * self.spatial_range,
            range_sigma: t * self.range_max,
        }
    }

    /// Values used at intensity 0 and while compare is held.
    pub fn passthrough(&self) -> DerivedFilterParameters {
        DerivedFilterParameters {
            spatial_sigma: self.base_spatial,
            range_sigma: 0.0,
        }
    }

    /// Closed interval covered by `spatial_sigma`.
    pub fn spatial_bounds(&self) -> (f32, f32) {
        (self.base_spatial, self.base_spatial + self.spatial_range)
    }

    /// Closed interval covered by `range_sigma`.
    pub fn range_bounds(&self) -> (f32, f32) {
        (0.0, self.range_max)
    }
}
