use thiserror::Error;

use crate::mask::MaskError;

/// Errors surfaced by the render loop controller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// No usable face in the current image. Loading another image recovers.
    #[error("cannot process this image: {0}")]
    NoFace(#[from] MaskError),
    /// The compositor program failed to compile or link.
    #[error("shader compilation failed: {0}")]
    ShaderCompile(String),
    /// Texture allocation, upload or readback failed.
    #[error("GPU resource failure: {0}")]
    Resource(String),
    #[error("pipeline is not ready (state: {state})")]
    NotReady { state: &'static str },
    /// Rejected output resolution; the current frame is kept.
    #[error("invalid output size {width}x{height}: {reason}")]
    InvalidOutput {
        width: u32,
        height: u32,
        reason: String,
    },
    /// The landmark detector has not answered yet; the session keeps loading.
    #[error("landmark detection still pending after {waited_ms} ms")]
    DetectionTimeout { waited_ms: u64 },
    /// A fatal error was already reported for this pipeline.
    #[error("pipeline failed earlier and accepts no further work")]
    SessionFailed,
    #[error("failed to encode export image: {0}")]
    Encode(String),
}

impl PipelineError {
    /// `true` for bad input or misuse, `false` for environment or build defects.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoFace(_)
                | Self::NotReady { .. }
                | Self::InvalidOutput { .. }
                | Self::DetectionTimeout { .. }
                | Self::Encode(_)
        )
    }
}
