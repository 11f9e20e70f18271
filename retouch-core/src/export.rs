//! Before/after export for the external improvement-plan generator.

use retouch_utils::output::EncodedImage;
use serde::{Deserialize, Serialize};

/// Encoded original and retouched frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPair {
    pub original: EncodedImage,
    pub retouched: EncodedImage,
}

impl ExportPair {
    /// Bundle the pair with an opaque user profile for transmission.
    pub fn into_plan_request(self, profile: serde_json::Value) -> PlanRequest {
        PlanRequest {
            original: EncodedPayload::from(&self.original),
            retouched: EncodedPayload::from(&self.retouched),
            profile,
        }
    }
}

/// Base64 image payload as sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedPayload {
    pub mime: String,
    pub data: String,
}

impl From<&EncodedImage> for EncodedPayload {
    fn from(image: &EncodedImage) -> Self {
        Self {
            mime: image.mime.to_string(),
            data: image.to_base64(),
        }
    }
}

/// Request body handed to the plan generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub original: EncodedPayload,
    pub retouched: EncodedPayload,
    /// User profile data; opaque to the pipeline.
    #[serde(default)]
    pub profile: serde_json::Value,
}
