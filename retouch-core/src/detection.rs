//! Asynchronous landmark detection jobs.
//!
//! Detection is the one long-running step of a session. It runs on the rayon
//! pool and reports back over a channel tagged with the [`SessionToken`] of
//! the image it was started for, so results that arrive after another image
//! was loaded can be recognised and dropped.

use std::sync::{Arc, mpsc::Sender};

use log::{Level, debug};
use retouch_utils::telemetry::timing_guard;

use crate::{PIPELINE_TARGET, landmarks::LandmarkSet, source::SourceImage};

/// External face-landmarking oracle.
pub trait LandmarkDetector: Send + Sync {
    /// Return one landmark set per detected face; an empty list means no face.
    fn detect(&self, image: &SourceImage) -> anyhow::Result<Vec<LandmarkSet>>;
}

/// Detector that always reports the same faces, e.g. landmarks read from a file.
#[derive(Debug, Clone, Default)]
pub struct StaticLandmarks {
    faces: Vec<LandmarkSet>,
}

impl StaticLandmarks {
    pub fn new(faces: Vec<LandmarkSet>) -> Self {
        Self { faces }
    }
}

impl LandmarkDetector for StaticLandmarks {
    fn detect(&self, _image: &SourceImage) -> anyhow::Result<Vec<LandmarkSet>> {
        Ok(self.faces.clone())
    }
}

/// Generation counter identifying one loaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionToken(u64);

impl SessionToken {
    pub(crate) fn first() -> Self {
        Self(1)
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Completed detection job.
#[derive(Debug)]
pub struct DetectionMessage {
    pub token: SessionToken,
    pub result: anyhow::Result<Vec<LandmarkSet>>,
}

/// Run `detector` on a rayon worker and send the result back tagged with `token`.
pub fn start_detection(
    detector: Arc<dyn LandmarkDetector>,
    image: SourceImage,
    token: SessionToken,
    sender: Sender<DetectionMessage>,
) {
    debug!(target: PIPELINE_TARGET, "Starting landmark detection for session {token}");
    rayon::spawn(move || {
        let _guard = timing_guard(
            format!("retouch_core::detect_landmarks {token}"),
            Level::Debug,
        );
        let result = detector.detect(&image);
        if sender.send(DetectionMessage { token, result }).is_err() {
            debug!(
                target: PIPELINE_TARGET,
                "Detection result for session {token} dropped; controller is gone"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use std::{sync::mpsc, time::Duration};

    #[test]
    fn detection_result_carries_its_token() {
        let (sender, receiver) = mpsc::channel();
        let token = SessionToken::first().next();
        start_detection(
            Arc::new(StaticLandmarks::default()),
            SourceImage::new(RgbaImage::new(4, 4)),
            token,
            sender,
        );
        let message = receiver
            .recv_timeout(Duration::from_secs(10))
            .expect("detection finished");
        assert_eq!(message.token, token);
        assert!(message.result.expect("detector ok").is_empty());
    }

    #[test]
    fn tokens_increase() {
        let first = SessionToken::first();
        assert!(first.next() > first);
        assert_eq!(first.next().value(), 2);
    }
}
