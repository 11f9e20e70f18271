//! Render loop controller.
//!
//! Owns one pipeline session at a time and drives it through
//! `Uninitialized → Loading → Ready ⇄ Rendering`, with `Failed` reachable
//! from loading (no usable face) and from any GPU resource step. Renders are
//! synchronous: every parameter change that happens in `Ready` produces
//! exactly one new frame before the call returns.

use std::{
    sync::{
        Arc,
        mpsc::{self, Receiver, Sender},
    },
    time::{Duration, Instant},
};

use image::RgbaImage;
use log::{debug, error, trace, warn};
use retouch_utils::{
    config::AppSettings,
    output::{ExportFormat, encode_rgba},
};

use crate::{
    PIPELINE_TARGET,
    compositor::{CompositorBackend, KernelSettings, OutputSize},
    detection::{DetectionMessage, LandmarkDetector, SessionToken, start_detection},
    error::PipelineError,
    export::ExportPair,
    landmarks::LandmarkSet,
    mask::{FeatherRadii, SkinMask, build_mask_for_faces},
    params::{DerivedFilterParameters, FilterMapping, RenderParameters},
    source::SourceImage,
};

/// Tunables resolved from [`AppSettings`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub feather: FeatherRadii,
    pub mapping: FilterMapping,
    pub kernel: KernelSettings,
    pub default_intensity: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        (&AppSettings::default()).into()
    }
}

impl From<&AppSettings> for PipelineConfig {
    fn from(settings: &AppSettings) -> Self {
        let mut settings = settings.clone();
        settings.sanitize();
        Self {
            feather: (&settings.mask).into(),
            mapping: (&settings.smoothing).into(),
            kernel: (&settings.smoothing).into(),
            default_intensity: settings.smoothing.default_intensity,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Uninitialized,
    /// Waiting for landmarks of the image identified by `token`.
    Loading { token: SessionToken },
    /// A frame for the current parameters is available.
    Ready,
    /// Transient while a frame is being composited.
    Rendering,
    Failed(PipelineError),
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading { .. } => "loading",
            Self::Ready => "ready",
            Self::Rendering => "rendering",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// What happened to a detection result handed to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionOutcome {
    /// Mask built, textures uploaded, first frame rendered.
    Rendered,
    /// The result belonged to an image that is no longer current.
    Discarded,
}

struct Session {
    token: SessionToken,
    image: SourceImage,
    mask: Option<SkinMask>,
    frame: Option<RgbaImage>,
}

pub struct RenderController<B: CompositorBackend> {
    backend: B,
    config: PipelineConfig,
    state: PipelineState,
    prepared: bool,
    fatal: bool,
    last_token: Option<SessionToken>,
    session: Option<Session>,
    parameters: RenderParameters,
    output_size: Option<OutputSize>,
    frames_rendered: u64,
    sender: Sender<DetectionMessage>,
    receiver: Receiver<DetectionMessage>,
}

impl<B: CompositorBackend> RenderController<B> {
    pub fn new(backend: B, config: PipelineConfig) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            backend,
            parameters: RenderParameters::new(config.default_intensity),
            config,
            state: PipelineState::Uninitialized,
            prepared: false,
            fatal: false,
            last_token: None,
            session: None,
            output_size: None,
            frames_rendered: 0,
            sender,
            receiver,
        }
    }

    /// Start a new session for `image`; landmarks are supplied later through
    /// [`apply_detection`](Self::apply_detection).
    ///
    /// Any previous session is torn down, and detection results that still
    /// reference it will be discarded.
    pub fn load_image(&mut self, image: impl Into<SourceImage>) -> Result<SessionToken, PipelineError> {
        self.ensure_prepared()?;
        self.backend.release();

        let token = self.last_token.map_or_else(SessionToken::first, SessionToken::next);
        self.last_token = Some(token);
        let image = image.into();
        debug!(
            target: PIPELINE_TARGET,
            "Session {token}: loaded {}x{} image",
            image.width(),
            image.height()
        );
        self.session = Some(Session {
            token,
            image,
            mask: None,
            frame: None,
        });
        self.transition(PipelineState::Loading { token });
        Ok(token)
    }

    /// Load `image` and run `detector` on it in the background.
    ///
    /// Call [`poll_detections`](Self::poll_detections) or
    /// [`wait_for_detection`](Self::wait_for_detection) to pick up the result.
    pub fn load_image_with(
        &mut self,
        image: impl Into<SourceImage>,
        detector: Arc<dyn LandmarkDetector>,
    ) -> Result<SessionToken, PipelineError> {
        let image = image.into();
        let token = self.load_image(image.clone())?;
        start_detection(detector, image, token, self.sender.clone());
        Ok(token)
    }

    /// Feed the landmark result for session `token`.
    ///
    /// Results for any session other than the one currently loading are a no-op.
    pub fn apply_detection(
        &mut self,
        token: SessionToken,
        result: anyhow::Result<Vec<LandmarkSet>>,
    ) -> Result<DetectionOutcome, PipelineError> {
        let image = match (&self.state, &self.session) {
            (PipelineState::Loading { token: current }, Some(session))
                if *current == token && session.token == token =>
            {
                session.image.clone()
            }
            _ => {
                debug!(
                    target: PIPELINE_TARGET,
                    "Discarding stale detection result for session {token} (state: {})",
                    self.state.name()
                );
                return Ok(DetectionOutcome::Discarded);
            }
        };

        let faces = match result {
            Ok(faces) => faces,
            Err(err) => {
                warn!(target: PIPELINE_TARGET, "Landmark detector failed for session {token}: {err:#}");
                Vec::new()
            }
        };

        let mask = match build_mask_for_faces(image.dimensions(), &faces, self.config.feather) {
            Ok(mask) => mask,
            Err(err) => return self.fail(PipelineError::NoFace(err)),
        };
        if let Err(err) = self.backend.upload(&image, &mask) {
            return self.fail(err);
        }
        if let Some(session) = self.session.as_mut() {
            session.mask = Some(mask);
        }
        self.render_frame()?;
        Ok(DetectionOutcome::Rendered)
    }

    /// Apply every detection result that has arrived so far without blocking.
    ///
    /// Returns `Rendered` if any result produced a frame, `Discarded` if only
    /// stale results were drained, and `None` when nothing was pending.
    pub fn poll_detections(&mut self) -> Result<Option<DetectionOutcome>, PipelineError> {
        let mut outcome = None;
        while let Ok(message) = self.receiver.try_recv() {
            let applied = self.apply_detection(message.token, message.result)?;
            if outcome != Some(DetectionOutcome::Rendered) {
                outcome = Some(applied);
            }
        }
        Ok(outcome)
    }

    /// Block until the current session's detection result arrives or `timeout` elapses.
    pub fn wait_for_detection(&mut self, timeout: Duration) -> Result<DetectionOutcome, PipelineError> {
        let deadline = Instant::now() + timeout;
        loop {
            if !matches!(self.state, PipelineState::Loading { .. }) {
                return Err(PipelineError::NotReady {
                    state: self.state.name(),
                });
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            let message = self.receiver.recv_timeout(remaining).map_err(|_| {
                PipelineError::DetectionTimeout {
                    waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }
            })?;
            match self.apply_detection(message.token, message.result)? {
                DetectionOutcome::Discarded => continue,
                rendered => return Ok(rendered),
            }
        }
    }

    pub fn set_intensity(&mut self, intensity: u8) -> Result<(), PipelineError> {
        let mut next = self.parameters;
        next.intensity = intensity.min(crate::params::MAX_INTENSITY);
        self.apply_parameters(next)
    }

    /// Begin a before/after comparison: the frame shows the untouched source.
    pub fn press_compare(&mut self) -> Result<(), PipelineError> {
        let mut next = self.parameters;
        next.compare_held = true;
        self.apply_parameters(next)
    }

    /// End the comparison and restore the intensity-derived frame.
    pub fn release_compare(&mut self) -> Result<(), PipelineError> {
        let mut next = self.parameters;
        next.compare_held = false;
        self.apply_parameters(next)
    }

    /// Render at a fixed resolution instead of the source size; `None` restores native size.
    pub fn set_output_size(&mut self, output: Option<OutputSize>) -> Result<(), PipelineError> {
        if self.fatal {
            return Err(PipelineError::SessionFailed);
        }
        if self.output_size == output {
            return Ok(());
        }
        if let Some(size) = output {
            size.validate(self.backend.max_output_dimension())?;
        }
        self.output_size = output;
        if self.state.is_ready() {
            self.render_frame()?;
        }
        Ok(())
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn parameters(&self) -> RenderParameters {
        self.parameters
    }

    /// Filter parameters the next frame will use.
    pub fn derived_parameters(&self) -> DerivedFilterParameters {
        self.config.mapping.derive(&self.parameters)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Token of the loaded image, if any.
    pub fn current_token(&self) -> Option<SessionToken> {
        self.session.as_ref().map(|session| session.token)
    }

    pub fn source(&self) -> Option<&SourceImage> {
        self.session.as_ref().map(|session| &session.image)
    }

    pub fn mask(&self) -> Option<&SkinMask> {
        self.session.as_ref().and_then(|session| session.mask.as_ref())
    }

    /// The displayed frame; only available in `Ready`.
    pub fn frame(&self) -> Option<&RgbaImage> {
        if !self.state.is_ready() {
            return None;
        }
        self.session.as_ref().and_then(|session| session.frame.as_ref())
    }

    /// Total frames composited over the controller's lifetime.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Encode the original and the current frame. Does not mutate the pipeline.
    pub fn export_pair(&self, format: ExportFormat) -> Result<ExportPair, PipelineError> {
        if self.fatal {
            return Err(PipelineError::SessionFailed);
        }
        let (Some(session), Some(frame)) = (self.session.as_ref(), self.frame()) else {
            return Err(PipelineError::NotReady {
                state: self.state.name(),
            });
        };
        let encode = |image: &RgbaImage| {
            encode_rgba(image, format).map_err(|err| PipelineError::Encode(format!("{err:#}")))
        };
        Ok(ExportPair {
            original: encode(session.image.pixels())?,
            retouched: encode(frame)?,
        })
    }

    fn ensure_prepared(&mut self) -> Result<(), PipelineError> {
        if self.fatal {
            return Err(PipelineError::SessionFailed);
        }
        if !self.prepared {
            if let Err(err) = self.backend.prepare(self.config.kernel) {
                return self.fail(err);
            }
            debug!(target: PIPELINE_TARGET, "Prepared {} compositor", self.backend.name());
            self.prepared = true;
        }
        Ok(())
    }

    fn apply_parameters(&mut self, next: RenderParameters) -> Result<(), PipelineError> {
        if self.fatal {
            return Err(PipelineError::SessionFailed);
        }
        if let PipelineState::Failed(_) = self.state {
            return Err(PipelineError::NotReady {
                state: self.state.name(),
            });
        }
        if next == self.parameters {
            return Ok(());
        }
        self.parameters = next;
        if self.state.is_ready() {
            self.render_frame()?;
        }
        Ok(())
    }

    fn render_frame(&mut self) -> Result<(), PipelineError> {
        let Some(output) = self
            .session
            .as_ref()
            .map(|session| self.output_size.unwrap_or_else(|| OutputSize::of(&session.image)))
        else {
            return Err(PipelineError::NotReady {
                state: self.state.name(),
            });
        };
        let derived = self.derived_parameters();
        self.transition(PipelineState::Rendering);
        match self.backend.render(derived, output) {
            Ok(frame) => {
                if let Some(session) = self.session.as_mut() {
                    session.frame = Some(frame);
                }
                self.frames_rendered += 1;
                self.transition(PipelineState::Ready);
                Ok(())
            }
            Err(err) => self.fail(err),
        }
    }

    fn fail<T>(&mut self, err: PipelineError) -> Result<T, PipelineError> {
        if err.is_recoverable() {
            warn!(target: PIPELINE_TARGET, "{err}");
        } else {
            error!(target: PIPELINE_TARGET, "Pipeline failure: {err}");
            self.fatal = true;
            self.backend.release();
        }
        self.transition(PipelineState::Failed(err.clone()));
        Err(err)
    }

    fn transition(&mut self, next: PipelineState) {
        let from = self.state.name();
        if matches!(next, PipelineState::Rendering) || matches!(self.state, PipelineState::Rendering) {
            trace!(target: PIPELINE_TARGET, "{from} -> {}", next.name());
        } else {
            debug!(target: PIPELINE_TARGET, "{from} -> {}", next.name());
        }
        self.state = next;
    }
}

impl<B: CompositorBackend> Drop for RenderController<B> {
    fn drop(&mut self) {
        self.backend.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compositor::CpuCompositor, landmarks::NormalizedPoint};
    use image::Rgba;

    fn face() -> LandmarkSet {
        let square = |cx: f32, cy: f32, h: f32| {
            vec![
                NormalizedPoint::new(cx - h, cy - h),
                NormalizedPoint::new(cx + h, cy - h),
                NormalizedPoint::new(cx + h, cy + h),
                NormalizedPoint::new(cx - h, cy + h),
            ]
        };
        LandmarkSet::from_rings(
            square(0.5, 0.5, 0.35),
            square(0.35, 0.4, 0.05),
            square(0.65, 0.4, 0.05),
            square(0.5, 0.7, 0.06),
        )
    }

    fn ready_controller() -> RenderController<CpuCompositor> {
        let mut controller = RenderController::new(CpuCompositor::new(), PipelineConfig::default());
        let token = controller
            .load_image(RgbaImage::from_pixel(48, 48, Rgba([180, 140, 120, 255])))
            .expect("load");
        assert_eq!(controller.state(), &PipelineState::Loading { token });
        let outcome = controller
            .apply_detection(token, Ok(vec![face()]))
            .expect("detection applies");
        assert_eq!(outcome, DetectionOutcome::Rendered);
        controller
    }

    #[test]
    fn starts_uninitialized_with_default_intensity() {
        let controller = RenderController::new(CpuCompositor::new(), PipelineConfig::default());
        assert_eq!(controller.state(), &PipelineState::Uninitialized);
        assert_eq!(controller.parameters().intensity, 50);
        assert!(controller.frame().is_none());
    }

    #[test]
    fn each_parameter_change_renders_once() {
        let mut controller = ready_controller();
        assert!(controller.state().is_ready());
        assert_eq!(controller.frames_rendered(), 1);

        controller.set_intensity(70).expect("intensity");
        assert_eq!(controller.frames_rendered(), 2);
        controller.set_intensity(70).expect("unchanged intensity");
        assert_eq!(controller.frames_rendered(), 2);

        controller.press_compare().expect("press");
        assert!(controller.derived_parameters().is_passthrough());
        controller.release_compare().expect("release");
        assert_eq!(controller.frames_rendered(), 4);
        assert!(!controller.derived_parameters().is_passthrough());
        assert_eq!(controller.parameters().intensity, 70);
    }

    #[test]
    fn parameters_set_while_loading_apply_to_first_frame() {
        let mut controller = RenderController::new(CpuCompositor::new(), PipelineConfig::default());
        let token = controller
            .load_image(RgbaImage::new(16, 16))
            .expect("load");
        controller.set_intensity(0).expect("stored");
        assert_eq!(controller.frames_rendered(), 0);
        controller
            .apply_detection(token, Ok(vec![face()]))
            .expect("applies");
        assert_eq!(controller.frames_rendered(), 1);
        assert!(controller.derived_parameters().is_passthrough());
    }

    #[test]
    fn output_size_override_rerenders() {
        let mut controller = ready_controller();
        controller
            .set_output_size(Some(OutputSize::new(24, 12)))
            .expect("resize");
        assert_eq!(controller.frame().map(|f| f.dimensions()), Some((24, 12)));
        assert_eq!(controller.frames_rendered(), 2);
    }

    #[test]
    fn invalid_output_size_is_rejected_without_failing_session() {
        let mut controller = ready_controller();
        let err = controller
            .set_output_size(Some(OutputSize::new(0, 0)))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidOutput { width: 0, height: 0, .. }));
        assert!(err.is_recoverable());
        assert!(controller.state().is_ready());
        assert_eq!(controller.frames_rendered(), 1);
        assert_eq!(controller.frame().map(|f| f.dimensions()), Some((48, 48)));

        controller.set_intensity(80).expect("still renders");
        controller
            .load_image(RgbaImage::new(64, 64))
            .expect("session still accepts images");
    }

    #[test]
    fn output_size_above_backend_limit_is_rejected() {
        let mut controller = RenderController::new(
            LimitedBackend(CpuCompositor::new()),
            PipelineConfig::default(),
        );
        let token = controller
            .load_image(RgbaImage::from_pixel(48, 48, Rgba([180, 140, 120, 255])))
            .expect("load");
        controller
            .apply_detection(token, Ok(vec![face()]))
            .expect("applies");
        assert!(matches!(
            controller.set_output_size(Some(OutputSize::new(33, 8))),
            Err(PipelineError::InvalidOutput { .. })
        ));
        controller
            .set_output_size(Some(OutputSize::new(32, 8)))
            .expect("within limit");
        assert!(controller.state().is_ready());
    }

    /// CPU backend that reports a 32px texture limit.
    struct LimitedBackend(CpuCompositor);

    impl CompositorBackend for LimitedBackend {
        fn name(&self) -> &'static str {
            "limited"
        }

        fn prepare(&mut self, kernel: KernelSettings) -> Result<(), PipelineError> {
            self.0.prepare(kernel)
        }

        fn upload(&mut self, image: &SourceImage, mask: &SkinMask) -> Result<(), PipelineError> {
            self.0.upload(image, mask)
        }

        fn render(
            &mut self,
            params: DerivedFilterParameters,
            output: OutputSize,
        ) -> Result<RgbaImage, PipelineError> {
            self.0.render(params, output)
        }

        fn release(&mut self) {
            self.0.release()
        }

        fn max_output_dimension(&self) -> Option<u32> {
            Some(32)
        }
    }

    #[test]
    fn detection_timeout_is_distinct_and_keeps_loading() {
        let mut controller = RenderController::new(CpuCompositor::new(), PipelineConfig::default());
        let token = controller.load_image(RgbaImage::new(8, 8)).expect("load");
        let err = controller
            .wait_for_detection(Duration::from_millis(10))
            .unwrap_err();
        assert_eq!(err, PipelineError::DetectionTimeout { waited_ms: 10 });
        assert!(err.is_recoverable());
        assert_eq!(controller.state(), &PipelineState::Loading { token });

        let err = RenderController::new(CpuCompositor::new(), PipelineConfig::default())
            .wait_for_detection(Duration::from_millis(10))
            .unwrap_err();
        assert_eq!(err, PipelineError::NotReady { state: "uninitialized" });
    }

    #[test]
    fn export_requires_ready_state() {
        let mut controller = RenderController::new(CpuCompositor::new(), PipelineConfig::default());
        assert!(matches!(
            controller.export_pair(ExportFormat::Png),
            Err(PipelineError::NotReady { state: "uninitialized" })
        ));
        controller.load_image(RgbaImage::new(8, 8)).expect("load");
        assert!(matches!(
            controller.export_pair(ExportFormat::Png),
            Err(PipelineError::NotReady { state: "loading" })
        ));

        let controller = ready_controller();
        let pair = controller.export_pair(ExportFormat::Png).expect("export");
        assert_eq!(pair.original.mime, "image/png");
        assert!(!pair.retouched.bytes.is_empty());
        assert!(controller.state().is_ready());
    }

    #[test]
    fn detector_error_is_recoverable() {
        let mut controller = RenderController::new(CpuCompositor::new(), PipelineConfig::default());
        let token = controller.load_image(RgbaImage::new(8, 8)).expect("load");
        let err = controller
            .apply_detection(token, Err(anyhow::anyhow!("model missing")))
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(controller.state(), PipelineState::Failed(_)));
        assert!(controller.set_intensity(10).is_err());
    }
}
