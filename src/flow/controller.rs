use super::{
    FlowError, FlowKind, FlowOptions, Step, EMERGENCY_OFFER_THRESHOLD, LIVENESS_ERROR_PREFIX,
};
use crate::{
    api::{
        AuthRequest, AuthResponse, EmergencyRequest, EnrollRequest, LoginRequest, ReEnrollRequest,
    },
    camera::{CameraError, CaptureImage, CapturePurpose},
    liveness::{LivenessError, LivenessSession},
};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// One mirrored item in debug mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DebugEntry {
    Capture { purpose: String, base64: String },
    LivenessSession { session_id: String },
    Response { body: Value },
}

/// Read-only mirror of what the flow captured and received.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DebugPanel {
    pub entries: Vec<DebugEntry>,
}

/// What a finished submission means for the host.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Success(AuthResponse),
    /// `message` goes to the host; `display` adds backend details for the UI.
    Failure { message: String, display: String },
}

#[derive(Debug)]
pub struct FlowController {
    kind: FlowKind,
    options: FlowOptions,
    steps: Vec<Step>,
    step: Step,
    id_card: Option<CaptureImage>,
    password: Option<SecretString>,
    liveness: Option<LivenessSession>,
    face: Option<CaptureImage>,
    in_flight: bool,
    failed_attempts: u32,
    error: Option<String>,
    debug_panel: Option<DebugPanel>,
}

impl FlowController {
    #[must_use]
    pub fn new(kind: FlowKind, options: FlowOptions) -> Self {
        let steps = kind.steps(options.include_liveness);
        let step = steps.first().copied().unwrap_or(Step::Submitting);

        Self {
            kind,
            options,
            steps,
            step,
            id_card: None,
            password: None,
            liveness: None,
            face: None,
            in_flight: false,
            failed_attempts: 0,
            error: None,
            debug_panel: options.debug.then(DebugPanel::default),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> FlowKind {
        self.kind
    }

    #[must_use]
    pub const fn options(&self) -> FlowOptions {
        self.options
    }

    #[must_use]
    pub const fn step(&self) -> Step {
        self.step
    }

    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Message currently shown to the user, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub const fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    #[must_use]
    pub const fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Login only: offer (never force) the emergency flow.
    #[must_use]
    pub fn emergency_offer_visible(&self) -> bool {
        self.kind == FlowKind::Login && self.failed_attempts >= EMERGENCY_OFFER_THRESHOLD
    }

    #[must_use]
    pub const fn debug_panel(&self) -> Option<&DebugPanel> {
        self.debug_panel.as_ref()
    }

    #[must_use]
    pub const fn has_artifacts(&self) -> bool {
        self.id_card.is_some()
            || self.password.is_some()
            || self.liveness.is_some()
            || self.face.is_some()
    }

    fn first_step(&self) -> Step {
        self.steps.first().copied().unwrap_or(Step::Submitting)
    }

    fn expect_step(&self, step: Step, event: &'static str) -> Result<(), FlowError> {
        if self.step == step {
            Ok(())
        } else {
            Err(FlowError::UnexpectedEvent {
                step: self.step,
                event,
            })
        }
    }

    fn advance(&mut self) {
        let next = self
            .steps
            .iter()
            .position(|step| *step == self.step)
            .and_then(|index| self.steps.get(index + 1))
            .copied()
            .unwrap_or(Step::Submitting);

        debug!(flow = %self.kind, from = %self.step, to = %next, "step");
        self.step = next;
        self.error = None;
    }

    fn clear_artifacts(&mut self) {
        self.id_card = None;
        self.password = None;
        self.liveness = None;
        self.face = None;
    }

    fn mirror(&mut self, entry: DebugEntry) {
        if let Some(panel) = self.debug_panel.as_mut() {
            panel.entries.push(entry);
        }
    }

    fn count_failure(&mut self) {
        if self.kind == FlowKind::Login {
            self.failed_attempts += 1;
        }
    }

    /// # Errors
    /// Rejects images for the wrong purpose or arriving outside a capture step
    pub fn on_capture(&mut self, image: CaptureImage) -> Result<(), FlowError> {
        match image.purpose {
            CapturePurpose::IdCard => self.expect_step(Step::IdCardCapture, "id card capture")?,
            CapturePurpose::Face => self.expect_step(Step::FaceCapture, "face capture")?,
        }

        if self.options.debug {
            self.mirror(DebugEntry::Capture {
                purpose: image.purpose.to_string(),
                base64: image.to_base64(),
            });
        }

        match image.purpose {
            CapturePurpose::IdCard => self.id_card = Some(image),
            CapturePurpose::Face => self.face = Some(image),
        }
        self.advance();
        Ok(())
    }

    /// Camera failures keep the flow on the capture step.
    pub fn on_camera_error(&mut self, err: &CameraError) -> String {
        let message = err.to_string();
        warn!(flow = %self.kind, step = %self.step, "camera error: {:?}", err);
        self.error = Some(message.clone());
        message
    }

    /// # Errors
    /// [`FlowError::EmptyPassword`] keeps the flow on password entry
    pub fn on_password(&mut self, password: SecretString) -> Result<(), FlowError> {
        self.expect_step(Step::PasswordEntry, "password")?;

        if password.expose_secret().is_empty() {
            self.error = Some(FlowError::EmptyPassword.to_string());
            return Err(FlowError::EmptyPassword);
        }

        self.password = Some(password);
        self.advance();
        Ok(())
    }

    /// # Errors
    /// Rejects a session arriving outside the liveness step
    pub fn on_liveness_success(&mut self, session: LivenessSession) -> Result<(), FlowError> {
        self.expect_step(Step::Liveness, "liveness success")?;

        self.mirror(DebugEntry::LivenessSession {
            session_id: session.session_id.clone(),
        });
        self.liveness = Some(session);
        self.advance();
        Ok(())
    }

    /// Stay on the liveness step; the next attempt needs a new session.
    ///
    /// Returns the reason for the host, verbatim.
    ///
    /// # Errors
    /// Rejects a failure arriving outside the liveness step
    pub fn on_liveness_failure(&mut self, err: &LivenessError) -> Result<String, FlowError> {
        self.expect_step(Step::Liveness, "liveness failure")?;

        let reason = err.to_string();
        self.liveness = None;
        self.count_failure();
        self.error = Some(format!("{LIVENESS_ERROR_PREFIX}{reason}"));
        Ok(reason)
    }

    /// Where [`Self::back`] would go from the current step.
    #[must_use]
    pub fn back_target(&self) -> Option<Step> {
        match (self.kind, self.step) {
            (FlowKind::Login | FlowKind::Enrollment, Step::FaceCapture)
                if self.steps.contains(&Step::Liveness) =>
            {
                Some(Step::Liveness)
            }
            (FlowKind::Emergency, Step::Liveness) => Some(Step::PasswordEntry),
            _ => None,
        }
    }

    /// Step back to redo the previous input, dropping what it produced.
    ///
    /// # Errors
    /// Only face capture (to liveness) and liveness (to password entry) go back
    pub fn back(&mut self) -> Result<Step, FlowError> {
        let target = self
            .back_target()
            .ok_or(FlowError::NoBackTransition(self.step))?;
        match target {
            Step::Liveness => self.liveness = None,
            Step::PasswordEntry => self.password = None,
            _ => {}
        }

        debug!(flow = %self.kind, from = %self.step, to = %target, "back");
        self.step = target;
        self.error = None;
        Ok(target)
    }

    /// Back to the first step with every artifact cleared. The login failure
    /// count survives a reset.
    pub fn reset(&mut self) {
        self.clear_artifacts();
        self.step = self.first_step();
        self.in_flight = false;
        self.error = None;
    }

    /// Take the artifacts and build the single request for this attempt.
    ///
    /// The liveness session leaves the controller here and is never reused.
    ///
    /// # Errors
    /// Outside the submitting step, while another submission is in flight or
    /// when an artifact is missing
    pub fn begin_submit(&mut self) -> Result<AuthRequest, FlowError> {
        self.expect_step(Step::Submitting, "submit")?;
        if self.in_flight {
            return Err(FlowError::SubmitInFlight);
        }

        let encoded = |image: Option<&CaptureImage>, what: &'static str| {
            image
                .map(CaptureImage::to_base64)
                .ok_or(FlowError::Incomplete(what))
        };
        let liveness_session_id = self
            .liveness
            .as_ref()
            .map(|session| session.session_id.clone());

        let request = match self.kind {
            FlowKind::Login => AuthRequest::Login(LoginRequest {
                face_image: encoded(self.face.as_ref(), "face image")?,
                liveness_session_id,
            }),
            FlowKind::Enrollment => AuthRequest::Enroll(EnrollRequest {
                id_card_image: encoded(self.id_card.as_ref(), "id card image")?,
                face_image: encoded(self.face.as_ref(), "face image")?,
                liveness_session_id,
            }),
            FlowKind::Emergency => AuthRequest::Emergency(EmergencyRequest {
                id_card_image: encoded(self.id_card.as_ref(), "id card image")?,
                password: self
                    .password
                    .clone()
                    .ok_or(FlowError::Incomplete("password"))?,
                liveness_session_id,
            }),
            FlowKind::ReEnrollment => AuthRequest::ReEnroll(ReEnrollRequest {
                id_card_image: encoded(self.id_card.as_ref(), "id card image")?,
                face_image: encoded(self.face.as_ref(), "face image")?,
            }),
        };

        // artifacts leave the controller only once the request is whole
        self.clear_artifacts();
        self.in_flight = true;
        self.error = None;
        info!(
            flow = %self.kind,
            path = request.path(),
            liveness_session = request.liveness_session_id().unwrap_or("-"),
            "submitting"
        );
        Ok(request)
    }

    /// Commit the backend's answer to the in-flight submission.
    ///
    /// Success moves to [`Step::Complete`]; any failure returns to the first
    /// step with artifacts cleared.
    ///
    /// # Errors
    /// [`FlowError::NoSubmission`] when nothing is in flight (for example after a reset)
    pub fn on_response(&mut self, response: AuthResponse) -> Result<SubmitOutcome, FlowError> {
        if !self.in_flight {
            return Err(FlowError::NoSubmission);
        }
        self.in_flight = false;

        if self.options.debug {
            let body = serde_json::to_value(&response).unwrap_or(Value::Null);
            self.mirror(DebugEntry::Response { body });
        }

        if response.success {
            info!(flow = %self.kind, "authentication succeeded");
            self.failed_attempts = 0;
            self.clear_artifacts();
            self.step = Step::Complete;
            self.error = None;
            return Ok(SubmitOutcome::Success(response));
        }

        let (message, display) = if response.is_network_error() {
            let message = self.kind.transport_message().to_string();
            (message.clone(), message)
        } else {
            let message = response
                .error_message()
                .unwrap_or_else(|| self.kind.failure_message())
                .to_string();
            let details = response
                .error
                .as_ref()
                .and_then(|error| error.extra.get("details"))
                .map(|details| format!("\n詳細: {details}"))
                .unwrap_or_default();
            (message.clone(), format!("{message}{details}"))
        };

        warn!(
            flow = %self.kind,
            code = response.error.as_ref().map_or("", |e| e.code.as_str()),
            reason = response.error.as_ref().and_then(|e| e.system_reason.as_deref()).unwrap_or(""),
            "authentication failed"
        );

        self.count_failure();
        self.reset();
        self.error = Some(display.clone());

        Ok(SubmitOutcome::Failure { message, display })
    }
}
