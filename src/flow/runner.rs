use super::{FlowController, FlowError, FlowHost, Step, SubmitOutcome};
use crate::{
    api::{ApiClient, AuthRequest, AuthResponse},
    camera::{capture, CameraError, CameraSource, CapturePurpose, CaptureTrigger},
    liveness::{LivenessBackend, LivenessError, LivenessStep, LivenessWidget},
};
use secrecy::SecretString;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Where submissions go. Implemented by [`ApiClient`].
pub trait AuthBackend: Send + Sync {
    fn submit(&self, request: &AuthRequest) -> impl Future<Output = AuthResponse> + Send;
}

impl AuthBackend for ApiClient {
    async fn submit(&self, request: &AuthRequest) -> AuthResponse {
        ApiClient::submit(self, request).await
    }
}

/// Supplies the emergency password. `None` aborts the flow.
pub trait PasswordPrompt: Send + Sync {
    fn password(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Option<SecretString>> + Send;
}

/// Builds the trigger for each capture.
pub type TriggerFactory = Box<dyn Fn(CapturePurpose) -> CaptureTrigger + Send + Sync>;

/// How one attempt ended. Nothing is retried automatically; running again
/// resumes from wherever the controller now stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// The response was handed to the host.
    Completed,
    Failed { step: Step, message: String },
}

pub struct FlowRunner<C, L, W, P, A> {
    camera: C,
    liveness: L,
    widget: W,
    password: P,
    api: A,
    trigger: TriggerFactory,
}

impl<C, L, W, P, A> FlowRunner<C, L, W, P, A>
where
    C: CameraSource,
    L: LivenessBackend,
    W: LivenessWidget,
    P: PasswordPrompt,
    A: AuthBackend,
{
    /// Captures use the countdown trigger unless [`Self::with_trigger`] says otherwise.
    pub fn new(camera: C, liveness: L, widget: W, password: P, api: A) -> Self {
        Self {
            camera,
            liveness,
            widget,
            password,
            api,
            trigger: Box::new(|_| CaptureTrigger::countdown()),
        }
    }

    #[must_use]
    pub fn with_trigger(mut self, trigger: TriggerFactory) -> Self {
        self.trigger = trigger;
        self
    }

    fn failed<H: FlowHost>(
        flow: &FlowController,
        host: &mut H,
        step: Step,
        message: String,
    ) -> FlowOutcome {
        host.on_error(flow.kind(), &message);
        FlowOutcome::Failed { step, message }
    }

    /// Drive `flow` until it completes or one step fails.
    ///
    /// Results arriving after `cancel` fires are dropped without touching the
    /// controller.
    ///
    /// # Errors
    /// [`FlowError::Cancelled`] on cancellation; other variants indicate the
    /// controller was in a state the runner cannot drive (such as already complete)
    #[instrument(skip_all, fields(flow = %flow.kind()))]
    pub async fn run<H: FlowHost>(
        &self,
        flow: &mut FlowController,
        host: &mut H,
        cancel: &CancellationToken,
    ) -> Result<FlowOutcome, FlowError> {
        loop {
            if cancel.is_cancelled() {
                return Err(FlowError::Cancelled);
            }

            let step = flow.step();
            debug!(%step, "running step");

            match step {
                Step::IdCardCapture | Step::FaceCapture => {
                    let purpose = if step == Step::IdCardCapture {
                        CapturePurpose::IdCard
                    } else {
                        CapturePurpose::Face
                    };

                    match capture(&self.camera, purpose, (self.trigger)(purpose), cancel).await {
                        _ if cancel.is_cancelled() => return Err(FlowError::Cancelled),
                        Err(CameraError::Cancelled) => return Err(FlowError::Cancelled),
                        Ok(image) => flow.on_capture(image)?,
                        Err(err) => {
                            let message = flow.on_camera_error(&err);
                            return Ok(Self::failed(flow, host, step, message));
                        }
                    }
                }
                Step::PasswordEntry => {
                    let Some(password) = self.password.password(cancel).await else {
                        return Err(FlowError::Cancelled);
                    };
                    if cancel.is_cancelled() {
                        return Err(FlowError::Cancelled);
                    }

                    match flow.on_password(password) {
                        Ok(()) => {}
                        Err(FlowError::EmptyPassword) => {
                            let message = FlowError::EmptyPassword.to_string();
                            return Ok(Self::failed(flow, host, step, message));
                        }
                        Err(err) => return Err(err),
                    }
                }
                Step::Liveness => {
                    let Some(subject) = flow.kind().liveness_subject() else {
                        return Err(FlowError::UnexpectedEvent {
                            step,
                            event: "liveness",
                        });
                    };

                    let verdict = LivenessStep::new(subject)
                        .run(&self.liveness, &self.widget, cancel)
                        .await;
                    if cancel.is_cancelled() {
                        return Err(FlowError::Cancelled);
                    }

                    match verdict {
                        Ok(session) => flow.on_liveness_success(session)?,
                        Err(LivenessError::Cancelled) => return Err(FlowError::Cancelled),
                        Err(err) => {
                            let reason = flow.on_liveness_failure(&err)?;
                            return Ok(Self::failed(flow, host, step, reason));
                        }
                    }
                }
                Step::Submitting => {
                    let request = flow.begin_submit()?;
                    // in-flight calls are not aborted, only their result is dropped
                    let response = self.api.submit(&request).await;
                    if cancel.is_cancelled() {
                        return Err(FlowError::Cancelled);
                    }

                    return match flow.on_response(response)? {
                        SubmitOutcome::Success(response) => {
                            host.on_success(flow.kind(), response);
                            Ok(FlowOutcome::Completed)
                        }
                        SubmitOutcome::Failure { message, .. } => {
                            Ok(Self::failed(flow, host, step, message))
                        }
                    };
                }
                Step::Complete => {
                    return Err(FlowError::UnexpectedEvent {
                        step,
                        event: "run",
                    })
                }
            }
        }
    }
}
