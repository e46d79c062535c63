//! Liveness step: one backend session, one widget run, one verdict.
//!
//! ```text
//! requesting-session -> ready -> verifying -> succeeded
//!          \               \          \
//!           +---------------+----------+--> failed
//! ```
//!
//! [`LivenessStep::run`] consumes the step, so a session is requested exactly
//! once per step. Retrying means building a new step.

pub mod client;
pub mod terminal;

pub use client::LivenessClient;
pub use terminal::TerminalWidget;

use serde::{Deserialize, Serialize};
use std::{fmt, future::Future};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const NOT_LIVE_MESSAGE: &str = "ライブネス検証に失敗しました。もう一度お試しください。";
pub const MISSING_SESSION_MESSAGE: &str = "セッションデータがありません";
pub const WIDGET_ERROR_MESSAGE: &str = "ライブネス検証中にエラーが発生しました";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LivenessError {
    /// Session creation failed; carries the backend or transport reason.
    #[error("{0}")]
    Session(String),

    #[error("セッションデータがありません")]
    MissingSession,

    #[error("ライブネス検証に失敗しました。もう一度お試しください。")]
    NotLive,

    /// Result polling failed; carries the backend or transport reason.
    #[error("{0}")]
    Result(String),

    #[error("{0}")]
    Widget(String),

    #[error("invalid liveness subject '{0}': expected 1-50 alphanumeric characters")]
    InvalidSubject(String),

    #[error("liveness check cancelled")]
    Cancelled,
}

/// Failure reported by the widget. The message wins over the state name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidgetError {
    pub message: Option<String>,
    pub state: Option<String>,
}

impl WidgetError {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            state: None,
        }
    }

    pub fn state(state: impl Into<String>) -> Self {
        Self {
            message: None,
            state: Some(state.into()),
        }
    }
}

impl From<WidgetError> for LivenessError {
    fn from(err: WidgetError) -> Self {
        let reason = err
            .message
            .filter(|m| !m.is_empty())
            .or(err.state.filter(|s| !s.is_empty()))
            .unwrap_or_else(|| WIDGET_ERROR_MESSAGE.to_string());
        Self::Widget(reason)
    }
}

/// Who the session is created for. Flows use fixed subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessSubject {
    Login,
    Enrollment,
    Emergency,
}

impl LivenessSubject {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::Enrollment => "ENROLLMENT",
            Self::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for LivenessSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session handle issued by the backend. Expiry is informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessSession {
    pub session_id: String,
    #[serde(default)]
    pub expires_at: String,
}

pub trait LivenessBackend: Send + Sync {
    fn create_session(
        &self,
        subject: &str,
    ) -> impl Future<Output = Result<LivenessSession, LivenessError>> + Send;

    /// `Ok(true)` when the session passed the check.
    fn fetch_result(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<bool, LivenessError>> + Send;
}

/// The external capture/analysis component, bound to one session.
pub trait LivenessWidget: Send + Sync {
    /// Resolves when the widget signals analysis complete.
    fn run(
        &self,
        session: &LivenessSession,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), WidgetError>> + Send;
}

impl<T: LivenessWidget> LivenessWidget for &T {
    async fn run(
        &self,
        session: &LivenessSession,
        cancel: &CancellationToken,
    ) -> Result<(), WidgetError> {
        T::run(self, session, cancel).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessPhase {
    RequestingSession,
    Ready,
    Verifying,
    Succeeded,
    Failed,
}

#[derive(Debug)]
pub struct LivenessStep {
    subject: LivenessSubject,
    phase: watch::Sender<LivenessPhase>,
}

impl LivenessStep {
    #[must_use]
    pub fn new(subject: LivenessSubject) -> Self {
        let (phase, _) = watch::channel(LivenessPhase::RequestingSession);
        Self { subject, phase }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LivenessPhase> {
        self.phase.subscribe()
    }

    #[must_use]
    pub fn phase(&self) -> LivenessPhase {
        *self.phase.borrow()
    }

    fn fail(&self, err: LivenessError) -> LivenessError {
        warn!(subject = %self.subject, phase = ?self.phase(), "liveness failed: {}", err);
        self.phase.send_replace(LivenessPhase::Failed);
        err
    }

    /// Drive the step to a verdict.
    ///
    /// # Errors
    /// Any session, widget or verdict failure. The caller builds a new step to retry.
    pub async fn run<B, W>(
        self,
        backend: &B,
        widget: &W,
        cancel: &CancellationToken,
    ) -> Result<LivenessSession, LivenessError>
    where
        B: LivenessBackend,
        W: LivenessWidget,
    {
        self.phase.send_replace(LivenessPhase::RequestingSession);

        let created = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(self.fail(LivenessError::Cancelled)),
            created = backend.create_session(self.subject.as_str()) => created,
        };
        let session = match created {
            Ok(session) if session.session_id.is_empty() => {
                return Err(self.fail(LivenessError::MissingSession))
            }
            Ok(session) => session,
            Err(err) => return Err(self.fail(err)),
        };

        debug!(session_id = %session.session_id, expires_at = %session.expires_at, "liveness session ready");
        self.phase.send_replace(LivenessPhase::Ready);

        let completed = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(self.fail(LivenessError::Cancelled)),
            completed = widget.run(&session, cancel) => completed,
        };
        if let Err(err) = completed {
            return Err(self.fail(err.into()));
        }

        self.phase.send_replace(LivenessPhase::Verifying);

        let verdict = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(self.fail(LivenessError::Cancelled)),
            verdict = backend.fetch_result(&session.session_id) => verdict,
        };

        match verdict {
            Ok(true) => {
                info!(session_id = %session.session_id, "liveness passed");
                self.phase.send_replace(LivenessPhase::Succeeded);
                Ok(session)
            }
            Ok(false) => Err(self.fail(LivenessError::NotLive)),
            Err(err) => Err(self.fail(err)),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    /// Scripted backend recording every call.
    #[derive(Debug, Clone)]
    pub struct FakeBackend {
        pub sessions: Arc<AtomicUsize>,
        pub subjects: Arc<Mutex<Vec<String>>>,
        pub create: Result<(), LivenessError>,
        pub verdict: Result<bool, LivenessError>,
    }

    impl Default for FakeBackend {
        fn default() -> Self {
            Self {
                sessions: Arc::default(),
                subjects: Arc::default(),
                create: Ok(()),
                verdict: Ok(true),
            }
        }
    }

    impl FakeBackend {
        pub fn verdict(verdict: Result<bool, LivenessError>) -> Self {
            Self {
                verdict,
                ..Self::default()
            }
        }

        pub fn sessions(&self) -> usize {
            self.sessions.load(Ordering::SeqCst)
        }
    }

    impl LivenessBackend for FakeBackend {
        async fn create_session(&self, subject: &str) -> Result<LivenessSession, LivenessError> {
            self.create.clone()?;
            self.subjects.lock().unwrap().push(subject.to_string());
            let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(LivenessSession {
                session_id: format!("session-{n}"),
                expires_at: "2026-01-01T00:00:00Z".to_string(),
            })
        }

        async fn fetch_result(&self, _session_id: &str) -> Result<bool, LivenessError> {
            self.verdict.clone()
        }
    }

    #[derive(Debug, Clone, Default)]
    pub struct FakeWidget {
        pub error: Option<WidgetError>,
    }

    impl LivenessWidget for FakeWidget {
        async fn run(
            &self,
            _session: &LivenessSession,
            _cancel: &CancellationToken,
        ) -> Result<(), WidgetError> {
            self.error.clone().map_or(Ok(()), Err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeBackend, FakeWidget};
    use super::*;

    #[tokio::test]
    async fn live_verdict_returns_session() {
        let backend = FakeBackend::default();
        let step = LivenessStep::new(LivenessSubject::Login);
        let phases = step.subscribe();

        let session = step
            .run(&backend, &FakeWidget::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(session.session_id, "session-1");
        assert_eq!(*phases.borrow(), LivenessPhase::Succeeded);
        assert_eq!(backend.sessions(), 1);
        assert_eq!(*backend.subjects.lock().unwrap(), vec!["LOGIN".to_string()]);
    }

    #[tokio::test]
    async fn negative_verdict_is_not_live() {
        let backend = FakeBackend::verdict(Ok(false));
        let step = LivenessStep::new(LivenessSubject::Enrollment);
        let phases = step.subscribe();

        let err = step
            .run(&backend, &FakeWidget::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, LivenessError::NotLive);
        assert_eq!(err.to_string(), NOT_LIVE_MESSAGE);
        assert_eq!(*phases.borrow(), LivenessPhase::Failed);
    }

    #[tokio::test]
    async fn polling_error_is_surfaced() {
        let backend = FakeBackend::verdict(Err(LivenessError::Result("HTTP 500".to_string())));
        let err = LivenessStep::new(LivenessSubject::Emergency)
            .run(&backend, &FakeWidget::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "HTTP 500");
    }

    #[tokio::test]
    async fn session_failure_is_not_retried() {
        let backend = FakeBackend {
            create: Err(LivenessError::Session("HTTP 503: Service Unavailable".to_string())),
            ..FakeBackend::default()
        };

        let err = LivenessStep::new(LivenessSubject::Login)
            .run(&backend, &FakeWidget::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "HTTP 503: Service Unavailable");
        assert_eq!(backend.sessions(), 0);
    }

    #[tokio::test]
    async fn widget_errors_surface_verbatim() {
        let backend = FakeBackend::default();

        let widget = FakeWidget {
            error: Some(WidgetError::message("Too many faces detected")),
        };
        let err = LivenessStep::new(LivenessSubject::Login)
            .run(&backend, &widget, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, LivenessError::Widget("Too many faces detected".to_string()));

        let widget = FakeWidget {
            error: Some(WidgetError::state("TIMEOUT")),
        };
        let err = LivenessStep::new(LivenessSubject::Login)
            .run(&backend, &widget, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "TIMEOUT");

        let widget = FakeWidget {
            error: Some(WidgetError::default()),
        };
        let err = LivenessStep::new(LivenessSubject::Login)
            .run(&backend, &widget, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), WIDGET_ERROR_MESSAGE);

        // every attempt was a fresh step with its own session
        assert_eq!(backend.sessions(), 3);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let backend = FakeBackend::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = LivenessStep::new(LivenessSubject::Login)
            .run(&backend, &FakeWidget::default(), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err, LivenessError::Cancelled);
    }

    #[test]
    fn test_new_step_requests_session() {
        let step = LivenessStep::new(LivenessSubject::Login);
        assert_eq!(step.phase(), LivenessPhase::RequestingSession);

        let err = step.fail(LivenessError::NotLive);
        assert_eq!(err, LivenessError::NotLive);
        assert_eq!(step.phase(), LivenessPhase::Failed);
    }

    #[test]
    fn test_subjects() {
        assert_eq!(LivenessSubject::Login.to_string(), "LOGIN");
        assert_eq!(LivenessSubject::Enrollment.as_str(), "ENROLLMENT");
        assert_eq!(LivenessSubject::Emergency.as_str(), "EMERGENCY");
    }
}
