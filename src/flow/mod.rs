//! Authentication flows.
//!
//! A [`FlowController`] is a synchronous state machine fed one event per step;
//! a [`FlowRunner`] drives it against real (or fake) camera, liveness and API
//! implementations and reports to a [`FlowHost`].

pub mod controller;
pub mod runner;

pub use controller::{DebugEntry, DebugPanel, FlowController, SubmitOutcome};
pub use runner::{AuthBackend, FlowOutcome, FlowRunner, PasswordPrompt, TriggerFactory};

use crate::{api::AuthResponse, liveness::LivenessSubject};
use std::fmt;
use thiserror::Error;

pub const EMPTY_PASSWORD_MESSAGE: &str = "パスワードを入力してください";
pub const LIVENESS_ERROR_PREFIX: &str = "ライブネス検証エラー: ";

/// Consecutive login failures after which the emergency path is offered.
pub const EMERGENCY_OFFER_THRESHOLD: u32 = 2;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("{event} is not accepted on step {step}")]
    UnexpectedEvent { step: Step, event: &'static str },

    #[error("パスワードを入力してください")]
    EmptyPassword,

    #[error("a submission is already in flight")]
    SubmitInFlight,

    #[error("no submission is in flight")]
    NoSubmission,

    #[error("no back transition from step {0}")]
    NoBackTransition(Step),

    #[error("missing {0} at submission")]
    Incomplete(&'static str),

    #[error("flow cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    Login,
    Enrollment,
    Emergency,
    ReEnrollment,
}

impl FlowKind {
    /// Subject the liveness session is created for; re-enrollment has none.
    #[must_use]
    pub const fn liveness_subject(self) -> Option<LivenessSubject> {
        match self {
            Self::Login => Some(LivenessSubject::Login),
            Self::Enrollment => Some(LivenessSubject::Enrollment),
            Self::Emergency => Some(LivenessSubject::Emergency),
            Self::ReEnrollment => None,
        }
    }

    /// Shown when the backend rejects a submission without a message.
    #[must_use]
    pub const fn failure_message(self) -> &'static str {
        match self {
            Self::Login => "ログインに失敗しました",
            Self::Enrollment => "登録に失敗しました",
            Self::Emergency => "認証に失敗しました",
            Self::ReEnrollment => "再登録に失敗しました",
        }
    }

    /// Shown when a submission never reached the backend.
    #[must_use]
    pub const fn transport_message(self) -> &'static str {
        match self {
            Self::Login => "ログイン処理中にエラーが発生しました",
            Self::Enrollment => "登録処理中にエラーが発生しました",
            Self::Emergency => "認証処理中にエラーが発生しました",
            Self::ReEnrollment => "再登録処理中にエラーが発生しました",
        }
    }

    /// Input steps in order, before submission.
    #[must_use]
    pub fn steps(self, include_liveness: bool) -> Vec<Step> {
        let steps: &[Step] = match self {
            Self::Login => &[Step::Liveness, Step::FaceCapture],
            Self::Enrollment => &[Step::IdCardCapture, Step::Liveness, Step::FaceCapture],
            Self::Emergency => &[Step::IdCardCapture, Step::PasswordEntry, Step::Liveness],
            Self::ReEnrollment => &[Step::IdCardCapture, Step::FaceCapture],
        };

        steps
            .iter()
            .copied()
            .filter(|step| include_liveness || *step != Step::Liveness)
            .collect()
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login => write!(f, "login"),
            Self::Enrollment => write!(f, "enrollment"),
            Self::Emergency => write!(f, "emergency"),
            Self::ReEnrollment => write!(f, "re-enrollment"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    IdCardCapture,
    PasswordEntry,
    Liveness,
    FaceCapture,
    Submitting,
    Complete,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IdCardCapture => "idcard-capture",
            Self::PasswordEntry => "password-entry",
            Self::Liveness => "liveness",
            Self::FaceCapture => "face-capture",
            Self::Submitting => "submitting",
            Self::Complete => "complete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowOptions {
    pub include_liveness: bool,
    /// Mirror artifacts and raw responses into the debug panel.
    pub debug: bool,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            include_liveness: true,
            debug: false,
        }
    }
}

impl FlowOptions {
    /// Read `debug=true` from a URL query string; other keys are ignored.
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let debug = url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
            .any(|(key, value)| key == "debug" && value == "true");

        Self {
            debug,
            ..Self::default()
        }
    }
}

/// Receives the outcome of every flow event that matters to the shell.
pub trait FlowHost {
    /// The response is handed over; the flow keeps no copy.
    fn on_success(&mut self, kind: FlowKind, response: AuthResponse);

    fn on_error(&mut self, kind: FlowKind, message: &str);
}
