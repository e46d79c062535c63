//! Host application shell: which flow is showing and who is signed in.

use crate::{
    api::AuthResponse,
    flow::{FlowController, FlowHost, FlowKind, FlowOptions},
};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    Login,
    Enroll,
    Emergency,
    ReEnroll,
}

impl AuthMode {
    #[must_use]
    pub const fn flow_kind(self) -> FlowKind {
        match self {
            Self::Login => FlowKind::Login,
            Self::Enroll => FlowKind::Enrollment,
            Self::Emergency => FlowKind::Emergency,
            Self::ReEnroll => FlowKind::ReEnrollment,
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login => write!(f, "LOGIN"),
            Self::Enroll => write!(f, "ENROLL"),
            Self::Emergency => write!(f, "EMERGENCY"),
            Self::ReEnroll => write!(f, "RE_ENROLL"),
        }
    }
}

#[derive(Debug, Default)]
pub struct AppShell {
    mode: AuthMode,
    options: FlowOptions,
    authenticated: Option<AuthResponse>,
    last_error: Option<String>,
}

impl AppShell {
    #[must_use]
    pub fn new(options: FlowOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn select_mode(&mut self, mode: AuthMode) {
        self.mode = mode;
        self.last_error = None;
    }

    /// Lateral move offered by the login flow.
    pub fn request_emergency(&mut self) {
        self.select_mode(AuthMode::Emergency);
    }

    /// The emergency flow's way out.
    pub fn back_to_login(&mut self) {
        self.select_mode(AuthMode::Login);
    }

    /// Fresh controller for the current mode.
    #[must_use]
    pub fn controller(&self) -> FlowController {
        FlowController::new(self.mode.flow_kind(), self.options)
    }

    #[must_use]
    pub const fn authenticated(&self) -> Option<&AuthResponse> {
        self.authenticated.as_ref()
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated.is_some()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Drop the session and return to login.
    pub fn logout(&mut self) -> Option<AuthResponse> {
        let previous = self.authenticated.take();
        self.select_mode(AuthMode::Login);
        previous
    }
}

impl FlowHost for AppShell {
    fn on_success(&mut self, kind: FlowKind, response: AuthResponse) {
        info!(
            flow = %kind,
            employee_id = response
                .employee_info
                .as_ref()
                .map_or("", |info| info.employee_id.as_str()),
            "authenticated"
        );
        self.last_error = None;
        self.authenticated = Some(response);
    }

    fn on_error(&mut self, kind: FlowKind, message: &str) {
        warn!(flow = %kind, "{}", message);
        self.last_error = Some(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Step;

    fn response() -> AuthResponse {
        serde_json::from_value(serde_json::json!({
            "success": true,
            "token": "tok",
            "employeeInfo": {"employeeId": "E1", "name": "N"}
        }))
        .unwrap()
    }

    #[test]
    fn test_starts_on_login() {
        let shell = AppShell::new(FlowOptions::default());
        assert_eq!(shell.mode(), AuthMode::Login);
        assert_eq!(shell.controller().kind(), FlowKind::Login);
        assert_eq!(shell.controller().step(), Step::Liveness);
        assert!(!shell.is_authenticated());
    }

    #[test]
    fn test_emergency_and_back() {
        let mut shell = AppShell::default();
        shell.on_error(FlowKind::Login, "ログインに失敗しました");
        assert_eq!(shell.last_error(), Some("ログインに失敗しました"));

        shell.request_emergency();
        assert_eq!(shell.mode(), AuthMode::Emergency);
        assert_eq!(shell.controller().step(), Step::IdCardCapture);
        assert_eq!(shell.last_error(), None);

        shell.back_to_login();
        assert_eq!(shell.mode(), AuthMode::Login);
    }

    #[test]
    fn test_success_then_logout() {
        let mut shell = AppShell::default();
        shell.select_mode(AuthMode::Enroll);
        shell.on_success(FlowKind::Enrollment, response());

        assert!(shell.is_authenticated());
        assert_eq!(shell.authenticated().unwrap().token.as_deref(), Some("tok"));

        let previous = shell.logout().unwrap();
        assert_eq!(previous.token.as_deref(), Some("tok"));
        assert!(!shell.is_authenticated());
        assert_eq!(shell.mode(), AuthMode::Login);
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(AuthMode::ReEnroll.to_string(), "RE_ENROLL");
        assert_eq!(AuthMode::ReEnroll.flow_kind(), FlowKind::ReEnrollment);
    }
}
