//! Wire types shared with the backend authentication API.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Error code synthesized when the backend could not be reached.
pub const NETWORK_ERROR: &str = "NETWORK_ERROR";

/// Structured error carried inside an [`AuthResponse`].
///
/// The backend emits both `{code, ...}` and its own `{error, request_id, ...}`
/// spelling; both deserialize here, as does a gateway's bare `{message}`.
/// Unknown fields such as `details` are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthError {
    #[serde(default, skip_serializing_if = "String::is_empty", alias = "error")]
    pub code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "system_reason")]
    pub system_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "request_id")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthError {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            system_reason: None,
            timestamp: None,
            request_id: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_system_reason(mut self, reason: impl Into<String>) -> Self {
        self.system_reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeInfo {
    pub employee_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_type: Option<String>,
}

/// Terminal value of every flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_info: Option<EmployeeInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AuthError>,
}

impl AuthResponse {
    #[must_use]
    pub fn failure(error: AuthError) -> Self {
        Self {
            success: false,
            token: None,
            session_id: None,
            employee_info: None,
            error: Some(error),
        }
    }

    /// True when the response was synthesized for a transport failure.
    #[must_use]
    pub fn is_network_error(&self) -> bool {
        !self.success
            && self
                .error
                .as_ref()
                .is_some_and(|error| error.code == NETWORK_ERROR)
    }

    /// Backend-supplied failure message, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error
            .as_ref()
            .map(|error| error.message.as_str())
            .filter(|message| !message.is_empty())
    }
}

fn expose<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub face_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness_session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    pub id_card_image: String,
    pub face_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness_session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyRequest {
    pub id_card_image: String,
    #[serde(serialize_with = "expose")]
    pub password: SecretString,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness_session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReEnrollRequest {
    pub id_card_image: String,
    pub face_image: String,
}

/// One of the four submissions a flow can end with.
#[derive(Debug, Clone)]
pub enum AuthRequest {
    Login(LoginRequest),
    Enroll(EnrollRequest),
    Emergency(EmergencyRequest),
    ReEnroll(ReEnrollRequest),
}

impl AuthRequest {
    #[must_use]
    pub const fn path(&self) -> &'static str {
        match self {
            Self::Login(_) => super::LOGIN_PATH,
            Self::Enroll(_) => super::ENROLL_PATH,
            Self::Emergency(_) => super::EMERGENCY_PATH,
            Self::ReEnroll(_) => super::RE_ENROLL_PATH,
        }
    }

    #[must_use]
    pub fn liveness_session_id(&self) -> Option<&str> {
        match self {
            Self::Login(request) => request.liveness_session_id.as_deref(),
            Self::Enroll(request) => request.liveness_session_id.as_deref(),
            Self::Emergency(request) => request.liveness_session_id.as_deref(),
            Self::ReEnroll(_) => None,
        }
    }
}
