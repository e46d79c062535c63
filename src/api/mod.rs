//! Backend authentication API client.
//!
//! Every operation returns an [`AuthResponse`]; transport failures and non-2xx
//! replies are folded into that shape by [`normalize_error`], so callers only
//! ever branch on `success`.

pub mod types;

pub use types::{
    AuthError, AuthRequest, AuthResponse, EmergencyRequest, EmployeeInfo, EnrollRequest,
    LoginRequest, ReEnrollRequest, NETWORK_ERROR,
};

use crate::{cli::globals::Config, APP_USER_AGENT};
use anyhow::{Context, Result};
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client, StatusCode,
};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use ulid::Ulid;

pub const ENROLL_PATH: &str = "/auth/enroll";
pub const LOGIN_PATH: &str = "/auth/login";
pub const EMERGENCY_PATH: &str = "/auth/emergency";
pub const RE_ENROLL_PATH: &str = "/auth/re-enroll";
pub const STATUS_PATH: &str = "/auth/status";

/// Fixed timeout applied to every backend call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shown to the user for any transport failure; the raw cause goes to `systemReason`.
pub const NETWORK_ERROR_MESSAGE: &str = "明るい場所で再度お試しください";

/// What came back from the transport layer before normalization.
#[derive(Debug)]
pub enum TransportFailure {
    /// The backend answered with a non-2xx status.
    Status { status: StatusCode, body: String },
    /// No usable response (connect error, timeout, unreadable body).
    Transport(String),
}

/// Fold a failed call into an [`AuthResponse`].
///
/// Any JSON object the backend (or its gateway) answered with is structured:
/// a full `AuthResponse` passes through and anything else becomes its `error`.
/// Non-JSON bodies and transport failures become a `NETWORK_ERROR` response.
#[must_use]
pub fn normalize_error(failure: TransportFailure) -> AuthResponse {
    let reason = match failure {
        TransportFailure::Status { status, body } => {
            if let Ok(body @ Value::Object(_)) = serde_json::from_str::<Value>(&body) {
                if let Ok(response) = serde_json::from_value::<AuthResponse>(body.clone()) {
                    return response;
                }
                if let Ok(error) = serde_json::from_value::<AuthError>(body) {
                    return AuthResponse::failure(error);
                }
            }
            format!("HTTP {status}")
        }
        TransportFailure::Transport(message) => message,
    };

    AuthResponse::failure(
        AuthError::new(NETWORK_ERROR, NETWORK_ERROR_MESSAGE).with_system_reason(reason),
    )
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// # Errors
    /// Returns an error if the API key is not a valid header value or the HTTP client cannot be built
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(api_key) = &config.api_key {
            let mut value = HeaderValue::from_str(api_key.expose_secret())
                .context("API key is not a valid header value")?;
            value.set_sensitive(true);
            headers.insert("x-api-key", value);
        }

        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim().trim_end_matches('/');
        format!("{}/{}", base, path.trim_start_matches('/'))
    }

    #[instrument(skip(self, request))]
    pub async fn enroll(&self, request: &EnrollRequest) -> AuthResponse {
        self.post(ENROLL_PATH, request).await
    }

    #[instrument(skip(self, request))]
    pub async fn login(&self, request: &LoginRequest) -> AuthResponse {
        self.post(LOGIN_PATH, request).await
    }

    #[instrument(skip(self, request))]
    pub async fn emergency_auth(&self, request: &EmergencyRequest) -> AuthResponse {
        self.post(EMERGENCY_PATH, request).await
    }

    #[instrument(skip(self, request))]
    pub async fn re_enroll(&self, request: &ReEnrollRequest) -> AuthResponse {
        self.post(RE_ENROLL_PATH, request).await
    }

    #[instrument(skip(self))]
    pub async fn check_status(&self, session_id: &str) -> AuthResponse {
        let url = self.url(&format!("{STATUS_PATH}/{session_id}"));
        let result = self
            .client
            .get(&url)
            .header("x-request-id", Ulid::new().to_string())
            .send()
            .await;

        Self::read(result).await
    }

    /// Dispatch any flow submission to its endpoint.
    pub async fn submit(&self, request: &AuthRequest) -> AuthResponse {
        match request {
            AuthRequest::Login(request) => self.login(request).await,
            AuthRequest::Enroll(request) => self.enroll(request).await,
            AuthRequest::Emergency(request) => self.emergency_auth(request).await,
            AuthRequest::ReEnroll(request) => self.re_enroll(request).await,
        }
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> AuthResponse {
        let url = self.url(path);
        let request_id = Ulid::new().to_string();

        debug!(%url, %request_id, "submitting");

        let result = self
            .client
            .post(&url)
            .header("x-request-id", request_id)
            .json(body)
            .send()
            .await;

        Self::read(result).await
    }

    async fn read(result: reqwest::Result<reqwest::Response>) -> AuthResponse {
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!("request failed: {}", e);
                return normalize_error(TransportFailure::Transport(e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("backend returned {}", status);
            return normalize_error(TransportFailure::Status { status, body });
        }

        match response.json::<AuthResponse>().await {
            Ok(response) => response,
            Err(e) => {
                warn!("failed to decode response: {}", e);
                normalize_error(TransportFailure::Transport(e.to_string()))
            }
        }
    }
}
