use super::{LivenessBackend, LivenessError, LivenessSession};
use crate::{cli::globals::Config, APP_USER_AGENT};
use anyhow::{Context, Result};
use regex::Regex;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client, Response,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};
use ulid::Ulid;

/// Fallback when a result call fails without a message.
pub const RESULT_FAILED_MESSAGE: &str = "ライブネス検証に失敗しました";

/// Same check the backend applies to `employee_id`.
///
/// # Errors
/// Returns [`LivenessError::InvalidSubject`] unless the id is 1-50 ASCII alphanumerics
pub fn validate_subject(subject: &str) -> Result<(), LivenessError> {
    if Regex::new(r"^[A-Za-z0-9]{1,50}$").is_ok_and(|re| re.is_match(subject)) {
        Ok(())
    } else {
        Err(LivenessError::InvalidSubject(subject.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct LivenessResult {
    is_live: bool,
}

/// HTTP client for the liveness session endpoints.
#[derive(Debug, Clone)]
pub struct LivenessClient {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl LivenessClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .default_headers(headers)
            .build()
            .context("Failed to build liveness HTTP client")?;

        Ok(Self {
            client,
            base_url: config.liveness_base_url().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Reason carried by a non-2xx reply: the body's `message`, else `fallback`.
    async fn failure_reason(response: Response, fallback: impl FnOnce(u16) -> String) -> String {
        let status = response.status();
        let body = match response.json::<Value>().await {
            Ok(body) => body,
            Err(_) => json!({
                "message": format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or_default()
                )
            }),
        };

        body.get("message")
            .and_then(Value::as_str)
            .filter(|message| !message.is_empty())
            .map_or_else(|| fallback(status.as_u16()), ToString::to_string)
    }
}

impl LivenessBackend for LivenessClient {
    #[instrument(skip(self))]
    async fn create_session(&self, subject: &str) -> Result<LivenessSession, LivenessError> {
        validate_subject(subject)?;

        let url = format!("{}/liveness/session/create", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-request-id", Ulid::new().to_string())
            .json(&json!({ "employee_id": subject }))
            .send()
            .await
            .map_err(|e| LivenessError::Session(e.to_string()))?;

        debug!(status = %response.status(), "session create response");

        if !response.status().is_success() {
            let reason = Self::failure_reason(response, |status| {
                format!("セッション作成に失敗しました ({status})")
            })
            .await;
            return Err(LivenessError::Session(reason));
        }

        response
            .json::<LivenessSession>()
            .await
            .map_err(|e| LivenessError::Session(e.to_string()))
    }

    #[instrument(skip(self))]
    async fn fetch_result(&self, session_id: &str) -> Result<bool, LivenessError> {
        let url = format!("{}/liveness/session/{session_id}/result", self.base_url);
        let mut request = self
            .client
            .get(&url)
            .header("x-request-id", Ulid::new().to_string());
        if let Some(api_key) = &self.api_key {
            request = request.header("x-api-key", api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| LivenessError::Result(e.to_string()))?;

        debug!(status = %response.status(), "liveness result response");

        if !response.status().is_success() {
            let reason =
                Self::failure_reason(response, |_| RESULT_FAILED_MESSAGE.to_string()).await;
            return Err(LivenessError::Result(reason));
        }

        let result = response
            .json::<LivenessResult>()
            .await
            .map_err(|e| LivenessError::Result(e.to_string()))?;

        Ok(result.is_live)
    }
}
