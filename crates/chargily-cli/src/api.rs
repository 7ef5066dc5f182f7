//! HTTP client for the Chargily Pay API.
//!
//! One client serves one `(application, mode)` pair. Calls are made once;
//! failures surface as [`ApiError`] and nothing is retried.

use std::time::Duration;

use chargily_core::Mode;
use chargily_core::model::Credentials;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Errors returned by [`ChargilyClient`].
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No key is configured for the selected application and mode.
    #[error("no API key configured for '{application}' in {mode} mode")]
    MissingApiKey { application: String, mode: Mode },

    /// The API answered with a non-success status.
    #[error("API returned {status}: {message}")]
    Http {
        status: u16,
        message: String,
        body: Value,
    },

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body was not valid JSON.
    #[error("failed to decode API response: {reason}")]
    Decode { reason: String },
}

impl ApiError {
    /// HTTP status, if the API answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }

    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| s >= 500)
    }

    #[must_use]
    pub fn is_authentication_error(&self) -> bool {
        self.status() == Some(401)
    }

    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        self.status() == Some(422)
    }

    /// Field-level messages from a 422 body, as `(field, message)` pairs.
    #[must_use]
    pub fn validation_errors(&self) -> Vec<(String, String)> {
        let Self::Http { body, .. } = self else {
            return Vec::new();
        };
        let Some(errors) = body.get("errors").and_then(Value::as_object) else {
            return Vec::new();
        };
        errors
            .iter()
            .map(|(field, messages)| {
                let text = match messages {
                    Value::Array(items) => items
                        .iter()
                        .map(|m| m.as_str().map_or_else(|| m.to_string(), str::to_owned))
                        .collect::<Vec<_>>()
                        .join(", "),
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (field.clone(), text)
            })
            .collect()
    }

    /// A message suitable for showing to an operator.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Http {
                status, message, ..
            } => match status {
                401 => "Invalid API credentials. Please check your API key.".to_owned(),
                403 => "Access forbidden. Please verify your account permissions.".to_owned(),
                404 => "The requested resource was not found.".to_owned(),
                422 => {
                    let errors = self.validation_errors();
                    if errors.is_empty() {
                        format!("Validation error: {message}")
                    } else {
                        let joined = errors
                            .iter()
                            .map(|(field, text)| format!("{field}: {text}"))
                            .collect::<Vec<_>>()
                            .join("; ");
                        format!("Validation error: {joined}")
                    }
                }
                429 => "Rate limit exceeded. Please wait and try again.".to_owned(),
                500 => "Server error occurred. Please try again later.".to_owned(),
                503 => "Service temporarily unavailable. Please try again later.".to_owned(),
                _ if message.is_empty() => "An unexpected error occurred.".to_owned(),
                _ => message.clone(),
            },
            other => other.to_string(),
        }
    }

    /// A short remedial hint for the operator.
    #[must_use]
    pub fn suggested_action(&self) -> &'static str {
        match self {
            Self::MissingApiKey { .. } => {
                "Run `chargily key set <mode> <key>` to configure a key for this application."
            }
            Self::Transport(_) => "Check your network connection and the configured base URL.",
            Self::Decode { .. } => "The API returned an unexpected response. Try again later.",
            Self::Http { status, .. } => match status {
                403 => "Check your account status and permissions in the Chargily dashboard.",
                404 => "Verify the ID or URL you are trying to access.",
                429 => "Wait a few minutes before making more requests.",
                _ if self.is_authentication_error() => {
                    "Run `chargily key set <mode> <key>` to update your API credentials."
                }
                _ if self.is_validation_error() => {
                    "Check your input data and fix the validation errors."
                }
                _ if self.is_server_error() => {
                    "Try again in a few minutes. If the problem persists, contact Chargily support."
                }
                _ => "Check the error details and try again.",
            },
        }
    }
}

/// Outcome of [`ChargilyClient::test_connection`].
#[derive(Debug)]
pub struct ConnectionCheck {
    pub success: bool,
    pub message: String,
    /// Balance payload on success.
    pub data: Option<Value>,
}

/// Authenticated client for one application and mode.
pub struct ChargilyClient {
    http: reqwest::Client,
    credentials: Credentials,
}

impl ChargilyClient {
    /// # Errors
    ///
    /// Returns `ApiError::Transport` if the HTTP client cannot be built.
    pub fn new(credentials: Credentials, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chargily-cli/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, credentials })
    }

    fn url(&self, endpoint: &str) -> String {
        join_url(&self.credentials.base_url, endpoint)
    }

    fn api_key(&self) -> Result<&str, ApiError> {
        self.credentials
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ApiError::MissingApiKey {
                application: self.credentials.application.clone(),
                mode: self.credentials.mode,
            })
    }

    pub async fn get(&self, endpoint: &str) -> Result<Value, ApiError> {
        let key = self.api_key()?;
        debug!(application = %self.credentials.application, mode = %self.credentials.mode, endpoint, "GET");
        let resp = self.http.get(self.url(endpoint)).bearer_auth(key).send().await?;
        self.handle_response(resp).await
    }

    pub async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, ApiError> {
        let key = self.api_key()?;
        debug!(application = %self.credentials.application, mode = %self.credentials.mode, endpoint, "POST");
        let resp = self
            .http
            .post(self.url(endpoint))
            .bearer_auth(key)
            .json(body)
            .send()
            .await?;
        self.handle_response(resp).await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<Value, ApiError> {
        let key = self.api_key()?;
        debug!(application = %self.credentials.application, mode = %self.credentials.mode, endpoint, "DELETE");
        let resp = self
            .http
            .delete(self.url(endpoint))
            .bearer_auth(key)
            .send()
            .await?;
        self.handle_response(resp).await
    }

    /// Fetch the account balance.
    pub async fn balance(&self) -> Result<Value, ApiError> {
        self.get("/balance").await
    }

    /// Check the API with a balance fetch, reporting rather than failing.
    pub async fn test_connection(&self) -> ConnectionCheck {
        match self.balance().await {
            Ok(data) => ConnectionCheck {
                success: true,
                message: "API connection successful".to_owned(),
                data: Some(data),
            },
            Err(e) => ConnectionCheck {
                success: false,
                message: e.user_message(),
                data: None,
            },
        }
    }

    async fn handle_response(&self, resp: reqwest::Response) -> Result<Value, ApiError> {
        let status = resp.status();
        let text = resp.text().await?;
        let result = decode_response(status.as_u16(), &text);
        if let Err(e @ ApiError::Http { message, .. }) = &result {
            let application = self.credentials.application.as_str();
            let mode = self.credentials.mode;
            if e.is_client_error() {
                info!(application, %mode, status = e.status(), message = %message, "Chargily API rejected request");
            } else {
                warn!(application, %mode, status = e.status(), message = %message, "Chargily API error");
            }
        }
        result
    }
}

/// `base` and `endpoint` joined with exactly one slash.
fn join_url(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Turn a status code and raw body into a payload or an [`ApiError`].
fn decode_response(status: u16, text: &str) -> Result<Value, ApiError> {
    let success = (200..300).contains(&status);
    if success && text.trim().is_empty() {
        return Ok(Value::Null);
    }

    let parsed: Result<Value, _> = serde_json::from_str(text);
    if success {
        return parsed.map_err(|e| ApiError::Decode {
            reason: e.to_string(),
        });
    }

    let body = parsed.unwrap_or_else(|_| Value::String(text.to_owned()));
    let message = ["message", "error"]
        .iter()
        .find_map(|field| body.get(field).and_then(Value::as_str))
        .unwrap_or("Unknown API error")
        .to_owned();
    Err(ApiError::Http {
        status,
        message,
        body,
    })
}
