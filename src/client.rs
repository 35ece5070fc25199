//! Blocking HTTP client for the prediction API.
//!
//! Used by the terminal front-end, which runs no async runtime of its own.
//! Errors distinguish transport failures (server unreachable) from rejected
//! requests (the server answered with an error status), and rejected
//! requests surface the server's own message.

use crate::schema::RawRecord;
use crate::service::{HealthStatus, PredictionResponse};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Where the client points when `API_URL` is not set.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
const API_URL_VAR: &str = "API_URL";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request to {url} failed: {source}")]
    Transport { url: String, source: reqwest::Error },

    #[error("server rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("could not parse server response: {0}")]
    BadResponse(String),
}

pub struct ApiClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }

    /// Builds a client against `API_URL`, falling back to the local default.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var(API_URL_VAR).unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self::new(&base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn health(&self) -> Result<HealthStatus, ClientError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|source| ClientError::Transport { url, source })?;
        decode(response)
    }

    pub fn predict(&self, record: &RawRecord) -> Result<PredictionResponse, ClientError> {
        let url = format!("{}/predict", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(record)
            .send()
            .map_err(|source| ClientError::Transport { url, source })?;
        decode(response)
    }
}

fn decode<T: DeserializeOwned>(response: reqwest::blocking::Response) -> Result<T, ClientError> {
    let status = response.status();
    let text = response
        .text()
        .map_err(|e| ClientError::BadResponse(e.to_string()))?;
    if !status.is_success() {
        return Err(ClientError::Rejected {
            status: status.as_u16(),
            message: extract_error_message(&text),
        });
    }
    serde_json::from_str(&text).map_err(|e| ClientError::BadResponse(format!("{e} (body: {text})")))
}

/// Pulls a readable message out of an error body. The API answers either
/// `{"error": "..."}` or `{"error": {"field": ..., "reason": ...}}`, and
/// readiness failures use `{"detail": ...}`; anything else falls back to the
/// raw body.
fn extract_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };
    match &value["error"] {
        serde_json::Value::String(message) => message.clone(),
        serde_json::Value::Object(fields) => {
            let field = fields
                .get("field")
                .and_then(|f| f.as_str())
                .unwrap_or("request");
            let reason = fields
                .get("reason")
                .and_then(|r| r.as_str())
                .unwrap_or("rejected");
            format!("{field}: {reason}")
        }
        _ => value["detail"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
    }
}
