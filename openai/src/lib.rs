//! Minimal OpenAI Responses API client.
//!
//! This crate provides a focused client for schema-constrained generation:
//! - A system/user instruction pair per request
//! - Strict `json_schema` output formatting
//! - Payload extraction from either the `output_text` convenience field or
//!   the list of typed content fragments

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f32 = 0.2;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1200;

/// Errors that can occur when using the OpenAI client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Missing OPENAI_API_KEY")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Model refusal: {0}")]
    Refusal(String),

    #[error("No output text found in response")]
    EmptyOutput,
}

/// OpenAI API client.
#[derive(Clone)]
pub struct OpenAi {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAi {
    /// Create a new client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .connect_timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            base_url: API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create a client from the OPENAI_API_KEY environment variable.
    ///
    /// An empty variable counts as missing.
    pub fn from_env() -> Result<Self, Error> {
        match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key)),
            _ => Err(Error::NoApiKey),
        }
    }

    /// Set the default model for this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the client at a different API base (proxies, compatible servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// The model used when a request does not name one.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a structured-output request and return the parsed JSON payload.
    ///
    /// The payload is returned as-is; strict mode is a best effort on the
    /// provider side, so callers still validate it against their schema.
    pub async fn structured(&self, request: StructuredRequest) -> Result<serde_json::Value, Error> {
        if self.api_key.trim().is_empty() {
            return Err(Error::NoApiKey);
        }

        let api_request = self.build_api_request(&request);
        let headers = self.build_headers()?;

        tracing::debug!(
            model = %api_request.model,
            schema = %request.schema_name,
            max_output_tokens = api_request.max_output_tokens,
            "sending structured output request"
        );

        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .headers(headers)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let api_response: ApiResponse =
            serde_json::from_str(&body).map_err(|e| Error::Parse(e.to_string()))?;
        let text = extract_output_text(&api_response)?;

        serde_json::from_str(&text)
            .map_err(|e| Error::Parse(format!("output text is not valid JSON: {e}")))
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| Error::Config(format!("Invalid API key: {e}")))?,
        );
        Ok(headers)
    }

    fn build_api_request(&self, request: &StructuredRequest) -> ApiRequest {
        ApiRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            input: vec![
                ApiInputMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                ApiInputMessage {
                    role: "user".to_string(),
                    content: request.user.clone(),
                },
            ],
            text: ApiTextConfig {
                format: ApiTextFormat {
                    r#type: "json_schema".to_string(),
                    name: request.schema_name.clone(),
                    strict: true,
                    schema: request.schema.clone(),
                },
            },
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
        }
    }
}

// ============================================================================
// Public types
// ============================================================================

/// A schema-constrained generation request.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub model: Option<String>,
    pub system: String,
    pub user: String,
    pub schema_name: String,
    pub schema: serde_json::Value,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl StructuredRequest {
    /// Create a request from an instruction pair and the output schema.
    pub fn new(
        system: impl Into<String>,
        user: impl Into<String>,
        schema: serde_json::Value,
    ) -> Self {
        Self {
            model: None,
            system: system.into(),
            user: user.into(),
            schema_name: "output".to_string(),
            schema,
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_schema_name(mut self, name: impl Into<String>) -> Self {
        self.schema_name = name.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }
}

/// Locate the textual payload in a response envelope.
///
/// Prefers the `output_text` convenience field; otherwise joins every
/// `output_text` fragment in order. A refusal fragment anywhere fails the
/// whole response.
fn extract_output_text(response: &ApiResponse) -> Result<String, Error> {
    if let Some(text) = &response.output_text {
        return Ok(text.clone());
    }

    let mut chunks = Vec::new();
    for item in &response.output {
        for part in &item.content {
            match part {
                ApiContentPart::OutputText { text } => chunks.push(text.as_str()),
                ApiContentPart::Refusal { refusal } => {
                    return Err(Error::Refusal(refusal.clone().unwrap_or_default()));
                }
                ApiContentPart::Other => {}
            }
        }
    }

    if chunks.is_empty() {
        return Err(Error::EmptyOutput);
    }
    Ok(chunks.concat())
}

/// Pull `error.message` out of an error body, falling back to the raw text.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "OpenAI API request failed".to_string()
            } else {
                body.to_string()
            }
        })
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    input: Vec<ApiInputMessage>,
    text: ApiTextConfig,
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ApiInputMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ApiTextConfig {
    format: ApiTextFormat,
}

#[derive(Debug, Serialize)]
struct ApiTextFormat {
    r#type: String,
    name: String,
    strict: bool,
    schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<ApiOutputItem>,
}

#[derive(Debug, Deserialize)]
struct ApiOutputItem {
    #[serde(default)]
    content: Vec<ApiContentPart>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentPart {
    OutputText {
        text: String,
    },
    Refusal {
        #[serde(default)]
        refusal: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}
