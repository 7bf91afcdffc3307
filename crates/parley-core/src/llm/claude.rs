use std::time::Duration;

use crate::constants::{endpoints, models};
use crate::error::ParleyError;
use crate::llm::traits::*;
use serde::Deserialize;
use serde_json::Value;

/// Anthropic Messages API transport.
///
/// Every request is sent with [`models::PINNED_MODEL`]; the model picked in
/// settings is not forwarded.
pub struct ClaudeTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ClaudeTransport {
    pub fn new() -> Self {
        let timeout = Duration::from_secs(endpoints::REQUEST_TIMEOUT_SECS);
        Self {
            client: build_client(timeout),
            base_url: endpoints::CLAUDE_BASE_URL.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self.timeout = timeout;
        self
    }

    pub(crate) fn build_request_body(
        turns: &[Turn],
        system_prompt: Option<&str>,
        params: &GenerationParams,
    ) -> Value {
        let mut body = serde_json::json!({
            "model": models::PINNED_MODEL,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "top_p": params.top_p,
            "messages": turns,
        });

        if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
            body["system"] = Value::String(system.to_string());
        }

        body
    }

    fn map_transport_error(&self, err: reqwest::Error) -> ParleyError {
        if err.is_timeout() {
            ParleyError::Timeout(self.timeout.as_secs())
        } else {
            ParleyError::Network(err.to_string())
        }
    }
}

impl Default for ClaudeTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct ClaudeApiResponse {
    content: Vec<ClaudeContent>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorBody {
    error: ClaudeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

pub(crate) fn parse_success(body: &str) -> Result<Completion, ParleyError> {
    let api_response: ClaudeApiResponse = serde_json::from_str(body)
        .map_err(|e| ParleyError::provider("invalid_response", format!("Failed to parse response: {e}")))?;

    let content = api_response
        .content
        .iter()
        .filter(|c| c.content_type == "text")
        .map(|c| c.text.as_str())
        .collect::<String>();

    Ok(Completion {
        content,
        model_id: api_response.model,
        stop_reason: api_response.stop_reason,
        usage: api_response.usage,
    })
}

pub(crate) fn parse_failure(status: reqwest::StatusCode, body: &str) -> ParleyError {
    match serde_json::from_str::<ClaudeErrorBody>(body) {
        Ok(parsed) => ParleyError::provider(parsed.error.kind, parsed.error.message),
        Err(_) => ParleyError::provider(
            "http_error",
            format!("Claude API error ({status}): {body}"),
        ),
    }
}

#[async_trait::async_trait]
impl ModelProvider for ClaudeTransport {
    async fn send_completion(
        &self,
        turns: &[Turn],
        system_prompt: Option<&str>,
        params: &GenerationParams,
        credential: &str,
    ) -> Result<Completion, ParleyError> {
        let url = format!("{}{}", self.base_url, endpoints::MESSAGES_PATH);
        let request_body = Self::build_request_body(turns, system_prompt, params);

        tracing::debug!(
            turns = turns.len(),
            model = models::PINNED_MODEL,
            "sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", credential)
            .header("anthropic-version", endpoints::ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            let err = parse_failure(status, &response_text);
            tracing::warn!("completion request failed: {}", err);
            return Err(err);
        }

        parse_success(&response_text)
    }
}
