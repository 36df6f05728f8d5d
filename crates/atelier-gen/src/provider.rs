//! Provider - text-generation API abstraction
//!
//! This module defines the provider trait Atelier generates through, and one
//! HTTP implementation against a completion-style endpoint using reqwest.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Default request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default completion budget
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Mask an API key for safe display in logs.
///
/// Shows the first and last 4 characters for keys longer than 8 characters,
/// otherwise `****`.
#[must_use]
pub(crate) fn mask_api_key(key: &str) -> String {
    if key.len() <= 8 {
        return "****".to_string();
    }
    format!("{}...{}", &key[..4], &key[key.len() - 4..])
}

/// Sanitize upstream API error messages before they travel further.
fn sanitize_api_error(error: &str) -> String {
    let lower = error.to_lowercase();

    if lower.contains("api key")
        || lower.contains("apikey")
        || lower.contains("unauthorized")
        || lower.contains("authentication")
    {
        return "API authentication error. Check the configured API key.".to_string();
    }
    if lower.contains("rate limit") || lower.contains("quota") || lower.contains("overloaded") {
        return "API rate limit exceeded. Try again later.".to_string();
    }
    if error.len() > 300 {
        return format!("{}...(truncated)", &error[..300]);
    }
    error.to_string()
}

/// One generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Client-side request id, for log correlation
    pub request_id: Uuid,
    /// Full prompt text
    pub prompt: String,
    /// Model override; provider default when `None`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Completion budget in tokens
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

impl GenerationRequest {
    /// Create a request with default budget and temperature.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            prompt: prompt.into(),
            model: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.7,
        }
    }

    /// Set the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the completion budget.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// One generation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Request this responds to
    pub request_id: Uuid,
    /// Generated text
    pub text: String,
    /// Model that produced the text
    pub model: String,
}

/// Trait for text-generation providers.
#[async_trait::async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Default model used when a request names none
    fn default_model(&self) -> &str;

    /// Generate a completion for `request`
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse>;
}

/// Configuration for the HTTP completion provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpTextProviderConfig {
    /// Endpoint base URL
    pub base_url: String,
    /// Bearer API key
    pub api_key: String,
    /// Default model
    pub model: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionReply {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

/// Provider speaking a completion-style HTTP API.
pub struct HttpTextProvider {
    config: HttpTextProviderConfig,
    client: reqwest::Client,
}

impl HttpTextProvider {
    /// Create a provider from config.
    ///
    /// Fails when the API key is empty; the composition root decides where
    /// the key comes from.
    pub fn new(config: HttpTextProviderConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::NotConfigured("empty API key".to_string()));
        }
        debug!(
            base_url = %config.base_url,
            key = %mask_api_key(&config.api_key),
            "generation provider configured"
        );
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Self { config, client })
    }
}

#[async_trait::async_trait]
impl GenerationProvider for HttpTextProvider {
    fn name(&self) -> &str {
        "http-text"
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        let model = request.model.as_deref().unwrap_or(&self.config.model);
        let body = CompletionBody {
            model,
            prompt: &request.prompt,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };
        debug!(request_id = %request.request_id, model, "sending generation request");

        let response = self
            .client
            .post(format!("{}/v1/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!(
                "{status}: {}",
                sanitize_api_error(&detail)
            )));
        }

        let reply: CompletionReply = response
            .json()
            .await
            .map_err(|e| Error::Api(sanitize_api_error(&e.to_string())))?;
        let text = reply
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| Error::Api("empty choices in completion reply".to_string()))?;

        Ok(GenerationResponse {
            request_id: request.request_id,
            text,
            model: model.to_string(),
        })
    }
}

/// Provider that assembles canned app descriptions without any network.
///
/// Stands in when no API key is configured; also what the integration tests
/// generate through. Output shape matches what [`crate::parse_app_reply`]
/// expects.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineTemplateProvider;

impl OfflineTemplateProvider {
    fn assemble(description: &str) -> serde_json::Value {
        let lower = description.to_lowercase();
        let name: String = lower
            .split_whitespace()
            .take(2)
            .collect::<Vec<_>>()
            .join("-");
        let mut components = vec![serde_json::json!({"type": "display", "props": {}})];
        for action in ["start", "stop", "reset", "add"] {
            if lower.contains(action) {
                components.push(serde_json::json!({
                    "type": "button",
                    "props": {"label": action}
                }));
            }
        }
        if lower.contains("note") || lower.contains("list") || lower.contains("todo") {
            components.push(serde_json::json!({"type": "list", "props": {}}));
            components.push(serde_json::json!({"type": "input", "props": {}}));
        }
        serde_json::json!({
            "name": if name.is_empty() { "app".to_string() } else { name },
            "title": description,
            "components": components,
        })
    }
}

#[async_trait::async_trait]
impl GenerationProvider for OfflineTemplateProvider {
    fn name(&self) -> &str {
        "offline"
    }

    fn default_model(&self) -> &str {
        "template"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        // The prompt carries the description on its final line.
        let description = request
            .prompt
            .rsplit("Description:")
            .next()
            .unwrap_or("")
            .trim();
        Ok(GenerationResponse {
            request_id: request.request_id,
            text: Self::assemble(description).to_string(),
            model: "template".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_api_key() {
        assert_eq!(mask_api_key("sk-1234567890abcdef"), "sk-1...cdef");
        assert_eq!(mask_api_key("short"), "****");
    }

    #[test]
    fn test_sanitize_api_error() {
        assert!(sanitize_api_error("Invalid API key provided").contains("authentication"));
        assert!(sanitize_api_error("rate limit hit").contains("rate limit"));
        assert_eq!(sanitize_api_error("model overheated"), "model overheated");
    }

    #[test]
    fn test_request_builder() {
        let request = GenerationRequest::new("describe an app")
            .with_model("small-fast")
            .with_max_tokens(256);
        assert_eq!(request.model.as_deref(), Some("small-fast"));
        assert_eq!(request.max_tokens, 256);
    }

    #[tokio::test]
    async fn test_offline_provider_output_parses() {
        let provider = OfflineTemplateProvider;
        let prompt = crate::prompt::build_app_prompt("a pomodoro timer with start and reset");
        let response = provider.generate(GenerationRequest::new(prompt)).await.unwrap();

        let app = crate::prompt::parse_app_reply(&response.text).unwrap();
        assert_eq!(app.title, "a pomodoro timer with start and reset");
        assert!(app.components.iter().any(|c| c.component_type == "display"));
        assert!(app.components.iter().any(|c| c.component_type == "button"));
    }

    #[test]
    fn test_empty_key_is_rejected() {
        let result = HttpTextProvider::new(HttpTextProviderConfig {
            base_url: "https://example.invalid".to_string(),
            api_key: String::new(),
            model: "m".to_string(),
            timeout_secs: 5,
        });
        assert!(matches!(result, Err(Error::NotConfigured(_))));
    }
}
