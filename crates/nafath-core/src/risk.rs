//! Risk-analysis collaborator
//!
//! Turns the serialized approved request into a free-text verdict. The
//! production analyzer calls the OpenAI Responses API with a fixed system
//! prompt; the static analyzer answers without network access.

use crate::config::{RiskConfig, RiskProvider};
use crate::error::RiskError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Scores an approved request
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RiskAnalyzer: Send + Sync {
    /// Verdict text for the serialized request
    async fn analyze(&self, request: &str) -> Result<String, RiskError>;
}

/// Build the analyzer selected by `config`
///
/// # Errors
/// - `RiskError::MissingApiKey` / `RiskError::Prompt` when the OpenAI
///   analyzer cannot be set up
pub fn from_config(config: &RiskConfig) -> Result<Arc<dyn RiskAnalyzer>, RiskError> {
    match config.provider {
        RiskProvider::OpenAi => Ok(Arc::new(OpenAiRiskAnalyzer::from_config(config)?)),
        RiskProvider::Static => Ok(Arc::new(StaticRiskAnalyzer::new(
            config.static_verdict.clone(),
        ))),
    }
}

/// Analyzer backed by the OpenAI Responses API
#[derive(Clone)]
pub struct OpenAiRiskAnalyzer {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    reasoning_effort: String,
    prompt: String,
}

impl OpenAiRiskAnalyzer {
    /// Create analyzer with default endpoint and model
    #[must_use]
    pub fn new(api_key: impl Into<String>, prompt: impl Into<String>) -> Self {
        let defaults = RiskConfig::default();
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_base: defaults.api_base,
            model: defaults.model,
            reasoning_effort: defaults.reasoning_effort,
            prompt: prompt.into(),
        }
    }

    /// Read the API key from the environment and the prompt from disk
    ///
    /// # Errors
    /// - `RiskError::MissingApiKey` if the key variable is unset or empty
    /// - `RiskError::Prompt` if the prompt file cannot be read
    pub fn from_config(config: &RiskConfig) -> Result<Self, RiskError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| RiskError::MissingApiKey(config.api_key_env.clone()))?;
        let prompt =
            std::fs::read_to_string(&config.prompt_path).map_err(|source| RiskError::Prompt {
                path: config.prompt_path.clone(),
                source,
            })?;

        Ok(Self::new(api_key, prompt)
            .with_api_base(config.api_base.clone())
            .with_model(config.model.clone())
            .with_reasoning_effort(config.reasoning_effort.clone()))
    }

    /// With API base URL
    #[inline]
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// With model
    #[inline]
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// With reasoning effort
    #[inline]
    #[must_use]
    pub fn with_reasoning_effort(mut self, effort: impl Into<String>) -> Self {
        self.reasoning_effort = effort.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/responses", self.api_base.trim_end_matches('/'))
    }

    fn build_request<'a>(&'a self, request: &'a str) -> ResponsesRequest<'a> {
        ResponsesRequest {
            model: &self.model,
            input: vec![
                InputMessage {
                    role: "developer",
                    content: vec![InputContent {
                        kind: "input_text",
                        text: &self.prompt,
                    }],
                },
                InputMessage {
                    role: "user",
                    content: vec![InputContent {
                        kind: "input_text",
                        text: request,
                    }],
                },
            ],
            text: TextOptions {
                format: TextFormat { kind: "text" },
            },
            reasoning: ReasoningOptions {
                effort: &self.reasoning_effort,
            },
        }
    }
}

impl fmt::Debug for OpenAiRiskAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiRiskAnalyzer")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("reasoning_effort", &self.reasoning_effort)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RiskAnalyzer for OpenAiRiskAnalyzer {
    async fn analyze(&self, request: &str) -> Result<String, RiskError> {
        tracing::debug!(model = %self.model, bytes = request.len(), "requesting risk analysis");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.build_request(request))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RiskError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ResponsesResponse = serde_json::from_str(&body)
            .map_err(|e| RiskError::MalformedResponse(e.to_string()))?;
        extract_verdict(&parsed)
    }
}

/// Analyzer that always returns the same verdict
#[derive(Debug, Clone)]
pub struct StaticRiskAnalyzer {
    verdict: String,
}

impl StaticRiskAnalyzer {
    /// Create analyzer answering `verdict`
    #[inline]
    #[must_use]
    pub fn new(verdict: impl Into<String>) -> Self {
        Self {
            verdict: verdict.into(),
        }
    }
}

#[async_trait]
impl RiskAnalyzer for StaticRiskAnalyzer {
    async fn analyze(&self, _request: &str) -> Result<String, RiskError> {
        Ok(self.verdict.clone())
    }
}

// -- Responses API wire types --

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<InputMessage<'a>>,
    text: TextOptions,
    reasoning: ReasoningOptions<'a>,
}

#[derive(Debug, Serialize)]
struct InputMessage<'a> {
    role: &'static str,
    content: Vec<InputContent<'a>>,
}

#[derive(Debug, Serialize)]
struct InputContent<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct TextOptions {
    format: TextFormat,
}

#[derive(Debug, Serialize)]
struct TextFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ReasoningOptions<'a> {
    effort: &'a str,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// First `output_text` of the first `message` item; reasoning items are skipped.
fn extract_verdict(response: &ResponsesResponse) -> Result<String, RiskError> {
    response
        .output
        .iter()
        .filter(|item| item.kind == "message")
        .flat_map(|item| item.content.iter())
        .find(|c| c.kind == "output_text")
        .and_then(|c| c.text.clone())
        .ok_or_else(|| RiskError::MalformedResponse("no output_text in response".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_shape() {
        let analyzer = OpenAiRiskAnalyzer::new("sk-test", "You are a risk analyst.");
        let body = serde_json::to_value(analyzer.build_request("{\"metadata\":{}}")).unwrap();

        assert_eq!(body["model"], json!("o3"));
        assert_eq!(body["input"][0]["role"], json!("developer"));
        assert_eq!(
            body["input"][0]["content"][0]["text"],
            json!("You are a risk analyst.")
        );
        assert_eq!(body["input"][1]["role"], json!("user"));
        assert_eq!(body["input"][1]["content"][0]["type"], json!("input_text"));
        assert_eq!(body["text"]["format"]["type"], json!("text"));
        assert_eq!(body["reasoning"]["effort"], json!("medium"));
    }

    #[test]
    fn endpoint_trims_slash() {
        let analyzer = OpenAiRiskAnalyzer::new("k", "p").with_api_base("http://localhost:9/v1/");
        assert_eq!(analyzer.endpoint(), "http://localhost:9/v1/responses");
    }

    #[test]
    fn debug_hides_key() {
        let analyzer = OpenAiRiskAnalyzer::new("sk-secret", "p");
        assert!(!format!("{analyzer:?}").contains("sk-secret"));
    }

    #[test]
    fn verdict_skips_reasoning_items() {
        let response: ResponsesResponse = serde_json::from_value(json!({
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "Risk level: HIGH"}
                ]}
            ]
        }))
        .unwrap();
        assert_eq!(extract_verdict(&response).unwrap(), "Risk level: HIGH");
    }

    #[test]
    fn verdict_missing_is_malformed() {
        let response: ResponsesResponse =
            serde_json::from_value(json!({"output": [{"type": "reasoning"}]})).unwrap();
        assert!(matches!(
            extract_verdict(&response),
            Err(RiskError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn static_analyzer() {
        let analyzer = StaticRiskAnalyzer::new("Risk level: LOW");
        assert_eq!(analyzer.analyze("{}").await.unwrap(), "Risk level: LOW");
    }

    #[test]
    fn factory_static() {
        let config = RiskConfig {
            provider: RiskProvider::Static,
            ..RiskConfig::default()
        };
        assert!(from_config(&config).is_ok());
    }

    #[test]
    fn factory_openai_requires_key() {
        let config = RiskConfig {
            api_key_env: "NAFATH_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..RiskConfig::default()
        };
        assert!(matches!(
            from_config(&config),
            Err(RiskError::MissingApiKey(_))
        ));
    }
}
