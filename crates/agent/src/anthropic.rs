//! Messages API client for Anthropic models.

use std::time::Duration;

use async_trait::async_trait;
use mission_control_core::config::LlmConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::{
    Completion, CompletionRequest, ContentBlock, LlmClient, LlmError, StopReason, Turn,
};
use crate::tools::ToolDefinition;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ERROR_BODY_LIMIT: usize = 500;

#[derive(Clone, Debug)]
pub struct AnthropicSettings {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl AnthropicSettings {
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        Some(Self {
            api_key: config.api_key.clone()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

pub struct AnthropicClient {
    http: reqwest::Client,
    settings: AnthropicSettings,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolDefinition],
    messages: &'a [Turn],
}

fn no_tools(tools: &&[ToolDefinition]) -> bool {
    tools.is_empty()
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

impl AnthropicClient {
    pub fn new(settings: AnthropicSettings) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;
        Ok(Self { http, settings })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LlmError> {
        let url = format!("{}/v1/messages", self.settings.base_url);
        let body = MessagesRequest {
            model: &self.settings.model,
            max_tokens: self.settings.max_tokens,
            system: request.system,
            tools: request.tools,
            messages: request.turns,
        };

        debug!(
            event_name = "agent.llm.request",
            model = %self.settings.model,
            turns = request.turns.len(),
            tools = request.tools.len(),
            "sending completion request"
        );

        let response = self
            .http
            .post(&url)
            .header("x-api-key", self.settings.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > ERROR_BODY_LIMIT {
                let cut =
                    (0..=ERROR_BODY_LIMIT).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
                body.truncate(cut);
            }
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let parsed: MessagesResponse =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;

        Ok(Completion {
            content: parsed.content,
            stop_reason: StopReason::from_wire(parsed.stop_reason.as_deref()),
        })
    }
}
