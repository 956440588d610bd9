use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::tools::ToolDefinition;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    /// Block kinds this client does not act on (e.g. extended thinking).
    #[serde(other)]
    Unsupported,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult { tool_use_id: tool_use_id.into(), content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Turn {
    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self { role: Role::User, content }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::user(vec![ContentBlock::text(text)])
    }

    /// Drops blocks that cannot be echoed back to the model.
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        let content =
            content.into_iter().filter(|block| !matches!(block, ContentBlock::Unsupported)).collect();
        Self { role: Role::Assistant, content }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    Other(String),
}

impl StopReason {
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("end_turn") => Self::EndTurn,
            Some("tool_use") => Self::ToolUse,
            Some("max_tokens") => Self::MaxTokens,
            Some("stop_sequence") => Self::StopSequence,
            Some(other) => Self::Other(other.to_string()),
            None => Self::Other(String::new()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
}

impl Completion {
    pub fn tool_invocations(&self) -> Vec<ToolInvocation> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolInvocation {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Text blocks joined by newlines; empty when the model produced none.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub tools: &'a [ToolDefinition],
    pub turns: &'a [Turn],
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model request failed: {0}")]
    Transport(String),
    #[error("model API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model response could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LlmError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Completion, ContentBlock, StopReason, Turn};

    #[test]
    fn content_blocks_use_tagged_wire_shape() {
        let block = ContentBlock::tool_result("toolu_1", "{\"ok\":true}");
        assert_eq!(
            serde_json::to_value(&block).unwrap_or_default(),
            json!({"type": "tool_result", "tool_use_id": "toolu_1", "content": "{\"ok\":true}"})
        );

        let parsed: Vec<ContentBlock> = serde_json::from_value(json!([
            {"type": "text", "text": "hi"},
            {"type": "tool_use", "id": "toolu_2", "name": "demo_ping", "input": {}},
            {"type": "thinking", "thinking": "..."}
        ]))
        .unwrap_or_default();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[2], ContentBlock::Unsupported);
    }

    #[test]
    fn completion_splits_text_and_tool_calls() {
        let completion = Completion {
            content: vec![
                ContentBlock::text("Looking that up."),
                ContentBlock::ToolUse {
                    id: "toolu_1".to_string(),
                    name: "github_list_prs".to_string(),
                    input: json!({"state": "open"}),
                },
                ContentBlock::text("One moment."),
            ],
            stop_reason: StopReason::from_wire(Some("tool_use")),
        };

        assert_eq!(completion.text(), "Looking that up.\nOne moment.");
        assert_eq!(completion.tool_invocations().len(), 1);
        assert_eq!(completion.stop_reason, StopReason::ToolUse);
    }

    #[test]
    fn assistant_turn_drops_unsupported_blocks() {
        let turn = Turn::assistant(vec![ContentBlock::Unsupported, ContentBlock::text("ok")]);
        assert_eq!(turn.content, vec![ContentBlock::text("ok")]);
    }
}
