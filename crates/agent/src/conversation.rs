use serde_json::Value;

use crate::llm::Turn;

/// Opening user turn that frames the thread transcript and the request.
pub fn opening_message(transcript: &str, instruction: &str) -> String {
    format!(
        "Here is the Slack thread for context:\n\n{transcript}\n\n---\n\nUser's request: {instruction}"
    )
}

/// Append-only turn history for one agent run.
#[derive(Clone, Debug, Default)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new(first: Turn) -> Self {
        Self { turns: vec![first] }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Literal token-to-value replacements applied to tool inputs before dispatch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Placeholders {
    pairs: Vec<(String, String)>,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, token: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((token.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Rewrites every string in `value`, recursing into arrays and objects.
    pub fn apply(&self, value: &mut Value) {
        if self.pairs.is_empty() {
            return;
        }
        match value {
            Value::String(text) => {
                for (token, replacement) in &self.pairs {
                    if text.contains(token.as_str()) {
                        *text = text.replace(token.as_str(), replacement);
                    }
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|item| self.apply(item)),
            Value::Object(fields) => fields.values_mut().for_each(|field| self.apply(field)),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{opening_message, ConversationState, Placeholders};
    use crate::llm::Turn;

    #[test]
    fn opening_message_frames_transcript_and_request() {
        let message = opening_message("@ana (9:05 AM): login is broken", "file a bug");
        assert_eq!(
            message,
            "Here is the Slack thread for context:\n\n@ana (9:05 AM): login is broken\n\n---\n\nUser's request: file a bug"
        );
    }

    #[test]
    fn placeholders_rewrite_nested_strings_only() {
        let placeholders =
            Placeholders::new().with("{{SLACK_THREAD_URL}}", "https://acme.slack.com/p1");
        let mut input = json!({
            "name": "Fix login",
            "description": "Context: {{SLACK_THREAD_URL}}",
            "labels": ["{{SLACK_THREAD_URL}}"],
            "estimate": 3
        });

        placeholders.apply(&mut input);

        assert_eq!(input["description"], "Context: https://acme.slack.com/p1");
        assert_eq!(input["labels"][0], "https://acme.slack.com/p1");
        assert_eq!(input["estimate"], 3);
    }

    #[test]
    fn state_is_append_only() {
        let mut state = ConversationState::new(Turn::user_text("hi"));
        state.push(Turn::assistant(Vec::new()));
        assert_eq!(state.len(), 2);
        assert_eq!(state.turns()[0], Turn::user_text("hi"));
    }
}
