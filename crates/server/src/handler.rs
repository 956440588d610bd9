//! Answers a Slack thread with one agent run.

use std::sync::Arc;

use async_trait::async_trait;
use mission_control_agent::{AgentRequest, AgentRuntime, Placeholders};
use mission_control_slack::events::{
    EventContext, EventHandler, EventHandlerError, HandlerResult, SlackEvent, SlackEventType,
};
use mission_control_slack::thread::{format_transcript, instruction_from, DEFAULT_INSTRUCTION};
use mission_control_slack::SlackGateway;
use tokio::sync::OnceCell;
use tracing::{info, warn};

pub const THREAD_URL_PLACEHOLDER: &str = "{{SLACK_THREAD_URL}}";

pub struct ThreadAssistant {
    gateway: Arc<dyn SlackGateway>,
    runtime: Arc<AgentRuntime>,
    bot_user_id: OnceCell<String>,
}

impl ThreadAssistant {
    pub fn new(gateway: Arc<dyn SlackGateway>, runtime: Arc<AgentRuntime>) -> Self {
        Self { gateway, runtime, bot_user_id: OnceCell::new() }
    }

    /// Resolved once; failures are retried on the next mention.
    async fn bot_user_id(&self, ctx: &EventContext) -> Option<&str> {
        match self.bot_user_id.get_or_try_init(|| self.gateway.bot_user_id()).await {
            Ok(id) if !id.is_empty() => Some(id.as_str()),
            Ok(_) => None,
            Err(error) => {
                warn!(
                    event_name = "slack.auth.lookup_failed",
                    correlation_id = %ctx.correlation_id,
                    error = %error,
                    "could not resolve bot user id; keeping mentions in the instruction"
                );
                None
            }
        }
    }

    /// Fetches the thread around `thread_ts`, runs the agent and replies in
    /// the thread's root.
    pub async fn answer(
        &self,
        channel: &str,
        thread_ts: &str,
        instruction: String,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        let messages = self.gateway.fetch_thread(channel, thread_ts).await?;
        let root_ts = messages.first().map(|message| message.ts.as_str()).unwrap_or(thread_ts);

        let mut placeholders = Placeholders::new();
        match self.gateway.permalink(channel, root_ts).await {
            Ok(link) if !link.is_empty() => placeholders = placeholders.with(THREAD_URL_PLACEHOLDER, link),
            Ok(_) => {}
            Err(error) => warn!(
                event_name = "slack.thread.permalink_failed",
                correlation_id = %ctx.correlation_id,
                channel,
                thread_ts = root_ts,
                error = %error,
                "continuing without thread permalink"
            ),
        }

        info!(
            event_name = "slack.thread.agent_started",
            correlation_id = %ctx.correlation_id,
            channel,
            thread_ts = root_ts,
            messages = messages.len(),
            "running agent for thread"
        );
        let reply = self
            .runtime
            .run(AgentRequest {
                transcript: format_transcript(&messages),
                instruction,
                placeholders,
                correlation_id: ctx.correlation_id.clone(),
            })
            .await
            .map_err(|error| EventHandlerError::Agent(error.to_string()))?;

        self.gateway.post_thread_reply(channel, root_ts, &reply).await?;
        info!(
            event_name = "slack.thread.replied",
            correlation_id = %ctx.correlation_id,
            channel,
            thread_ts = root_ts,
            "posted agent reply"
        );
        Ok(())
    }
}

pub struct MentionHandler {
    assistant: Arc<ThreadAssistant>,
}

impl MentionHandler {
    pub fn new(assistant: Arc<ThreadAssistant>) -> Self {
        Self { assistant }
    }
}

#[async_trait]
impl EventHandler for MentionHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::AppMention
    }

    async fn handle(&self, event: &SlackEvent, ctx: &EventContext) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::AppMention(mention) = event else {
            return Ok(HandlerResult::Ignored);
        };
        let bot_user_id = self.assistant.bot_user_id(ctx).await;
        let instruction = instruction_from(&mention.text, bot_user_id);
        self.assistant.answer(&mention.channel, mention.thread_root(), instruction, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}

/// Reacting with the trigger emoji is a mention without words.
pub struct TriggerReactionHandler {
    assistant: Arc<ThreadAssistant>,
}

impl TriggerReactionHandler {
    pub fn new(assistant: Arc<ThreadAssistant>) -> Self {
        Self { assistant }
    }
}

#[async_trait]
impl EventHandler for TriggerReactionHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ReactionAdded
    }

    async fn handle(&self, event: &SlackEvent, ctx: &EventContext) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ReactionAdded(reaction) = event else {
            return Ok(HandlerResult::Ignored);
        };
        self.assistant
            .answer(&reaction.channel, &reaction.message_ts, DEFAULT_INSTRUCTION.to_string(), ctx)
            .await?;
        Ok(HandlerResult::Processed)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use mission_control_agent::llm::{Completion, CompletionRequest, ContentBlock, StopReason, Turn};
    use mission_control_agent::{AgentRuntime, LlmClient, LlmError, ToolRegistry};
    use mission_control_slack::web::{GatewayError, SlackGateway, ThreadMessage};
    use tokio::sync::Mutex;

    /// In-memory Slack: one canned thread, recorded replies.
    #[derive(Default)]
    pub struct FakeGateway {
        pub thread: Vec<ThreadMessage>,
        pub permalink: Option<String>,
        pub fail_fetch: bool,
        pub replies: Mutex<Vec<(String, String, String)>>,
    }

    impl FakeGateway {
        pub fn with_thread(messages: &[(&str, &str, &str)]) -> Self {
            Self {
                thread: messages
                    .iter()
                    .map(|(user, ts, text)| ThreadMessage {
                        user: user.to_string(),
                        text: text.to_string(),
                        ts: ts.to_string(),
                        files: Vec::new(),
                    })
                    .collect(),
                permalink: Some("https://acme.slack.com/archives/C1/p1001".to_string()),
                ..Self::default()
            }
        }

        pub async fn replies(&self) -> Vec<(String, String, String)> {
            self.replies.lock().await.clone()
        }
    }

    #[async_trait]
    impl SlackGateway for FakeGateway {
        async fn fetch_thread(&self, channel: &str, thread_ts: &str) -> Result<Vec<ThreadMessage>, GatewayError> {
            if self.fail_fetch {
                return Err(GatewayError::EmptyThread { channel: channel.to_string(), thread_ts: thread_ts.to_string() });
            }
            Ok(self.thread.clone())
        }

        async fn post_thread_reply(&self, channel: &str, thread_ts: &str, text: &str) -> Result<(), GatewayError> {
            self.replies.lock().await.push((channel.to_string(), thread_ts.to_string(), text.to_string()));
            Ok(())
        }

        async fn permalink(&self, channel: &str, message_ts: &str) -> Result<String, GatewayError> {
            self.permalink
                .clone()
                .ok_or_else(|| GatewayError::EmptyThread { channel: channel.to_string(), thread_ts: message_ts.to_string() })
        }

        async fn bot_user_id(&self) -> Result<String, GatewayError> {
            Ok("UBOT".to_string())
        }
    }

    /// Replays completions in order and records the opening user turn.
    #[derive(Default)]
    pub struct ScriptedModel {
        pub script: Mutex<VecDeque<Completion>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub fn replying(text: &str) -> Self {
            let completion = Completion { content: vec![ContentBlock::text(text)], stop_reason: StopReason::EndTurn };
            Self { script: Mutex::new(VecDeque::from([completion])), prompts: Mutex::default() }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedModel {
        async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LlmError> {
            let opening = request.turns.first().map(first_text).unwrap_or_default();
            self.prompts.lock().await.push(opening);
            self.script
                .lock()
                .await
                .pop_front()
                .ok_or_else(|| LlmError::Transport("script exhausted".to_string()))
        }
    }

    fn first_text(turn: &Turn) -> String {
        turn.content
            .iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn runtime(model: Arc<ScriptedModel>) -> Arc<AgentRuntime> {
        Arc::new(AgentRuntime::new(model, Arc::new(ToolRegistry::new()), "system"))
    }
}
