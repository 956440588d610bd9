use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tracing::{info, warn};

use crate::conversation::{opening_message, ConversationState, Placeholders};
use crate::llm::{CompletionRequest, ContentBlock, LlmClient, LlmError, Turn};
use crate::tools::ToolRegistry;

pub const DEFAULT_MAX_ITERATIONS: u32 = 15;
pub const EMPTY_RESPONSE_TEXT: &str = "Done — no response text.";
pub const STEP_LIMIT_TEXT: &str =
    "I hit the maximum number of steps. Here's what I was able to do — please check the results.";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model completion failed: {0}")]
    Completion(#[from] LlmError),
}

/// Input for one agent run.
#[derive(Clone, Debug, Default)]
pub struct AgentRequest {
    pub transcript: String,
    pub instruction: String,
    pub placeholders: Placeholders,
    pub correlation_id: String,
}

/// Bounded tool-calling loop over a model and the tool registry.
pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    system_prompt: String,
    max_iterations: u32,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: Arc<ToolRegistry>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            registry,
            system_prompt: system_prompt.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn run(&self, request: AgentRequest) -> Result<String, AgentError> {
        let tools = self.registry.tools();
        let mut state = ConversationState::new(Turn::user_text(opening_message(
            &request.transcript,
            &request.instruction,
        )));

        for iteration in 1..=self.max_iterations {
            let completion = self
                .llm
                .complete(CompletionRequest {
                    system: &self.system_prompt,
                    tools: &tools,
                    turns: state.turns(),
                })
                .await?;

            let invocations = completion.tool_invocations();
            if invocations.is_empty() {
                info!(
                    event_name = "agent.run.completed",
                    correlation_id = %request.correlation_id,
                    iteration,
                    "agent produced final response"
                );
                let text = completion.text();
                return Ok(if text.is_empty() { EMPTY_RESPONSE_TEXT.to_string() } else { text });
            }

            info!(
                event_name = "agent.run.tool_calls",
                correlation_id = %request.correlation_id,
                iteration,
                tool_calls = invocations.len(),
                "executing tool calls"
            );
            state.push(Turn::assistant(completion.content));

            let results = join_all(invocations.into_iter().map(|invocation| {
                let mut input = invocation.input;
                request.placeholders.apply(&mut input);
                let registry = Arc::clone(&self.registry);
                async move {
                    let payload = registry.execute_tool(&invocation.name, input).await;
                    ContentBlock::tool_result(invocation.id, payload)
                }
            }))
            .await;
            state.push(Turn::user(results));
        }

        warn!(
            event_name = "agent.run.step_limit",
            correlation_id = %request.correlation_id,
            max_iterations = self.max_iterations,
            "agent reached iteration ceiling"
        );
        Ok(STEP_LIMIT_TEXT.to_string())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::Mutex;

    use crate::llm::{
        Completion, CompletionRequest, ContentBlock, LlmClient, LlmError, StopReason, Turn,
    };

    /// Replays scripted completions and records every request's turns.
    pub struct ScriptedLlm {
        script: Mutex<VecDeque<Result<Completion, String>>>,
        fallback: Option<Completion>,
        pub requests: Mutex<Vec<Vec<Turn>>>,
    }

    impl ScriptedLlm {
        pub fn new(script: Vec<Result<Completion, String>>) -> Self {
            Self { script: Mutex::new(script.into()), fallback: None, requests: Mutex::default() }
        }

        pub fn repeating(completion: Completion) -> Self {
            Self { script: Mutex::default(), fallback: Some(completion), requests: Mutex::default() }
        }

        pub async fn request_count(&self) -> usize {
            self.requests.lock().await.len()
        }
    }

    pub fn text(text: &str) -> Completion {
        Completion {
            content: vec![ContentBlock::text(text)],
            stop_reason: StopReason::EndTurn,
        }
    }

    pub fn tool_calls(calls: &[(&str, &str, Value)]) -> Completion {
        Completion {
            content: calls
                .iter()
                .map(|(id, name, input)| ContentBlock::ToolUse {
                    id: id.to_string(),
                    name: name.to_string(),
                    input: input.clone(),
                })
                .collect(),
            stop_reason: StopReason::ToolUse,
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LlmError> {
            self.requests.lock().await.push(request.turns.to_vec());
            match self.script.lock().await.pop_front() {
                Some(Ok(completion)) => Ok(completion),
                Some(Err(message)) => Err(LlmError::Transport(message)),
                None => self
                    .fallback
                    .clone()
                    .ok_or_else(|| LlmError::Transport("script exhausted".to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use super::test_support::{text, tool_calls, ScriptedLlm};
    use super::{AgentError, AgentRequest, AgentRuntime, EMPTY_RESPONSE_TEXT, STEP_LIMIT_TEXT};
    use crate::conversation::Placeholders;
    use crate::llm::{Completion, ContentBlock, Role, StopReason};
    use crate::schema::InputSchema;
    use crate::tools::test_support::StubModule;
    use crate::tools::{ActionDeclaration, CapabilityModule, ToolOutcome, ToolRegistry};

    fn registry_with_demo() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        let _ = registry.register(StubModule::new("demo", &["ping", "echo"]));
        Arc::new(registry)
    }

    fn request(instruction: &str) -> AgentRequest {
        AgentRequest {
            transcript: "@ana (9:00 AM): hello".to_string(),
            instruction: instruction.to_string(),
            ..AgentRequest::default()
        }
    }

    #[tokio::test]
    async fn plain_text_completion_finishes_after_one_request() -> Result<(), String> {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(text("All set."))]));
        let runtime = AgentRuntime::new(llm.clone(), registry_with_demo(), "system");

        let reply = runtime.run(request("status?")).await.map_err(|e| e.to_string())?;

        assert_eq!(reply, "All set.");
        assert_eq!(llm.request_count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn empty_text_completion_uses_fallback_message() -> Result<(), String> {
        let empty = Completion { content: Vec::new(), stop_reason: StopReason::EndTurn };
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(empty)]));
        let runtime = AgentRuntime::new(llm, registry_with_demo(), "system");

        let reply = runtime.run(request("status?")).await.map_err(|e| e.to_string())?;
        assert_eq!(reply, EMPTY_RESPONSE_TEXT);
        Ok(())
    }

    #[tokio::test]
    async fn whitespace_text_is_returned_unchanged() -> Result<(), String> {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(text("  \n"))]));
        let runtime = AgentRuntime::new(llm, registry_with_demo(), "system");

        let reply = runtime.run(request("status?")).await.map_err(|e| e.to_string())?;
        assert_eq!(reply, "  \n");
        Ok(())
    }

    #[tokio::test]
    async fn tool_round_trip_feeds_result_back_to_model() -> Result<(), String> {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(tool_calls(&[("toolu_1", "demo_ping", json!({}))])),
            Ok(text("pong")),
        ]));
        let runtime = AgentRuntime::new(llm.clone(), registry_with_demo(), "system");

        let reply = runtime.run(request("ping it")).await.map_err(|e| e.to_string())?;
        assert_eq!(reply, "pong");

        let requests = llm.requests.lock().await;
        assert_eq!(requests.len(), 2);
        let second = &requests[1];
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].role, Role::Assistant);
        assert_eq!(second[2].role, Role::User);
        assert_eq!(second[2].content, vec![ContentBlock::tool_result("toolu_1", "\"pong\"")]);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_back_not_raised() -> Result<(), String> {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(tool_calls(&[("toolu_1", "nonexistent_tool", json!({}))])),
            Ok(text("Sorry, I can't do that.")),
        ]));
        let runtime = AgentRuntime::new(llm.clone(), registry_with_demo(), "system");

        let reply = runtime.run(request("do it")).await.map_err(|e| e.to_string())?;
        assert_eq!(reply, "Sorry, I can't do that.");

        let requests = llm.requests.lock().await;
        let expected = json!({"error": "Unknown tool: nonexistent_tool"}).to_string();
        assert_eq!(requests[1][2].content, vec![ContentBlock::tool_result("toolu_1", expected)]);
        Ok(())
    }

    #[tokio::test]
    async fn loop_stops_at_iteration_ceiling() -> Result<(), String> {
        let llm = Arc::new(ScriptedLlm::repeating(tool_calls(&[(
            "toolu_loop",
            "demo_ping",
            json!({}),
        )])));
        let runtime = AgentRuntime::new(llm.clone(), registry_with_demo(), "system");

        let reply = runtime.run(request("loop forever")).await.map_err(|e| e.to_string())?;

        assert_eq!(reply, STEP_LIMIT_TEXT);
        assert_eq!(llm.request_count().await, 15);
        Ok(())
    }

    #[tokio::test]
    async fn custom_ceiling_is_respected() -> Result<(), String> {
        let llm = Arc::new(ScriptedLlm::repeating(tool_calls(&[("t", "demo_ping", json!({}))])));
        let runtime =
            AgentRuntime::new(llm.clone(), registry_with_demo(), "system").with_max_iterations(3);

        let reply = runtime.run(request("loop")).await.map_err(|e| e.to_string())?;
        assert_eq!(reply, STEP_LIMIT_TEXT);
        assert_eq!(llm.request_count().await, 3);
        Ok(())
    }

    #[tokio::test]
    async fn completion_failure_propagates() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err("connection reset".to_string())]));
        let runtime = AgentRuntime::new(llm, registry_with_demo(), "system");

        let result = runtime.run(request("anything")).await;
        assert!(matches!(result, Err(AgentError::Completion(_))));
    }

    #[tokio::test]
    async fn placeholders_are_substituted_before_dispatch() -> Result<(), String> {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(tool_calls(&[(
                "toolu_1",
                "demo_echo",
                json!({"description": "See {{SLACK_THREAD_URL}}"}),
            )])),
            Ok(text("Created.")),
        ]));
        let runtime = AgentRuntime::new(llm.clone(), registry_with_demo(), "system");

        let mut req = request("make a story");
        req.placeholders = Placeholders::new().with("{{SLACK_THREAD_URL}}", "https://x/p1");
        runtime.run(req).await.map_err(|e| e.to_string())?;

        let requests = llm.requests.lock().await;
        let ContentBlock::ToolResult { content, .. } = &requests[1][2].content[0] else {
            return Err("expected tool result".to_string());
        };
        let echoed: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
        assert_eq!(echoed["input"]["description"], "See https://x/p1");
        Ok(())
    }

    /// Records the order in which its actions finish.
    struct TimedModule {
        actions: Vec<ActionDeclaration>,
        finished: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl CapabilityModule for TimedModule {
        fn name(&self) -> &str {
            "timed"
        }

        fn description(&self) -> &str {
            "actions with fixed latency"
        }

        fn is_configured(&self) -> bool {
            true
        }

        fn actions(&self) -> &[ActionDeclaration] {
            &self.actions
        }

        async fn execute(&self, action: &str, _input: Value) -> ToolOutcome {
            if action == "slow" {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            self.finished.lock().await.push(action.to_string());
            ToolOutcome::Success(json!(action))
        }
    }

    #[tokio::test]
    async fn tool_calls_in_one_completion_run_concurrently() -> Result<(), String> {
        let finished = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ToolRegistry::new();
        let _ = registry.register(TimedModule {
            actions: vec![
                ActionDeclaration::new("slow", "slow action", InputSchema::new()),
                ActionDeclaration::new("fast", "fast action", InputSchema::new()),
            ],
            finished: Arc::clone(&finished),
        });

        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(tool_calls(&[("a", "timed_slow", json!({})), ("b", "timed_fast", json!({}))])),
            Ok(text("both done")),
        ]));
        let runtime = AgentRuntime::new(llm.clone(), Arc::new(registry), "system");

        let reply = runtime.run(request("run both")).await.map_err(|e| e.to_string())?;
        assert_eq!(reply, "both done");

        assert_eq!(*finished.lock().await, vec!["fast".to_string(), "slow".to_string()]);

        let requests = llm.requests.lock().await;
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1][2].content,
            vec![
                ContentBlock::tool_result("a", "\"slow\""),
                ContentBlock::tool_result("b", "\"fast\""),
            ]
        );
        Ok(())
    }
}
