use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use mission_control_core::{ActivityEvent, Alert, SummaryMetrics, TimeRange};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::schema::InputSchema;

/// One action a module exposes to the model, before prefixing.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionDeclaration {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

impl ActionDeclaration {
    pub fn new(name: &str, description: &str, input_schema: InputSchema) -> Self {
        Self { name: name.to_string(), description: description.to_string(), input_schema }
    }
}

/// A fully-qualified tool as handed to the model.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Result of running one action: a JSON value or a human-readable failure.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutcome {
    Success(Value),
    Error(String),
}

impl ToolOutcome {
    pub fn success<T: Serialize>(value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Self::Success(value),
            Err(error) => Self::Error(format!("failed to encode result: {error}")),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Serialized form returned to the model.
    pub fn into_payload(self) -> String {
        match self {
            Self::Success(value) => value.to_string(),
            Self::Error(message) => json!({ "error": message }).to_string(),
        }
    }
}

impl<T, E> From<Result<T, E>> for ToolOutcome
where
    T: Serialize,
    E: fmt::Display,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(error) => Self::error(error.to_string()),
        }
    }
}

/// Parses `(action, input)` into a module's serde-tagged action enum.
///
/// The enum is expected to use `#[serde(tag = "action", content = "input")]`.
/// A `null` input is treated as an empty object.
pub fn parse_action<A: DeserializeOwned>(action: &str, input: Value) -> Result<A, ToolOutcome> {
    let input = if input.is_null() { json!({}) } else { input };
    serde_json::from_value(json!({ "action": action, "input": input }))
        .map_err(|error| ToolOutcome::error(format!("Invalid input for {action}: {error}")))
}

/// Uniform adapter over one external backend.
#[async_trait]
pub trait CapabilityModule: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// Pure function of configuration; must not perform I/O.
    fn is_configured(&self) -> bool;
    fn actions(&self) -> &[ActionDeclaration];

    /// Runs a declared action. Callers go through [`CapabilityModule::execute_tool`].
    async fn execute(&self, action: &str, input: Value) -> ToolOutcome;

    async fn execute_tool(&self, action: &str, input: Value) -> String {
        if !self.actions().iter().any(|declared| declared.name == action) {
            return ToolOutcome::error(format!("Unknown tool: {action}")).into_payload();
        }
        self.execute(action, input).await.into_payload()
    }

    async fn activity_feed(&self, _range: &TimeRange) -> Vec<ActivityEvent> {
        Vec::new()
    }

    async fn summary_metrics(&self, _range: &TimeRange) -> SummaryMetrics {
        SummaryMetrics::new()
    }

    async fn alerts(&self, _range: &TimeRange) -> Vec<Alert> {
        Vec::new()
    }
}

/// Validated module identifier: lowercase ASCII letters, digits and `_`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleName(String);

impl ModuleName {
    pub fn parse(raw: &str) -> Result<Self, RegistryError> {
        let valid = !raw.is_empty()
            && raw.chars().all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
            && !raw.starts_with('_')
            && !raw.ends_with('_');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(RegistryError::InvalidModuleName(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn qualify(&self, action: &str) -> String {
        format!("{}_{action}", self.0)
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid module name `{0}`")]
    InvalidModuleName(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModuleSummary {
    pub name: String,
    pub description: String,
    pub actions: Vec<String>,
}

struct RegisteredModule {
    name: ModuleName,
    module: Arc<dyn CapabilityModule>,
}

/// Ordered table of configured modules and the single dispatch point for
/// tool calls.
#[derive(Default)]
pub struct ToolRegistry {
    modules: Vec<RegisteredModule>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("modules", &self.modules.iter().map(|m| m.name.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the module when it reports itself configured. Returns whether it
    /// was added. Re-registering a name replaces the earlier module in place.
    pub fn register<M>(&mut self, module: M) -> Result<bool, RegistryError>
    where
        M: CapabilityModule + 'static,
    {
        self.register_shared(Arc::new(module))
    }

    pub fn register_shared(
        &mut self,
        module: Arc<dyn CapabilityModule>,
    ) -> Result<bool, RegistryError> {
        let name = ModuleName::parse(module.name())?;
        if !module.is_configured() {
            debug!(
                event_name = "agent.registry.module_skipped",
                module = %name,
                "module is not configured; skipping registration"
            );
            return Ok(false);
        }

        match self.modules.iter_mut().find(|registered| registered.name == name) {
            Some(existing) => existing.module = module,
            None => self.modules.push(RegisteredModule { name, module }),
        }
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|registered| registered.name.as_str()).collect()
    }

    /// Every action of every module, prefixed, in registration then
    /// declaration order.
    pub fn tools(&self) -> Vec<ToolDefinition> {
        self.modules
            .iter()
            .flat_map(|registered| {
                registered.module.actions().iter().map(|action| ToolDefinition {
                    name: registered.name.qualify(&action.name),
                    description: action.description.clone(),
                    input_schema: action.input_schema.to_json(),
                })
            })
            .collect()
    }

    pub fn module_summaries(&self) -> Vec<ModuleSummary> {
        self.modules
            .iter()
            .map(|registered| ModuleSummary {
                name: registered.name.to_string(),
                description: registered.module.description().to_string(),
                actions: registered
                    .module
                    .actions()
                    .iter()
                    .map(|action| action.name.clone())
                    .collect(),
            })
            .collect()
    }

    /// Splits a fully-qualified tool name into its module and a declared
    /// action, preferring the longest registered module-name prefix.
    fn resolve<'a>(&'a self, qualified: &'a str) -> Option<(&'a RegisteredModule, &'a str)> {
        self.modules
            .iter()
            .filter_map(|registered| {
                qualified
                    .strip_prefix(registered.name.as_str())
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|action| (registered, action))
            })
            .filter(|(registered, action)| {
                registered.module.actions().iter().any(|declared| declared.name == *action)
            })
            .max_by_key(|(registered, _)| registered.name.as_str().len())
    }

    /// Total over all names: unknown tools produce an error payload.
    pub async fn execute_tool(&self, name: &str, input: Value) -> String {
        let Some((registered, action)) = self.resolve(name) else {
            warn!(event_name = "agent.tool.unknown", tool = name, "no module owns this tool");
            return ToolOutcome::error(format!("Unknown tool: {name}")).into_payload();
        };

        debug!(
            event_name = "agent.tool.dispatch",
            module = %registered.name,
            action,
            "dispatching tool call"
        );
        registered.module.execute_tool(action, input).await
    }

    pub async fn activity_feed(&self, range: &TimeRange) -> Vec<ActivityEvent> {
        let feeds = join_all(
            self.modules.iter().map(|registered| registered.module.activity_feed(range)),
        )
        .await;

        let mut events: Vec<ActivityEvent> = feeds.into_iter().flatten().collect();
        events.sort_by(|left, right| right.timestamp.cmp(&left.timestamp));
        events
    }

    pub async fn summary_metrics(&self, range: &TimeRange) -> BTreeMap<String, SummaryMetrics> {
        let metrics = join_all(
            self.modules.iter().map(|registered| registered.module.summary_metrics(range)),
        )
        .await;

        self.modules
            .iter()
            .map(|registered| registered.name.to_string())
            .zip(metrics)
            .collect()
    }

    pub async fn alerts(&self, range: &TimeRange) -> Vec<Alert> {
        join_all(self.modules.iter().map(|registered| registered.module.alerts(range)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use mission_control_core::{ActivityEvent, TimeRange};
    use serde::Deserialize;
    use serde_json::{json, Value};

    use super::test_support::StubModule;
    use super::{parse_action, ModuleName, RegistryError, ToolOutcome, ToolRegistry};

    fn range() -> TimeRange {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap_or_default();
        TimeRange::new(day, day)
    }

    fn event(id: &str, hour: u32) -> ActivityEvent {
        ActivityEvent {
            id: id.to_string(),
            source: "stub".to_string(),
            kind: "updated".to_string(),
            title: id.to_string(),
            description: None,
            actor: None,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).single().unwrap_or_default(),
            url: None,
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn tools_are_prefixed_in_registration_order() {
        let mut registry = ToolRegistry::new();
        assert_eq!(registry.register(StubModule::new("a", &["x", "y"])), Ok(true));
        assert_eq!(registry.register(StubModule::new("b", &["z"])), Ok(true));

        let names: Vec<String> = registry.tools().into_iter().map(|tool| tool.name).collect();
        assert_eq!(names, vec!["a_x", "a_y", "b_z"]);
    }

    #[test]
    fn unconfigured_modules_are_skipped() {
        let mut registry = ToolRegistry::new();
        assert_eq!(registry.register(StubModule::new("notion", &["search"]).unconfigured()), Ok(false));

        assert_eq!(registry.len(), 0);
        assert!(registry.tools().is_empty());
    }

    #[test]
    fn invalid_module_names_are_rejected() {
        let mut registry = ToolRegistry::new();
        let result = registry.register(StubModule::new("Bad-Name", &["x"]));

        assert_eq!(result, Err(RegistryError::InvalidModuleName("Bad-Name".to_string())));
        assert!(ModuleName::parse("slack_data").is_ok());
    }

    #[test]
    fn re_registration_replaces_in_place() {
        let mut registry = ToolRegistry::new();
        let _ = registry.register(StubModule::new("a", &["x"]));
        let _ = registry.register(StubModule::new("b", &["y"]));
        let _ = registry.register(StubModule::new("a", &["w"]));

        let names: Vec<String> = registry.tools().into_iter().map(|tool| tool.name).collect();
        assert_eq!(names, vec!["a_w", "b_y"]);
    }

    #[tokio::test]
    async fn execute_tool_dispatches_to_owning_module() {
        let mut registry = ToolRegistry::new();
        let _ = registry.register(StubModule::new("demo", &["ping"]));

        assert_eq!(registry.execute_tool("demo_ping", json!({})).await, "\"pong\"");
        assert_eq!(
            registry.execute_tool("demo_pong", json!({})).await,
            json!({ "error": "Unknown tool: demo_pong" }).to_string()
        );
    }

    #[tokio::test]
    async fn unknown_tool_names_return_error_payload() {
        let mut registry = ToolRegistry::new();
        let _ = registry.register(StubModule::new("demo", &["ping"]));

        for name in ["nonexistent_tool", "", "demo", "demo_", "demo_missing"] {
            let payload = registry.execute_tool(name, json!({})).await;
            let parsed: Value = serde_json::from_str(&payload).unwrap_or_default();
            assert!(
                parsed["error"].as_str().is_some_and(|m| m.starts_with("Unknown tool: ")),
                "expected unknown tool error for `{name}`, got {payload}"
            );
        }

        let payload = registry.execute_tool("nonexistent_tool", json!({})).await;
        assert_eq!(payload, json!({ "error": "Unknown tool: nonexistent_tool" }).to_string());
    }

    #[tokio::test]
    async fn longest_prefix_wins_when_module_names_overlap() {
        let mut registry = ToolRegistry::new();
        let _ = registry.register(StubModule::new("slack", &["data_search", "post"]));
        let _ = registry.register(StubModule::new("slack_data", &["search"]));

        let payload = registry.execute_tool("slack_data_search", json!({})).await;
        let parsed: Value = serde_json::from_str(&payload).unwrap_or_default();
        assert_eq!(parsed["module"], "slack_data");
        assert_eq!(parsed["action"], "search");

        let payload = registry.execute_tool("slack_post", json!({})).await;
        let parsed: Value = serde_json::from_str(&payload).unwrap_or_default();
        assert_eq!(parsed["module"], "slack");
    }

    #[tokio::test]
    async fn undeclared_action_reports_the_qualified_name() {
        let mut registry = ToolRegistry::new();
        let _ = registry.register(StubModule::new("slack", &["data_export"]));
        let _ = registry.register(StubModule::new("slack_data", &["search"]));

        let payload = registry.execute_tool("slack_data_export", json!({})).await;
        let parsed: Value = serde_json::from_str(&payload).unwrap_or_default();
        assert_eq!(parsed["module"], "slack");
        assert_eq!(parsed["action"], "data_export");

        assert_eq!(
            registry.execute_tool("slack_data_purge", json!({})).await,
            json!({ "error": "Unknown tool: slack_data_purge" }).to_string()
        );
    }

    #[tokio::test]
    async fn activity_feed_is_merged_newest_first() {
        let mut first = StubModule::new("a", &["x"]);
        first.events = vec![event("a-early", 1), event("a-late", 9)];
        let mut second = StubModule::new("b", &["y"]);
        second.events = vec![event("b-mid", 5)];

        let mut registry = ToolRegistry::new();
        let _ = registry.register(first);
        let _ = registry.register(second);

        let ids: Vec<String> =
            registry.activity_feed(&range()).await.into_iter().map(|event| event.id).collect();
        assert_eq!(ids, vec!["a-late", "b-mid", "a-early"]);
    }

    #[tokio::test]
    async fn summary_metrics_are_keyed_by_module() {
        let mut first = StubModule::new("a", &["x"]);
        first.metrics.insert("count".to_string(), 3);

        let mut registry = ToolRegistry::new();
        let _ = registry.register(first);
        let _ = registry.register(StubModule::new("b", &["y"]));

        let metrics = registry.summary_metrics(&range()).await;
        assert_eq!(metrics.get("a").and_then(|m| m.get("count")), Some(&3));
        assert!(metrics.get("b").is_some_and(|m| m.is_empty()));
    }

    #[derive(Debug, Deserialize)]
    #[serde(tag = "action", content = "input", rename_all = "snake_case")]
    enum DemoAction {
        Greet(GreetInput),
    }

    #[derive(Debug, Deserialize)]
    struct GreetInput {
        name: String,
    }

    #[test]
    fn parse_action_reports_missing_fields() {
        let parsed: Result<DemoAction, ToolOutcome> = parse_action("greet", json!({"name": "Ada"}));
        assert!(matches!(parsed, Ok(DemoAction::Greet(GreetInput { ref name })) if name == "Ada"));

        let missing: Result<DemoAction, ToolOutcome> = parse_action("greet", json!({}));
        match missing {
            Err(ToolOutcome::Error(message)) => {
                assert!(message.starts_with("Invalid input for greet"));
                assert!(message.contains("name"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn outcome_payloads_are_json() {
        assert_eq!(ToolOutcome::error("boom").into_payload(), r#"{"error":"boom"}"#);
        assert_eq!(ToolOutcome::success(json!({"id": 1})).into_payload(), r#"{"id":1}"#);
    }
}
