mod client;
mod reads;

use async_trait::async_trait;
use chrono::Utc;
use mission_control_agent::{
    parse_action, ActionDeclaration, CapabilityModule, FieldKind, InputSchema, ToolOutcome,
};
use mission_control_core::config::ShortcutConfig;
use mission_control_core::{ActivityEvent, Alert, SummaryMetrics, TimeRange};
use serde::Deserialize;
use serde_json::Value;

pub use client::{
    CreateStory, ShortcutClient, StoryDefaults, StoryType, UpdateStory, SHORTCUT_API_URL,
};

use crate::common::{degrade, flexible_i64, NoInput};
use crate::fetch::FetchError;
use crate::IntegrationContext;

const MODULE: &str = "shortcut";

#[derive(Debug, Deserialize)]
#[serde(tag = "action", content = "input", rename_all = "snake_case")]
enum ShortcutAction {
    CreateStory(CreateStory),
    UpdateStory(UpdateStory),
    GetStory(StoryRef),
    SearchStories(SearchQuery),
    AddComment(NewComment),
    ListMembers(NoInput),
    ListWorkflowStates(NoInput),
    ListLabels(NoInput),
    ListProjects(NoInput),
}

#[derive(Debug, Deserialize)]
struct StoryRef {
    #[serde(deserialize_with = "flexible_i64")]
    story_id: i64,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    query: String,
}

#[derive(Debug, Deserialize)]
struct NewComment {
    #[serde(deserialize_with = "flexible_i64")]
    story_id: i64,
    text: String,
}

/// Story tracking on Shortcut.
pub struct ShortcutModule {
    client: Option<ShortcutClient>,
    workflow_name: Option<String>,
    actions: Vec<ActionDeclaration>,
}

impl ShortcutModule {
    pub fn from_config(
        config: &ShortcutConfig,
        context: &IntegrationContext,
    ) -> Result<Self, FetchError> {
        Self::with_base_url(config, context, SHORTCUT_API_URL)
    }

    pub fn with_base_url(
        config: &ShortcutConfig,
        context: &IntegrationContext,
        base_url: &str,
    ) -> Result<Self, FetchError> {
        let defaults = StoryDefaults {
            project_id: config.default_project_id,
            workflow_state_id: config.default_workflow_state_id,
        };
        let client = config
            .api_token
            .as_ref()
            .map(|token| ShortcutClient::new(token, base_url, context, defaults))
            .transpose()?;
        Ok(Self { client, workflow_name: config.workflow_name.clone(), actions: declarations() })
    }

    async fn run(client: &ShortcutClient, action: ShortcutAction) -> Result<Value, FetchError> {
        match action {
            ShortcutAction::CreateStory(story) => client.create_story(story).await,
            ShortcutAction::UpdateStory(update) => client.update_story(update).await,
            ShortcutAction::GetStory(story) => client.get_story(story.story_id).await,
            ShortcutAction::SearchStories(search) => client.search_stories(&search.query).await,
            ShortcutAction::AddComment(comment) => {
                client.add_comment(comment.story_id, &comment.text).await
            }
            ShortcutAction::ListMembers(_) => client.list_members().await,
            ShortcutAction::ListWorkflowStates(_) => client.list_workflows().await,
            ShortcutAction::ListLabels(_) => client.list_labels().await,
            ShortcutAction::ListProjects(_) => client.list_projects().await,
        }
    }
}

fn story_types() -> FieldKind {
    FieldKind::one_of(["feature", "bug", "chore"])
}

fn declarations() -> Vec<ActionDeclaration> {
    vec![
        ActionDeclaration::new(
            "create_story",
            "Create a new story in Shortcut. Returns the created story with its ID and URL.",
            InputSchema::new()
                .required("name", FieldKind::String, "Story title (start with a verb)")
                .optional(
                    "description",
                    FieldKind::String,
                    "Story description in Markdown. Include {{SLACK_THREAD_URL}} placeholder for Slack link.",
                )
                .optional("story_type", story_types(), "Story type (default: feature)")
                .optional("labels", FieldKind::array_of(FieldKind::String), "Label names to apply")
                .optional("owner_ids", FieldKind::array_of(FieldKind::String), "UUIDs of story owners")
                .optional(
                    "workflow_state_id",
                    FieldKind::Number,
                    "Workflow state ID (use shortcut_list_workflow_states to find)",
                )
                .optional("project_id", FieldKind::Number, "Project ID (use shortcut_list_projects to find)")
                .optional("estimate", FieldKind::Number, "Point estimate (1, 2, 3, 5, 8)"),
        ),
        ActionDeclaration::new(
            "update_story",
            "Update an existing story in Shortcut. Can change any field.",
            InputSchema::new()
                .required("story_id", FieldKind::Number, "The story ID to update")
                .optional("name", FieldKind::String, "New story title")
                .optional("description", FieldKind::String, "New description")
                .optional("story_type", story_types(), "")
                .optional("owner_ids", FieldKind::array_of(FieldKind::String), "New owner UUIDs")
                .optional("workflow_state_id", FieldKind::Number, "New workflow state ID")
                .optional("estimate", FieldKind::Number, "New estimate")
                .optional("labels", FieldKind::array_of(FieldKind::String), "Label names to set"),
        ),
        ActionDeclaration::new(
            "get_story",
            "Get full details of a Shortcut story by ID.",
            InputSchema::new().required("story_id", FieldKind::Number, "The story ID"),
        ),
        ActionDeclaration::new(
            "search_stories",
            "Search for stories in Shortcut. Uses Shortcut query syntax (e.g. type:feature, state:\"In Progress\", owner:name).",
            InputSchema::new().required("query", FieldKind::String, "Search query using Shortcut syntax"),
        ),
        ActionDeclaration::new(
            "add_comment",
            "Add a comment to a Shortcut story.",
            InputSchema::new()
                .required("story_id", FieldKind::Number, "The story ID")
                .required("text", FieldKind::String, "Comment text in Markdown"),
        ),
        ActionDeclaration::new(
            "list_members",
            "List all workspace members. Use this to resolve names to UUIDs for owner assignment.",
            InputSchema::new(),
        ),
        ActionDeclaration::new(
            "list_workflow_states",
            "List all workflows and their states. Use this to find workflow_state_id values for status changes.",
            InputSchema::new(),
        ),
        ActionDeclaration::new("list_labels", "List all available labels in the workspace.", InputSchema::new()),
        ActionDeclaration::new("list_projects", "List all projects in the workspace.", InputSchema::new()),
    ]
}

#[async_trait]
impl CapabilityModule for ShortcutModule {
    fn name(&self) -> &str {
        MODULE
    }

    fn description(&self) -> &str {
        "Shortcut project management: create, update and search stories; manage workflows, members, labels and projects."
    }

    fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    fn actions(&self) -> &[ActionDeclaration] {
        &self.actions
    }

    async fn execute(&self, action: &str, input: Value) -> ToolOutcome {
        let Some(client) = &self.client else {
            return ToolOutcome::error("Shortcut not configured");
        };
        match parse_action::<ShortcutAction>(action, input) {
            Ok(parsed) => Self::run(client, parsed).await.into(),
            Err(outcome) => outcome,
        }
    }

    async fn activity_feed(&self, range: &TimeRange) -> Vec<ActivityEvent> {
        let Some(client) = &self.client else {
            return Vec::new();
        };
        degrade(MODULE, "activity_feed", reads::activity_feed(client, range).await)
    }

    async fn summary_metrics(&self, range: &TimeRange) -> SummaryMetrics {
        let Some(client) = &self.client else {
            return SummaryMetrics::new();
        };
        let result =
            reads::summary_metrics(client, range, self.workflow_name.as_deref(), Utc::now()).await;
        degrade(MODULE, "summary_metrics", result)
    }

    async fn alerts(&self, _range: &TimeRange) -> Vec<Alert> {
        let Some(client) = &self.client else {
            return Vec::new();
        };
        let result = reads::alerts(client, self.workflow_name.as_deref(), Utc::now()).await;
        degrade(MODULE, "alerts", result)
    }
}
