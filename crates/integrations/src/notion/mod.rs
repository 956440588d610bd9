mod client;
mod reads;

use async_trait::async_trait;
use mission_control_agent::{
    parse_action, ActionDeclaration, CapabilityModule, FieldKind, InputSchema, ToolOutcome,
};
use mission_control_core::config::NotionConfig;
use mission_control_core::{ActivityEvent, SummaryMetrics, TimeRange};
use serde::Deserialize;
use serde_json::Value;

pub use client::{
    normalize_id, simplify_property, DatabaseRow, NotionClient, ObjectKind, PageDetail,
    PageSummary, NOTION_API_URL,
};

use crate::common::{degrade, flexible_opt_i64};
use crate::fetch::FetchError;
use crate::IntegrationContext;

const MODULE: &str = "notion";
const DEFAULT_SEARCH_SIZE: u32 = 20;
const DEFAULT_QUERY_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", content = "input", rename_all = "snake_case")]
enum NotionAction {
    Search(SearchInput),
    GetPage(PageInput),
    QueryDatabase(QueryInput),
}

#[derive(Debug, Deserialize)]
struct SearchInput {
    query: String,
    #[serde(default, deserialize_with = "flexible_opt_i64")]
    page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PageInput {
    page_id: String,
}

#[derive(Debug, Deserialize)]
struct QueryInput {
    database_id: String,
    #[serde(default, deserialize_with = "flexible_opt_i64")]
    page_size: Option<i64>,
    #[serde(default)]
    filter: Option<Value>,
}

fn page_size(requested: Option<i64>, default: u32) -> u32 {
    requested
        .map(|size| u32::try_from(size.clamp(1, i64::from(MAX_PAGE_SIZE))).unwrap_or(default))
        .unwrap_or(default)
}

pub struct NotionModule {
    client: Option<NotionClient>,
    actions: Vec<ActionDeclaration>,
}

impl NotionModule {
    pub fn from_config(config: &NotionConfig, context: &IntegrationContext) -> Result<Self, FetchError> {
        Self::with_base_url(config, context, NOTION_API_URL)
    }

    pub fn with_base_url(
        config: &NotionConfig,
        context: &IntegrationContext,
        base_url: &str,
    ) -> Result<Self, FetchError> {
        let client = config
            .token
            .as_ref()
            .map(|token| NotionClient::new(token, base_url, context, &config.allowed_databases))
            .transpose()?;
        Ok(Self { client, actions: declarations() })
    }

    async fn run(client: &NotionClient, action: NotionAction) -> Result<Value, FetchError> {
        let value = match action {
            NotionAction::Search(input) => serde_json::to_value(
                client.search(&input.query, page_size(input.page_size, DEFAULT_SEARCH_SIZE)).await?,
            ),
            NotionAction::GetPage(input) => serde_json::to_value(client.get_page(&input.page_id).await?),
            NotionAction::QueryDatabase(input) => serde_json::to_value(
                client
                    .query_database(
                        &input.database_id,
                        page_size(input.page_size, DEFAULT_QUERY_SIZE),
                        input.filter,
                    )
                    .await?,
            ),
        };
        value.map_err(|error| FetchError::Decode(error.to_string()))
    }
}

fn declarations() -> Vec<ActionDeclaration> {
    vec![
        ActionDeclaration::new(
            "search",
            "Search Notion for pages and databases by text. Returns titles, URLs, and last edited times.",
            InputSchema::new()
                .required("query", FieldKind::String, "Search text")
                .optional("page_size", FieldKind::Number, "Number of results (default: 20)"),
        ),
        ActionDeclaration::new(
            "get_page",
            "Get a Notion page's properties. Returns simplified key-value properties, not raw Notion objects.",
            InputSchema::new().required("page_id", FieldKind::String, "The Notion page ID (UUID format)"),
        ),
        ActionDeclaration::new(
            "query_database",
            "Query a Notion database. Returns rows with simplified properties. Use filters to narrow results.",
            InputSchema::new()
                .required("database_id", FieldKind::String, "The Notion database ID (UUID format)")
                .optional("page_size", FieldKind::Number, "Number of rows to return (default: 50)")
                .optional("filter", FieldKind::Object, "Notion filter object"),
        ),
    ]
}

#[async_trait]
impl CapabilityModule for NotionModule {
    fn name(&self) -> &str {
        MODULE
    }

    fn description(&self) -> &str {
        "Notion: search pages, view page properties and query databases."
    }

    fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    fn actions(&self) -> &[ActionDeclaration] {
        &self.actions
    }

    async fn execute(&self, action: &str, input: Value) -> ToolOutcome {
        let Some(client) = &self.client else {
            return ToolOutcome::error("Notion not configured");
        };
        match parse_action::<NotionAction>(action, input) {
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
        degrade(MODULE, "summary_metrics", reads::summary_metrics(client, range).await)
    }
}
