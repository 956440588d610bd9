//! Read access to the workspace's own Slack messages.
//!
//! Needs the `search:read` scope on the bot token, so it stays off unless
//! `slack.data_enabled` is set.

mod client;
mod reads;

use async_trait::async_trait;
use mission_control_agent::{
    parse_action, ActionDeclaration, CapabilityModule, FieldKind, InputSchema, ToolOutcome,
};
use mission_control_core::config::SlackConfig;
use mission_control_core::{ActivityEvent, SummaryMetrics, TimeRange};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;

pub use client::{
    parse_slack_ts, validate_channel_id, ChannelMessage, SearchMatch, SearchResults, SlackApi,
    SlackDataClient, SLACK_API_URL,
};

use crate::common::{degrade, flexible_opt_i64};
use crate::fetch::FetchError;
use crate::IntegrationContext;

const MODULE: &str = "slack_data";

#[derive(Debug, Deserialize)]
#[serde(tag = "action", content = "input", rename_all = "snake_case")]
enum SlackDataAction {
    SearchMessages(SearchInput),
    GetChannelHistory(HistoryInput),
}

#[derive(Debug, Deserialize)]
struct SearchInput {
    query: String,
    #[serde(default, deserialize_with = "flexible_opt_i64")]
    count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct HistoryInput {
    channel: String,
    #[serde(default, deserialize_with = "flexible_opt_i64")]
    limit: Option<i64>,
}

fn bounded(requested: Option<i64>, default: u32, max: u32) -> u32 {
    requested
        .and_then(|value| u32::try_from(value.clamp(1, i64::from(max))).ok())
        .unwrap_or(default)
}

pub struct SlackDataModule {
    client: Option<SlackDataClient>,
    actions: Vec<ActionDeclaration>,
}

impl SlackDataModule {
    pub fn from_config(config: &SlackConfig, context: &IntegrationContext) -> Result<Self, FetchError> {
        Self::with_base_url(config, context, SLACK_API_URL)
    }

    pub fn with_base_url(
        config: &SlackConfig,
        context: &IntegrationContext,
        base_url: &str,
    ) -> Result<Self, FetchError> {
        let enabled = config.data_enabled && !config.bot_token.expose_secret().trim().is_empty();
        let client = if enabled {
            Some(SlackDataClient::new(SlackApi::new(&config.bot_token, base_url, context)?))
        } else {
            None
        };
        Ok(Self { client, actions: declarations() })
    }

    async fn run(client: &SlackDataClient, action: SlackDataAction) -> Result<Value, FetchError> {
        let value = match action {
            SlackDataAction::SearchMessages(input) => {
                let results = client.search_messages(&input.query, bounded(input.count, 20, 100)).await?;
                serde_json::to_value(results.matches)
            }
            SlackDataAction::GetChannelHistory(input) => serde_json::to_value(
                client.channel_history(&input.channel, bounded(input.limit, 50, 1000)).await?,
            ),
        };
        value.map_err(|error| FetchError::Decode(error.to_string()))
    }
}

fn declarations() -> Vec<ActionDeclaration> {
    vec![
        ActionDeclaration::new(
            "search_messages",
            "Search Slack messages across all channels. Returns matching messages with channel, author, text, and permalink.",
            InputSchema::new()
                .required(
                    "query",
                    FieldKind::String,
                    "Search query. Supports Slack search syntax: \"in:#channel\", \"from:@user\", \"has:link\", date ranges, etc.",
                )
                .optional("count", FieldKind::Number, "Number of results (default: 20)"),
        ),
        ActionDeclaration::new(
            "get_channel_history",
            "Get recent messages from a Slack channel. Returns messages with author, text, timestamp, and thread info.",
            InputSchema::new()
                .required("channel", FieldKind::String, "Channel ID (e.g., C01ABCDEF)")
                .optional("limit", FieldKind::Number, "Number of messages (default: 50)"),
        ),
    ]
}

#[async_trait]
impl CapabilityModule for SlackDataModule {
    fn name(&self) -> &str {
        MODULE
    }

    fn description(&self) -> &str {
        "Slack: search messages across channels and view channel history."
    }

    fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    fn actions(&self) -> &[ActionDeclaration] {
        &self.actions
    }

    async fn execute(&self, action: &str, input: Value) -> ToolOutcome {
        let Some(client) = &self.client else {
            return ToolOutcome::error("Slack data not configured");
        };
        match parse_action::<SlackDataAction>(action, input) {
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
