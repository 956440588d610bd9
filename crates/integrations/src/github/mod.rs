mod client;
mod reads;

use async_trait::async_trait;
use mission_control_agent::{
    parse_action, ActionDeclaration, CapabilityModule, FieldKind, InputSchema, ToolOutcome,
};
use mission_control_core::config::GithubConfig;
use mission_control_core::{ActivityEvent, SummaryMetrics, TimeRange};
use serde::Deserialize;
use serde_json::Value;

pub use client::{
    CommitSummary, GithubClient, IssueSummary, PullRequestDetail, PullRequestSummary, RepoName,
    SearchHit, StateFilter, GITHUB_API_URL,
};

use crate::common::{degrade, flexible_i64, flexible_opt_i64};
use crate::fetch::FetchError;
use crate::IntegrationContext;

const MODULE: &str = "github";

#[derive(Debug, Deserialize)]
#[serde(tag = "action", content = "input", rename_all = "snake_case")]
enum GithubAction {
    ListPrs(ListInput),
    GetPr(GetPrInput),
    ListIssues(ListInput),
    SearchIssues(SearchInput),
    RecentCommits(CommitsInput),
}

#[derive(Debug, Deserialize)]
struct ListInput {
    #[serde(default)]
    repo: Option<String>,
    #[serde(default)]
    state: StateFilter,
    #[serde(default)]
    labels: Option<String>,
    #[serde(default, deserialize_with = "flexible_opt_i64")]
    per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GetPrInput {
    #[serde(default)]
    repo: Option<String>,
    #[serde(deserialize_with = "flexible_i64")]
    pr_number: i64,
}

#[derive(Debug, Deserialize)]
struct SearchInput {
    query: String,
    #[serde(default, deserialize_with = "flexible_opt_i64")]
    per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CommitsInput {
    #[serde(default)]
    repo: Option<String>,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default, deserialize_with = "flexible_opt_i64")]
    per_page: Option<i64>,
}

fn page_hint(value: Option<i64>) -> Option<u32> {
    value.map(|value| u32::try_from(value.max(1)).unwrap_or(u32::MAX))
}

/// Pull requests, issues and commits across the configured repositories.
pub struct GithubModule {
    client: Option<GithubClient>,
    actions: Vec<ActionDeclaration>,
}

impl GithubModule {
    pub fn from_config(config: &GithubConfig, context: &IntegrationContext) -> Result<Self, FetchError> {
        Self::with_base_url(config, context, GITHUB_API_URL)
    }

    pub fn with_base_url(
        config: &GithubConfig,
        context: &IntegrationContext,
        base_url: &str,
    ) -> Result<Self, FetchError> {
        let client = config
            .token
            .as_ref()
            .map(|token| {
                GithubClient::new(token, base_url, context, config.repos.clone(), config.org.clone())
            })
            .transpose()?;
        Ok(Self { client, actions: declarations() })
    }

    async fn run(client: &GithubClient, action: GithubAction) -> Result<Value, FetchError> {
        match action {
            GithubAction::ListPrs(input) => {
                let repo = client.resolve_repo(input.repo.as_deref())?;
                let pulls = client.list_prs(&repo, input.state, page_hint(input.per_page)).await?;
                to_value(pulls)
            }
            GithubAction::GetPr(input) => {
                let repo = client.resolve_repo(input.repo.as_deref())?;
                let number = u64::try_from(input.pr_number)
                    .map_err(|_| FetchError::Invalid(format!("Invalid pr_number {}", input.pr_number)))?;
                to_value(client.get_pr(&repo, number).await?)
            }
            GithubAction::ListIssues(input) => {
                let repo = client.resolve_repo(input.repo.as_deref())?;
                let issues = client
                    .list_issues(&repo, input.state, input.labels.as_deref(), page_hint(input.per_page))
                    .await?;
                to_value(issues)
            }
            GithubAction::SearchIssues(input) => {
                to_value(client.search_issues(&input.query, page_hint(input.per_page)).await?)
            }
            GithubAction::RecentCommits(input) => {
                let repo = client.resolve_repo(input.repo.as_deref())?;
                let commits = client
                    .recent_commits(&repo, input.branch.as_deref(), page_hint(input.per_page))
                    .await?;
                to_value(commits)
            }
        }
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, FetchError> {
    serde_json::to_value(value).map_err(|error| FetchError::Decode(error.to_string()))
}

fn states() -> FieldKind {
    FieldKind::one_of(["open", "closed", "all"])
}

fn declarations() -> Vec<ActionDeclaration> {
    vec![
        ActionDeclaration::new(
            "list_prs",
            "List pull requests for a GitHub repository. Returns title, author, status, branch, and URL.",
            InputSchema::new()
                .optional(
                    "repo",
                    FieldKind::String,
                    "Repository in \"owner/repo\" format. Omit to use the default repo (if only one is configured).",
                )
                .optional("state", states(), "PR state filter (default: open)")
                .optional("per_page", FieldKind::Number, "Number of results to return (default: 20, max: 100)"),
        ),
        ActionDeclaration::new(
            "get_pr",
            "Get detailed information about a specific pull request, including diff stats, reviewers, and description.",
            InputSchema::new()
                .optional("repo", FieldKind::String, "Repository in \"owner/repo\" format.")
                .required("pr_number", FieldKind::Number, "The pull request number"),
        ),
        ActionDeclaration::new(
            "list_issues",
            "List issues (not pull requests) for a GitHub repository.",
            InputSchema::new()
                .optional("repo", FieldKind::String, "Repository in \"owner/repo\" format. Omit to use the default repo.")
                .optional("state", states(), "Issue state filter (default: open)")
                .optional("labels", FieldKind::String, "Comma-separated list of label names to filter by")
                .optional("per_page", FieldKind::Number, "Number of results (default: 20)"),
        ),
        ActionDeclaration::new(
            "search_issues",
            "Search issues and pull requests across all configured repos using GitHub search syntax (e.g. \"is:pr is:merged author:username\", \"label:bug is:open\").",
            InputSchema::new()
                .required("query", FieldKind::String, "GitHub search query. Repo scope is added automatically.")
                .optional("per_page", FieldKind::Number, "Number of results (default: 20)"),
        ),
        ActionDeclaration::new(
            "recent_commits",
            "List recent commits on a branch. Shows commit message, author, and date.",
            InputSchema::new()
                .optional("repo", FieldKind::String, "Repository in \"owner/repo\" format.")
                .optional("branch", FieldKind::String, "Branch name (default: repo's default branch)")
                .optional("per_page", FieldKind::Number, "Number of commits (default: 20)"),
        ),
    ]
}

#[async_trait]
impl CapabilityModule for GithubModule {
    fn name(&self) -> &str {
        MODULE
    }

    fn description(&self) -> &str {
        "GitHub: list and search pull requests, issues and commits across configured repositories."
    }

    fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    fn actions(&self) -> &[ActionDeclaration] {
        &self.actions
    }

    async fn execute(&self, action: &str, input: Value) -> ToolOutcome {
        let Some(client) = &self.client else {
            return ToolOutcome::error("GitHub not configured");
        };
        match parse_action::<GithubAction>(action, input) {
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
