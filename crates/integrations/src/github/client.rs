use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::decode;
use crate::fetch::{ApiRequest, FetchError, RestClient};
use crate::IntegrationContext;

pub const GITHUB_API_URL: &str = "https://api.github.com";
const REPOSITORY_URL_PREFIX: &str = "https://api.github.com/repos/";
const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

/// `owner/repo`, validated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoName {
    pub owner: String,
    pub name: String,
}

impl RepoName {
    pub fn parse(raw: &str) -> Result<Self, FetchError> {
        let mut parts = raw.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
                Ok(Self { owner: owner.to_string(), name: name.to_string() })
            }
            _ => Err(FetchError::Invalid(format!(
                "Invalid repo format \"{raw}\". Expected \"owner/repo\"."
            ))),
        }
    }

    fn path(&self, tail: &str) -> String {
        format!("/repos/{}/{}{tail}", self.owner, self.name)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateFilter {
    #[default]
    Open,
    Closed,
    All,
}

impl StateFilter {
    fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireUser {
    login: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireLabel {
    Name(String),
    Object {
        #[serde(default)]
        name: Option<String>,
    },
}

impl WireLabel {
    fn into_name(self) -> String {
        match self {
            Self::Name(name) => name,
            Self::Object { name } => name.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireBranch {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct WirePull {
    number: u64,
    title: String,
    state: String,
    #[serde(default)]
    user: Option<WireUser>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    draft: Option<bool>,
    #[serde(default)]
    labels: Vec<WireLabel>,
    head: WireBranch,
    base: WireBranch,
    html_url: String,
    #[serde(default)]
    merged: Option<bool>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    additions: Option<u64>,
    #[serde(default)]
    deletions: Option<u64>,
    #[serde(default)]
    changed_files: Option<u64>,
    #[serde(default)]
    commits: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireReview {
    #[serde(default)]
    user: Option<WireUser>,
}

#[derive(Debug, Deserialize)]
struct WireIssue {
    number: u64,
    title: String,
    state: String,
    #[serde(default)]
    user: Option<WireUser>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    labels: Vec<WireLabel>,
    #[serde(default)]
    assignees: Vec<WireUser>,
    html_url: String,
    #[serde(default)]
    pull_request: Option<Value>,
    #[serde(default)]
    repository_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireSearch {
    #[serde(default)]
    items: Vec<WireIssue>,
}

#[derive(Debug, Deserialize)]
struct WireCommitAuthor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCommitBody {
    message: String,
    #[serde(default)]
    author: Option<WireCommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct WireCommit {
    sha: String,
    commit: WireCommitBody,
    #[serde(default)]
    author: Option<WireUser>,
    html_url: String,
}

fn login(user: Option<WireUser>) -> String {
    user.map(|user| user.login).unwrap_or_else(|| "unknown".to_string())
}

fn label_names(labels: Vec<WireLabel>) -> Vec<String> {
    labels.into_iter().map(WireLabel::into_name).collect()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PullRequestSummary {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub user: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub draft: bool,
    pub labels: Vec<String>,
    pub head_branch: String,
    pub base_branch: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PullRequestDetail {
    #[serde(flatten)]
    pub summary: PullRequestSummary,
    pub body: String,
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
    pub commits: u64,
    pub reviewers: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IssueSummary {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub user: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub issue: IssueSummary,
    pub repo: String,
    pub is_pr: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommitSummary {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub date: String,
    pub url: String,
}

impl From<WirePull> for PullRequestSummary {
    fn from(pull: WirePull) -> Self {
        let merged = pull.merged.unwrap_or(false);
        Self {
            number: pull.number,
            title: pull.title,
            state: if merged { "merged".to_string() } else { pull.state },
            user: login(pull.user),
            created_at: pull.created_at,
            updated_at: pull.updated_at,
            merged_at: pull.merged_at,
            draft: pull.draft.unwrap_or(false),
            labels: label_names(pull.labels),
            head_branch: pull.head.name,
            base_branch: pull.base.name,
            url: pull.html_url,
        }
    }
}

impl WireIssue {
    fn into_hit(self) -> SearchHit {
        let repo = self
            .repository_url
            .as_deref()
            .map(|url| url.strip_prefix(REPOSITORY_URL_PREFIX).unwrap_or(url).to_string())
            .unwrap_or_default();
        let is_pr = self.pull_request.is_some();
        SearchHit { issue: self.into_summary(), repo, is_pr }
    }

    fn into_summary(self) -> IssueSummary {
        IssueSummary {
            number: self.number,
            title: self.title,
            state: self.state,
            user: login(self.user),
            created_at: self.created_at,
            updated_at: self.updated_at,
            closed_at: self.closed_at,
            labels: label_names(self.labels),
            assignees: self.assignees.into_iter().map(|user| user.login).collect(),
            url: self.html_url,
        }
    }
}

fn per_page(requested: Option<u32>) -> u32 {
    requested.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
}

#[derive(Clone, Debug)]
pub struct GithubClient {
    rest: RestClient,
    repos: Vec<String>,
    org: Option<String>,
}

impl GithubClient {
    pub fn new(
        token: &SecretString,
        base_url: &str,
        context: &IntegrationContext,
        repos: Vec<String>,
        org: Option<String>,
    ) -> Result<Self, FetchError> {
        let rest = RestClient::new(base_url, context.policy.clone(), context.cache.clone())?
            .with_bearer(token)?
            .with_header("accept", "application/vnd.github+json")?
            .with_header("x-github-api-version", "2022-11-28")?;
        Ok(Self { rest, repos, org: org.filter(|org| !org.trim().is_empty()) })
    }

    pub fn allowed_repos(&self) -> &[String] {
        &self.repos
    }

    /// The named repo, or the only configured one when none is named.
    pub fn resolve_repo(&self, repo: Option<&str>) -> Result<RepoName, FetchError> {
        let repo = match (repo.filter(|repo| !repo.is_empty()), self.repos.as_slice()) {
            (Some(repo), _) => repo,
            (None, [only]) => only.as_str(),
            (None, repos) => {
                return Err(FetchError::Invalid(format!(
                    "No repo specified. Available repos: {}",
                    repos.join(", ")
                )))
            }
        };

        if !self.repos.is_empty() && !self.repos.iter().any(|allowed| allowed == repo) {
            return Err(FetchError::Invalid(format!(
                "Repository \"{repo}\" is not in the allowed list. Allowed: {}",
                self.repos.join(", ")
            )));
        }
        RepoName::parse(repo)
    }

    pub async fn list_prs(
        &self,
        repo: &RepoName,
        state: StateFilter,
        per_page_hint: Option<u32>,
    ) -> Result<Vec<PullRequestSummary>, FetchError> {
        let request = ApiRequest::get(repo.path("/pulls"))
            .query("state", state.as_str())
            .query("per_page", per_page(per_page_hint))
            .query("sort", "updated")
            .query("direction", "desc");
        let pulls: Vec<WirePull> = decode(self.rest.send(request).await?)?;
        Ok(pulls.into_iter().map(PullRequestSummary::from).collect())
    }

    pub async fn get_pr(&self, repo: &RepoName, number: u64) -> Result<PullRequestDetail, FetchError> {
        let (pull, reviews) = futures::try_join!(
            self.rest.send(ApiRequest::get(repo.path(&format!("/pulls/{number}")))),
            self.rest.send(ApiRequest::get(repo.path(&format!("/pulls/{number}/reviews")))),
        )?;
        let pull: WirePull = decode(pull)?;
        let reviews: Vec<WireReview> = decode(reviews)?;

        let mut reviewers: Vec<String> = Vec::new();
        for login in reviews.into_iter().filter_map(|review| review.user.map(|user| user.login)) {
            if !reviewers.contains(&login) {
                reviewers.push(login);
            }
        }

        let body = pull.body.clone().unwrap_or_default();
        let (additions, deletions, changed_files, commits) = (
            pull.additions.unwrap_or(0),
            pull.deletions.unwrap_or(0),
            pull.changed_files.unwrap_or(0),
            pull.commits.unwrap_or(0),
        );
        Ok(PullRequestDetail {
            summary: pull.into(),
            body,
            additions,
            deletions,
            changed_files,
            commits,
            reviewers,
        })
    }

    pub async fn list_issues(
        &self,
        repo: &RepoName,
        state: StateFilter,
        labels: Option<&str>,
        per_page_hint: Option<u32>,
    ) -> Result<Vec<IssueSummary>, FetchError> {
        let request = ApiRequest::get(repo.path("/issues"))
            .query("state", state.as_str())
            .query_opt("labels", labels.filter(|labels| !labels.is_empty()))
            .query("per_page", per_page(per_page_hint))
            .query("sort", "updated")
            .query("direction", "desc");
        let issues: Vec<WireIssue> = decode(self.rest.send(request).await?)?;
        Ok(issues
            .into_iter()
            .filter(|issue| issue.pull_request.is_none())
            .map(WireIssue::into_summary)
            .collect())
    }

    /// Search scoped to the allowed repos, else to the org, else unscoped.
    pub async fn search_issues(
        &self,
        query: &str,
        per_page_hint: Option<u32>,
    ) -> Result<Vec<SearchHit>, FetchError> {
        let scoped = if !self.repos.is_empty() {
            let filters: Vec<String> = self.repos.iter().map(|repo| format!("repo:{repo}")).collect();
            format!("{} {query}", filters.join(" "))
        } else if let Some(org) = &self.org {
            format!("org:{org} {query}")
        } else {
            query.to_string()
        };
        self.search_raw(&scoped, per_page(per_page_hint)).await
    }

    pub(crate) async fn search_raw(&self, query: &str, per_page: u32) -> Result<Vec<SearchHit>, FetchError> {
        let request = ApiRequest::get("/search/issues")
            .query("q", query)
            .query("per_page", per_page)
            .query("sort", "updated")
            .query("order", "desc");
        let search: WireSearch = decode(self.rest.send(request).await?)?;
        Ok(search.items.into_iter().map(WireIssue::into_hit).collect())
    }

    pub async fn recent_commits(
        &self,
        repo: &RepoName,
        branch: Option<&str>,
        per_page_hint: Option<u32>,
    ) -> Result<Vec<CommitSummary>, FetchError> {
        let request = ApiRequest::get(repo.path("/commits"))
            .query_opt("sha", branch.filter(|branch| !branch.is_empty()))
            .query("per_page", per_page(per_page_hint));
        let commits: Vec<WireCommit> = decode(self.rest.send(request).await?)?;
        Ok(commits
            .into_iter()
            .map(|commit| {
                let author_name = commit.commit.author.as_ref().and_then(|author| author.name.clone());
                CommitSummary {
                    sha: commit.sha.chars().take(7).collect(),
                    message: commit.commit.message.lines().next().unwrap_or_default().to_string(),
                    author: commit
                        .author
                        .map(|user| user.login)
                        .or(author_name)
                        .unwrap_or_else(|| "unknown".to_string()),
                    date: commit.commit.author.and_then(|author| author.date).unwrap_or_default(),
                    url: commit.html_url,
                }
            })
            .collect())
    }
}
