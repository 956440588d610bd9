//! Dashboard reads over Shortcut stories.
//!
//! "Active" means a story sits in a workflow state of type `started`,
//! optionally restricted to one named workflow.

use chrono::{DateTime, Duration, Utc};
use futures::future::try_join_all;
use mission_control_core::{
    ActivityEvent, Alert, AlertItem, AlertSeverity, SummaryMetrics, TimeRange,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::client::ShortcutClient;
use crate::common::decode;
use crate::fetch::FetchError;

const STUCK_METRIC_DAYS: i64 = 5;
const STUCK_ALERT_DAYS: i64 = 7;

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct StoryRecord {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub story_type: Option<String>,
    #[serde(default)]
    pub owner_ids: Vec<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub app_url: Option<String>,
    #[serde(default)]
    pub workflow_state_id: Option<i64>,
    #[serde(default)]
    pub estimate: Option<i64>,
}

impl StoryRecord {
    fn url(&self) -> String {
        self.app_url
            .clone()
            .unwrap_or_else(|| format!("https://app.shortcut.com/story/{}", self.id))
    }

    fn title(&self) -> String {
        self.name.clone().unwrap_or_else(|| format!("Story {}", self.id))
    }

    /// Stories that were never updated count as idle forever.
    fn idle_longer_than(&self, limit: Duration, now: DateTime<Utc>) -> bool {
        self.updated_at.map_or(true, |updated| now - updated > limit)
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchPage {
    #[serde(default)]
    data: Vec<StoryRecord>,
}

#[derive(Debug, Deserialize)]
struct Workflow {
    name: String,
    #[serde(default)]
    states: Vec<WorkflowState>,
}

#[derive(Debug, Deserialize)]
struct WorkflowState {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

async fn search(client: &ShortcutClient, query: &str) -> Result<Vec<StoryRecord>, FetchError> {
    let page: SearchPage = decode(client.search_stories(query).await?)?;
    Ok(page.data)
}

/// Stories grouped by active state name, in workflow order.
#[derive(Debug, Default)]
pub(crate) struct ActiveStories {
    pub by_state: Vec<(String, Vec<StoryRecord>)>,
}

impl ActiveStories {
    fn all(&self) -> impl Iterator<Item = &StoryRecord> {
        self.by_state.iter().flat_map(|(_, stories)| stories.iter())
    }
}

pub(crate) async fn active_stories(
    client: &ShortcutClient,
    workflow_name: Option<&str>,
) -> Result<ActiveStories, FetchError> {
    let workflows: Vec<Workflow> = decode(client.list_workflows().await?)?;
    let state_names: Vec<String> = workflows
        .into_iter()
        .filter(|workflow| workflow_name.map_or(true, |wanted| workflow.name == wanted))
        .flat_map(|workflow| workflow.states)
        .filter(|state| state.kind == "started")
        .map(|state| state.name)
        .collect();

    let searches = state_names.iter().map(|name| async move {
        let stories = search(client, &format!("state:\"{name}\"")).await?;
        Ok::<_, FetchError>((name.clone(), stories))
    });
    Ok(ActiveStories { by_state: try_join_all(searches).await? })
}

pub(crate) async fn activity_feed(
    client: &ShortcutClient,
    range: &TimeRange,
) -> Result<Vec<ActivityEvent>, FetchError> {
    let query = format!("updated:{}..{}", range.since_str(), range.until_str());
    let stories = search(client, &query).await?;

    Ok(stories
        .into_iter()
        .filter_map(|story| {
            let timestamp = story.updated_at?;
            let mut metadata = Map::new();
            metadata.insert("storyType".into(), json!(story.story_type));
            metadata.insert("workflowStateId".into(), json!(story.workflow_state_id));
            metadata.insert("estimate".into(), json!(story.estimate));

            Some(ActivityEvent {
                id: story.id.to_string(),
                source: "shortcut".to_string(),
                kind: format!("story_{}", story.story_type.as_deref().unwrap_or("unknown")),
                title: story.name.clone().unwrap_or_default(),
                description: story.description.clone().filter(|text| !text.is_empty()),
                actor: story.owner_ids.first().cloned(),
                timestamp,
                url: Some(story.url()),
                metadata,
            })
        })
        .collect())
}

pub(crate) async fn summary_metrics(
    client: &ShortcutClient,
    range: &TimeRange,
    workflow_name: Option<&str>,
    now: DateTime<Utc>,
) -> Result<SummaryMetrics, FetchError> {
    let span = format!("{}..{}", range.since_str(), range.until_str());
    let created_query = format!("created:{span}");
    let completed_query = format!("completed:{span}");
    let (created, completed, active) = futures::try_join!(
        search(client, &created_query),
        search(client, &completed_query),
        active_stories(client, workflow_name),
    )?;

    let stuck_limit = Duration::days(STUCK_METRIC_DAYS);
    let stuck = active.all().filter(|story| story.idle_longer_than(stuck_limit, now)).count();
    let unestimated = active.all().filter(|story| story.estimate.is_none()).count();

    let mut metrics = SummaryMetrics::new();
    metrics.insert("stories_created".into(), count(created.len()));
    metrics.insert("stories_completed".into(), count(completed.len()));
    metrics.insert("stories_stuck".into(), count(stuck));
    metrics.insert("stories_unestimated".into(), count(unestimated));
    for (state, stories) in &active.by_state {
        metrics.insert(state_metric_key(state), count(stories.len()));
    }
    Ok(metrics)
}

pub(crate) async fn alerts(
    client: &ShortcutClient,
    workflow_name: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<Alert>, FetchError> {
    let active = active_stories(client, workflow_name).await?;
    let stuck_limit = Duration::days(STUCK_ALERT_DAYS);
    let mut alerts = Vec::new();

    let stuck: Vec<AlertItem> = active
        .all()
        .filter(|story| story.idle_longer_than(stuck_limit, now))
        .map(|story| alert_item(story, "updatedAt", json!(story.updated_at)))
        .collect();
    if !stuck.is_empty() {
        alerts.push(Alert {
            id: "shortcut-stuck-stories".to_string(),
            source: "shortcut".to_string(),
            severity: AlertSeverity::Warning,
            title: format!("{} stuck {}", stuck.len(), stories_noun(stuck.len())),
            description: "Stories in active states with no updates for 7+ days".to_string(),
            items: stuck,
            timestamp: now,
        });
    }

    let unestimated: Vec<AlertItem> = active
        .all()
        .filter(|story| story.estimate.is_none())
        .map(|story| alert_item(story, "estimate", Value::Null))
        .collect();
    if !unestimated.is_empty() {
        alerts.push(Alert {
            id: "shortcut-unestimated-stories".to_string(),
            source: "shortcut".to_string(),
            severity: AlertSeverity::Info,
            title: format!("{} unestimated {}", unestimated.len(), stories_noun(unestimated.len())),
            description: "Stories in active states without point estimates".to_string(),
            items: unestimated,
            timestamp: now,
        });
    }

    Ok(alerts)
}

fn alert_item(story: &StoryRecord, key: &str, value: Value) -> AlertItem {
    let mut metadata = Map::new();
    metadata.insert(key.to_string(), value);
    AlertItem { id: story.id.to_string(), title: story.title(), url: Some(story.url()), metadata }
}

fn stories_noun(count: usize) -> &'static str {
    if count == 1 {
        "story"
    } else {
        "stories"
    }
}

/// `In Progress` -> `stories_in_progress`.
pub(crate) fn state_metric_key(state: &str) -> String {
    let words: Vec<String> = state.split_whitespace().map(str::to_lowercase).collect();
    format!("stories_{}", words.join("_"))
}

fn count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::state_metric_key;

    #[test]
    fn state_names_become_metric_keys() {
        assert_eq!(state_metric_key("In Progress"), "stories_in_progress");
        assert_eq!(state_metric_key("Ready  for Review"), "stories_ready_for_review");
    }
}
