use mission_control_core::{ActivityEvent, SummaryMetrics, TimeRange};
use serde_json::{json, Map};

use super::client::{GithubClient, SearchHit};
use crate::fetch::FetchError;

const READ_PAGE_SIZE: u32 = 100;

fn span(range: &TimeRange) -> String {
    format!("{}..{}", range.since_str(), range.until_str())
}

fn event(repo: &str, hit: SearchHit, kind: &str, verb: &str) -> ActivityEvent {
    let issue = hit.issue;
    let mut metadata = Map::new();
    metadata.insert("repo".into(), json!(repo));
    metadata.insert("number".into(), json!(issue.number));

    let prefix = if kind == "pr_merged" { "pr" } else { "issue" };
    ActivityEvent {
        id: format!("github-{prefix}-{repo}-{}", issue.number),
        source: "github".to_string(),
        kind: kind.to_string(),
        title: issue.title,
        description: Some(format!("#{} {verb} by {}", issue.number, issue.user)),
        actor: Some(issue.user),
        timestamp: issue.closed_at.unwrap_or(issue.updated_at),
        url: Some(issue.url),
        metadata,
    }
}

/// Merged pull requests and closed issues per allowed repo.
pub(crate) async fn activity_feed(
    client: &GithubClient,
    range: &TimeRange,
) -> Result<Vec<ActivityEvent>, FetchError> {
    let span = span(range);
    let mut events = Vec::new();

    for repo in client.allowed_repos() {
        let merged_query = format!("repo:{repo} is:pr is:merged merged:{span}");
        let closed_query = format!("repo:{repo} is:issue is:closed closed:{span}");
        let (merged, closed) = futures::try_join!(
            client.search_raw(&merged_query, READ_PAGE_SIZE),
            client.search_raw(&closed_query, READ_PAGE_SIZE),
        )?;

        events.extend(merged.into_iter().map(|hit| event(repo, hit, "pr_merged", "merged")));
        events.extend(closed.into_iter().map(|hit| event(repo, hit, "issue_closed", "closed")));
    }

    events.sort_by(|left, right| right.timestamp.cmp(&left.timestamp));
    Ok(events)
}

pub(crate) async fn summary_metrics(
    client: &GithubClient,
    range: &TimeRange,
) -> Result<SummaryMetrics, FetchError> {
    let span = span(range);
    let mut prs_merged = 0_i64;
    let mut prs_opened = 0_i64;
    let mut issues_opened = 0_i64;
    let mut issues_closed = 0_i64;
    let mut merge_hours = 0.0_f64;

    for repo in client.allowed_repos() {
        let queries = [
            format!("repo:{repo} is:pr is:merged merged:{span}"),
            format!("repo:{repo} is:pr created:{span}"),
            format!("repo:{repo} is:issue created:{span}"),
            format!("repo:{repo} is:issue is:closed closed:{span}"),
        ];
        let (merged, opened, new_issues, closed) = futures::try_join!(
            client.search_raw(&queries[0], READ_PAGE_SIZE),
            client.search_raw(&queries[1], READ_PAGE_SIZE),
            client.search_raw(&queries[2], READ_PAGE_SIZE),
            client.search_raw(&queries[3], READ_PAGE_SIZE),
        )?;

        merge_hours += merged
            .iter()
            .filter_map(|hit| {
                let closed_at = hit.issue.closed_at?;
                Some((closed_at - hit.issue.created_at).num_seconds() as f64 / 3600.0)
            })
            .sum::<f64>();
        prs_merged += count(merged.len());
        prs_opened += count(opened.len());
        issues_opened += count(new_issues.len());
        issues_closed += count(closed.len());
    }

    let avg_merge_hours =
        if prs_merged > 0 { (merge_hours / prs_merged as f64).round() as i64 } else { 0 };

    let mut metrics = SummaryMetrics::new();
    metrics.insert("prs_merged".into(), prs_merged);
    metrics.insert("prs_opened".into(), prs_opened);
    metrics.insert("issues_opened".into(), issues_opened);
    metrics.insert("issues_closed".into(), issues_closed);
    metrics.insert("avg_merge_hours".into(), avg_merge_hours);
    Ok(metrics)
}

fn count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
