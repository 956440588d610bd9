use mission_control_core::{ActivityEvent, SummaryMetrics, TimeRange};
use serde_json::{json, Map};

use super::client::{parse_slack_ts, SlackDataClient};
use crate::common::truncate_chars;
use crate::fetch::FetchError;

const FEED_COUNT: u32 = 50;
const TITLE_CHARS: usize = 100;

fn range_query(range: &TimeRange) -> String {
    format!("after:{} before:{}", range.since_str(), range.until_str())
}

pub(crate) async fn activity_feed(
    client: &SlackDataClient,
    range: &TimeRange,
) -> Result<Vec<ActivityEvent>, FetchError> {
    let results = client.search_messages(&range_query(range), FEED_COUNT).await?;

    Ok(results
        .matches
        .into_iter()
        .filter_map(|found| {
            let timestamp = parse_slack_ts(&found.ts)?;
            let mut metadata = Map::new();
            metadata.insert("channel".into(), json!(found.channel));
            metadata.insert("channel_name".into(), json!(found.channel_name));
            Some(ActivityEvent {
                id: format!("slack-{}-{}", found.channel, found.ts),
                source: "slack".to_string(),
                kind: "message".to_string(),
                title: truncate_chars(&found.text, TITLE_CHARS),
                description: Some(format!("in #{}", found.channel_name)),
                actor: Some(found.user),
                timestamp,
                url: Some(found.permalink).filter(|url| !url.is_empty()),
                metadata,
            })
        })
        .collect())
}

/// Uses Slack's reported total so one result is enough to count the range.
pub(crate) async fn summary_metrics(
    client: &SlackDataClient,
    range: &TimeRange,
) -> Result<SummaryMetrics, FetchError> {
    let results = client.search_messages(&range_query(range), 1).await?;
    let found = results
        .total
        .unwrap_or_else(|| i64::try_from(results.matches.len()).unwrap_or(i64::MAX));

    let mut metrics = SummaryMetrics::new();
    metrics.insert("messages_found".into(), found);
    Ok(metrics)
}
