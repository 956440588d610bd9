use mission_control_core::{ActivityEvent, SummaryMetrics, TimeRange};
use serde_json::{json, Map};

use super::client::{NotionClient, ObjectKind, PageSummary};
use crate::fetch::FetchError;

const RECENT_PAGE_SIZE: u32 = 100;

async fn edited_in_range(
    client: &NotionClient,
    range: &TimeRange,
) -> Result<Vec<(PageSummary, chrono::DateTime<chrono::Utc>)>, FetchError> {
    let pages = client.recently_edited(RECENT_PAGE_SIZE).await?;
    Ok(pages
        .into_iter()
        .filter(|page| page.kind == ObjectKind::Page)
        .filter_map(|page| page.last_edited().map(|edited| (page, edited)))
        .filter(|(_, edited)| range.contains(*edited))
        .collect())
}

pub(crate) async fn activity_feed(
    client: &NotionClient,
    range: &TimeRange,
) -> Result<Vec<ActivityEvent>, FetchError> {
    Ok(edited_in_range(client, range)
        .await?
        .into_iter()
        .map(|(page, edited)| {
            let mut metadata = Map::new();
            metadata.insert("pageType".into(), json!(page.kind));
            ActivityEvent {
                id: format!("notion-{}", page.id),
                source: "notion".to_string(),
                kind: "page_edited".to_string(),
                title: page.title,
                description: Some("Page updated".to_string()),
                actor: None,
                timestamp: edited,
                url: Some(page.url).filter(|url| !url.is_empty()),
                metadata,
            }
        })
        .collect())
}

pub(crate) async fn summary_metrics(
    client: &NotionClient,
    range: &TimeRange,
) -> Result<SummaryMetrics, FetchError> {
    let updated = edited_in_range(client, range).await?.len();
    let mut metrics = SummaryMetrics::new();
    metrics.insert("pages_updated".into(), i64::try_from(updated).unwrap_or(i64::MAX));
    Ok(metrics)
}
