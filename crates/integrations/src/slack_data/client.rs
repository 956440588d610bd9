use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::decode;
use crate::fetch::{ApiRequest, FetchError, RestClient};
use crate::IntegrationContext;

pub const SLACK_API_URL: &str = "https://slack.com/api";

/// Thin Slack Web API wrapper. Every method answers HTTP 200 with an `ok`
/// flag, so a successful transport can still be a failed call.
#[derive(Clone, Debug)]
pub struct SlackApi {
    rest: RestClient,
}

impl SlackApi {
    pub fn new(
        token: &SecretString,
        base_url: &str,
        context: &IntegrationContext,
    ) -> Result<Self, FetchError> {
        let rest = RestClient::new(base_url, context.policy.clone(), context.cache.clone())?
            .with_bearer(token)?;
        Ok(Self { rest })
    }

    pub async fn get(&self, method: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
        let request = query
            .iter()
            .fold(ApiRequest::get(format!("/{method}")), |request, (key, value)| {
                request.query(key, value)
            });
        check_ok(method, self.rest.send(request).await?)
    }

    pub async fn post(&self, method: &str, body: Value) -> Result<Value, FetchError> {
        check_ok(method, self.rest.send(ApiRequest::post(format!("/{method}"), body)).await?)
    }
}

fn check_ok(method: &str, response: Value) -> Result<Value, FetchError> {
    if response.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(response);
    }
    let error = response.get("error").and_then(Value::as_str).unwrap_or("unknown_error");
    Err(FetchError::Api(format!("Slack API {method} failed: {error}")))
}

/// Slack message timestamps are `seconds.micros` strings.
pub fn parse_slack_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (seconds, fraction) = ts.split_once('.').unwrap_or((ts, "0"));
    let seconds: i64 = seconds.parse().ok()?;
    let micros: u32 = format!("{fraction:0<6}").get(..6)?.parse().ok()?;
    DateTime::from_timestamp(seconds, micros * 1_000)
}

/// `C…`, `G…` or `D…` followed by upper-case alphanumerics.
pub fn validate_channel_id(channel: &str) -> Result<(), FetchError> {
    let mut chars = channel.chars();
    let valid = matches!(chars.next(), Some('C' | 'G' | 'D'))
        && channel.len() >= 9
        && chars.all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(FetchError::Invalid(format!(
            "Invalid channel \"{channel}\". Expected a channel ID like C01ABCDEF."
        )))
    }
}

#[derive(Debug, Default, Deserialize)]
struct WireChannel {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMatch {
    #[serde(default)]
    channel: WireChannel,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    permalink: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireMatches {
    #[serde(default)]
    matches: Vec<WireMatch>,
    #[serde(default)]
    total: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WireSearch {
    #[serde(default)]
    messages: WireMatches,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    reply_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireHistory {
    #[serde(default)]
    messages: Vec<WireMessage>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchMatch {
    pub channel: String,
    pub channel_name: String,
    pub user: String,
    pub text: String,
    pub ts: String,
    pub permalink: String,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct SearchResults {
    pub matches: Vec<SearchMatch>,
    /// Total hits reported by Slack, which can exceed `matches.len()`.
    pub total: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChannelMessage {
    pub user: String,
    pub text: String,
    pub ts: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_count: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct SlackDataClient {
    api: SlackApi,
}

impl SlackDataClient {
    pub fn new(api: SlackApi) -> Self {
        Self { api }
    }

    pub async fn search_messages(&self, query: &str, count: u32) -> Result<SearchResults, FetchError> {
        let response = self
            .api
            .get(
                "search.messages",
                &[
                    ("query", query.to_string()),
                    ("count", count.to_string()),
                    ("sort", "timestamp".to_string()),
                    ("sort_dir", "desc".to_string()),
                ],
            )
            .await?;
        let search: WireSearch = decode(response)?;
        let matches = search
            .messages
            .matches
            .into_iter()
            .map(|found| SearchMatch {
                channel: found.channel.id.unwrap_or_default(),
                channel_name: found.channel.name.unwrap_or_default(),
                user: found.user.or(found.username).unwrap_or_else(|| "unknown".to_string()),
                text: found.text.unwrap_or_default(),
                ts: found.ts.unwrap_or_default(),
                permalink: found.permalink.unwrap_or_default(),
            })
            .collect();
        Ok(SearchResults { matches, total: search.messages.total })
    }

    pub async fn channel_history(&self, channel: &str, limit: u32) -> Result<Vec<ChannelMessage>, FetchError> {
        validate_channel_id(channel)?;
        let response = self
            .api
            .get("conversations.history", &[("channel", channel.to_string()), ("limit", limit.to_string())])
            .await?;
        let history: WireHistory = decode(response)?;
        Ok(history
            .messages
            .into_iter()
            .map(|message| ChannelMessage {
                user: message.user.unwrap_or_else(|| "unknown".to_string()),
                text: message.text.unwrap_or_default(),
                ts: message.ts.unwrap_or_default(),
                thread_ts: message.thread_ts,
                reply_count: message.reply_count,
            })
            .collect())
    }
}
