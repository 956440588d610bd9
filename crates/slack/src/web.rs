//! Slack Web API calls the assistant makes while answering a thread.

use async_trait::async_trait;
use mission_control_integrations::{FetchError, SlackApi};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

const REPLIES_PAGE_SIZE: u32 = 200;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachedFile {
    pub name: String,
    pub mimetype: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadMessage {
    pub user: String,
    pub text: String,
    pub ts: String,
    pub files: Vec<AttachedFile>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Api(#[from] FetchError),
    #[error("thread {thread_ts} in {channel} has no messages")]
    EmptyThread { channel: String, thread_ts: String },
    #[error("unexpected {method} response: {detail}")]
    Decode { method: &'static str, detail: String },
}

/// Everything the mention handler needs from Slack.
#[async_trait]
pub trait SlackGateway: Send + Sync {
    /// All messages of the thread containing `thread_ts`, root first.
    async fn fetch_thread(&self, channel: &str, thread_ts: &str) -> Result<Vec<ThreadMessage>, GatewayError>;

    async fn post_thread_reply(&self, channel: &str, thread_ts: &str, text: &str) -> Result<(), GatewayError>;

    async fn permalink(&self, channel: &str, message_ts: &str) -> Result<String, GatewayError>;

    async fn bot_user_id(&self) -> Result<String, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct WireFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    mimetype: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    files: Vec<WireFile>,
}

#[derive(Debug, Default, Deserialize)]
struct WireResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireReplies {
    #[serde(default)]
    messages: Vec<WireReply>,
    #[serde(default)]
    response_metadata: WireResponseMetadata,
}

impl From<WireReply> for ThreadMessage {
    fn from(reply: WireReply) -> Self {
        Self {
            user: reply.user.unwrap_or_else(|| "unknown".to_string()),
            text: reply.text.unwrap_or_default(),
            ts: reply.ts.unwrap_or_default(),
            files: reply
                .files
                .into_iter()
                .map(|file| AttachedFile {
                    name: file.name.unwrap_or_else(|| "unnamed".to_string()),
                    mimetype: file.mimetype.unwrap_or_else(|| "unknown".to_string()),
                })
                .collect(),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(method: &'static str, value: Value) -> Result<T, GatewayError> {
    serde_json::from_value(value).map_err(|error| GatewayError::Decode { method, detail: error.to_string() })
}

/// [`SlackGateway`] over the bot token's Web API access.
#[derive(Clone, Debug)]
pub struct SlackWebGateway {
    api: SlackApi,
}

impl SlackWebGateway {
    pub fn new(api: SlackApi) -> Self {
        Self { api }
    }

    async fn replies_page(
        &self,
        channel: &str,
        ts: &str,
        cursor: Option<&str>,
    ) -> Result<(Vec<WireReply>, Option<String>), GatewayError> {
        let mut query = vec![
            ("channel", channel.to_string()),
            ("ts", ts.to_string()),
            ("limit", REPLIES_PAGE_SIZE.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        let page: WireReplies = decode("conversations.replies", self.api.get("conversations.replies", &query).await?)?;
        let next = page.response_metadata.next_cursor.filter(|cursor| !cursor.is_empty());
        Ok((page.messages, next))
    }

    async fn all_replies(
        &self,
        channel: &str,
        ts: &str,
        mut messages: Vec<WireReply>,
        mut cursor: Option<String>,
    ) -> Result<Vec<WireReply>, GatewayError> {
        while let Some(current) = cursor {
            let (page, next) = self.replies_page(channel, ts, Some(&current)).await?;
            debug!(
                event_name = "slack.thread.page",
                channel,
                thread_ts = ts,
                messages = page.len(),
                "fetched thread page"
            );
            messages.extend(page);
            cursor = next;
        }
        Ok(messages)
    }
}

#[async_trait]
impl SlackGateway for SlackWebGateway {
    async fn fetch_thread(&self, channel: &str, thread_ts: &str) -> Result<Vec<ThreadMessage>, GatewayError> {
        let empty = || GatewayError::EmptyThread { channel: channel.to_string(), thread_ts: thread_ts.to_string() };

        let (first_page, cursor) = self.replies_page(channel, thread_ts, None).await?;
        let parent_ts = first_page.first().ok_or_else(empty)?.thread_ts.clone();

        let messages = match parent_ts {
            // The requested ts is a reply; restart from the real root.
            Some(parent) if parent != thread_ts => {
                let (root_page, root_cursor) = self.replies_page(channel, &parent, None).await?;
                if root_page.is_empty() {
                    return Err(empty());
                }
                self.all_replies(channel, &parent, root_page, root_cursor).await?
            }
            _ => self.all_replies(channel, thread_ts, first_page, cursor).await?,
        };

        Ok(messages.into_iter().map(ThreadMessage::from).collect())
    }

    async fn post_thread_reply(&self, channel: &str, thread_ts: &str, text: &str) -> Result<(), GatewayError> {
        self.api
            .post("chat.postMessage", json!({"channel": channel, "thread_ts": thread_ts, "text": text}))
            .await?;
        Ok(())
    }

    async fn permalink(&self, channel: &str, message_ts: &str) -> Result<String, GatewayError> {
        let response = self
            .api
            .get("chat.getPermalink", &[("channel", channel.to_string()), ("message_ts", message_ts.to_string())])
            .await?;
        Ok(response.get("permalink").and_then(Value::as_str).unwrap_or_default().to_string())
    }

    async fn bot_user_id(&self) -> Result<String, GatewayError> {
        let response = self.api.post("auth.test", json!({})).await?;
        Ok(response.get("user_id").and_then(Value::as_str).unwrap_or_default().to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::extract::{Query, State};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use mission_control_core::AppConfig;
    use mission_control_integrations::{IntegrationContext, SlackApi};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    use super::{SlackGateway, SlackWebGateway};

    type Calls = Arc<Mutex<Vec<String>>>;

    async fn replies(State(calls): State<Calls>, Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        let ts = params.get("ts").cloned().unwrap_or_default();
        let cursor = params.get("cursor").cloned();
        calls.lock().await.push(format!("{ts}:{}", cursor.clone().unwrap_or_default()));

        let body = match (ts.as_str(), cursor.as_deref()) {
            // A reply: its first message points at the real parent.
            ("200.2", None) => json!({"ok": true, "messages": [
                {"user": "U2", "text": "reply", "ts": "200.2", "thread_ts": "100.1"}
            ]}),
            ("100.1", None) => json!({"ok": true,
                "messages": [
                    {"user": "U1", "text": "root", "ts": "100.1", "thread_ts": "100.1",
                     "files": [{"name": "trace.log", "mimetype": "text/plain"}]}
                ],
                "response_metadata": {"next_cursor": "page-2"}
            }),
            ("100.1", Some("page-2")) => json!({"ok": true,
                "messages": [{"user": "U2", "text": "reply", "ts": "200.2", "thread_ts": "100.1"}],
                "response_metadata": {"next_cursor": ""}
            }),
            ("300.3", None) => json!({"ok": true, "messages": []}),
            _ => json!({"ok": false, "error": "thread_not_found"}),
        };
        Json(body)
    }

    async fn post_message(State(calls): State<Calls>, Json(body): Json<Value>) -> Json<Value> {
        calls.lock().await.push(body.to_string());
        Json(json!({"ok": true, "ts": "400.4"}))
    }

    async fn gateway() -> Result<(SlackWebGateway, Calls), String> {
        let calls = Calls::default();
        let router = Router::new()
            .route("/conversations.replies", get(replies))
            .route("/chat.postMessage", post(post_message))
            .route(
                "/chat.getPermalink",
                get(|| async { Json(json!({"ok": true, "permalink": "https://acme.slack.com/archives/C1/p1001"})) }),
            )
            .route("/auth.test", post(|| async { Json(json!({"ok": true, "user_id": "UBOT"})) }))
            .with_state(calls.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.map_err(|e| e.to_string())?;
        let addr = listener.local_addr().map_err(|e| e.to_string())?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let context = IntegrationContext::from_config(&AppConfig::default());
        let api = SlackApi::new(&SecretString::from("xoxb-test".to_string()), &format!("http://{addr}"), &context)
            .map_err(|e| e.to_string())?;
        Ok((SlackWebGateway::new(api), calls))
    }

    #[tokio::test]
    async fn fetches_every_page_of_a_thread() -> Result<(), String> {
        let (gateway, calls) = gateway().await?;

        let messages = gateway.fetch_thread("C1", "100.1").await.map_err(|e| e.to_string())?;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].files[0].name, "trace.log");
        assert_eq!(*calls.lock().await, vec!["100.1:".to_string(), "100.1:page-2".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn replies_are_resolved_to_their_parent_thread() -> Result<(), String> {
        let (gateway, calls) = gateway().await?;

        let messages = gateway.fetch_thread("C1", "200.2").await.map_err(|e| e.to_string())?;
        assert_eq!(messages[0].text, "root");
        assert_eq!(messages.len(), 2);
        assert_eq!(calls.lock().await.first().map(String::as_str), Some("200.2:"));
        Ok(())
    }

    #[tokio::test]
    async fn empty_and_failed_threads_are_errors() -> Result<(), String> {
        let (gateway, _) = gateway().await?;

        let empty = gateway.fetch_thread("C1", "300.3").await;
        assert!(matches!(empty, Err(super::GatewayError::EmptyThread { .. })));

        let missing = gateway.fetch_thread("C1", "999.9").await.map_err(|e| e.to_string());
        assert_eq!(missing, Err("Slack API conversations.replies failed: thread_not_found".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn posts_replies_and_reads_permalinks() -> Result<(), String> {
        let (gateway, calls) = gateway().await?;

        gateway.post_thread_reply("C1", "100.1", "Created sc-42").await.map_err(|e| e.to_string())?;
        let recorded = calls.lock().await.clone();
        let body: Value = serde_json::from_str(recorded.last().map(String::as_str).unwrap_or("{}"))
            .map_err(|e| e.to_string())?;
        assert_eq!(body["thread_ts"], "100.1");
        assert_eq!(body["text"], "Created sc-42");

        let link = gateway.permalink("C1", "100.1").await.map_err(|e| e.to_string())?;
        assert!(link.ends_with("p1001"));
        assert_eq!(gateway.bot_user_id().await.map_err(|e| e.to_string())?, "UBOT");
        Ok(())
    }
}
