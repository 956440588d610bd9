use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// One decoded Events API request body.
#[derive(Clone, Debug, PartialEq)]
pub enum SlackEnvelope {
    UrlVerification { challenge: String },
    EventCallback { event_id: String, event: SlackEvent },
    Unsupported { envelope_type: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum SlackEvent {
    AppMention(AppMentionEvent),
    ReactionAdded(ReactionAddedEvent),
    Unsupported { event_type: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    AppMention,
    ReactionAdded,
    Unsupported,
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::AppMention(_) => SlackEventType::AppMention,
            Self::ReactionAdded(_) => SlackEventType::ReactionAdded,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    /// `(channel, event_ts)` used to drop duplicate deliveries.
    pub fn dedup_key(&self) -> Option<(&str, &str)> {
        match self {
            Self::AppMention(event) => Some((event.channel.as_str(), event.event_ts.as_str())),
            Self::ReactionAdded(event) => Some((event.channel.as_str(), event.event_ts.as_str())),
            Self::Unsupported { .. } => None,
        }
    }

    pub fn channel(&self) -> Option<&str> {
        self.dedup_key().map(|(channel, _)| channel)
    }

    /// Thread the bot answers in. A reaction on a reply resolves to the
    /// real root later, when the thread is fetched.
    pub fn thread_ts(&self) -> Option<&str> {
        match self {
            Self::AppMention(event) => Some(event.thread_root()),
            Self::ReactionAdded(event) => Some(event.message_ts.as_str()),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppMentionEvent {
    pub channel: String,
    pub user: String,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub event_ts: String,
}

impl AppMentionEvent {
    pub fn thread_root(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionAddedEvent {
    pub channel: String,
    pub user: String,
    pub reaction: String,
    pub message_ts: String,
    pub event_ts: String,
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("request body is not valid JSON: {0}")]
    Json(String),
    #[error("{envelope} envelope is missing `{field}`")]
    MissingField { envelope: &'static str, field: &'static str },
}

#[derive(Debug, Deserialize)]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    challenge: Option<String>,
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    event: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireMention {
    channel: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: String,
    ts: String,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    event_ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireReactionItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireReaction {
    #[serde(default)]
    user: Option<String>,
    reaction: String,
    item: WireReactionItem,
    event_ts: String,
}

/// Strips colons and case so `:Ticket:` and `ticket` compare equal.
pub fn normalize_reaction(reaction: &str) -> String {
    reaction.trim().trim_matches(':').to_ascii_lowercase()
}

/// Decodes a request body. Reactions other than `trigger_reaction`, and
/// reactions on anything but a message, become `Unsupported`.
pub fn parse_envelope(body: &[u8], trigger_reaction: &str) -> Result<SlackEnvelope, EnvelopeError> {
    let wire: WireEnvelope =
        serde_json::from_slice(body).map_err(|error| EnvelopeError::Json(error.to_string()))?;

    match wire.kind.as_str() {
        "url_verification" => {
            let challenge = wire.challenge.ok_or(EnvelopeError::MissingField {
                envelope: "url_verification",
                field: "challenge",
            })?;
            Ok(SlackEnvelope::UrlVerification { challenge })
        }
        "event_callback" => {
            let raw = wire
                .event
                .ok_or(EnvelopeError::MissingField { envelope: "event_callback", field: "event" })?;
            Ok(SlackEnvelope::EventCallback {
                event_id: wire.event_id.unwrap_or_default(),
                event: parse_event(raw, trigger_reaction)?,
            })
        }
        other => Ok(SlackEnvelope::Unsupported { envelope_type: other.to_string() }),
    }
}

fn parse_event(raw: Value, trigger_reaction: &str) -> Result<SlackEvent, EnvelopeError> {
    let event_type = raw.get("type").and_then(Value::as_str).unwrap_or_default().to_string();
    let invalid = |error: serde_json::Error| EnvelopeError::Json(format!("{event_type}: {error}"));

    match event_type.as_str() {
        "app_mention" => {
            let mention: WireMention = serde_json::from_value(raw).map_err(invalid)?;
            let event_ts = mention.event_ts.unwrap_or_else(|| mention.ts.clone());
            Ok(SlackEvent::AppMention(AppMentionEvent {
                channel: mention.channel,
                user: mention.user.unwrap_or_else(|| "unknown".to_string()),
                text: mention.text,
                ts: mention.ts,
                thread_ts: mention.thread_ts,
                event_ts,
            }))
        }
        "reaction_added" => {
            let reaction: WireReaction = serde_json::from_value(raw).map_err(invalid)?;
            let triggered = normalize_reaction(&reaction.reaction) == normalize_reaction(trigger_reaction);
            match (triggered, reaction.item.kind.as_str(), reaction.item.channel, reaction.item.ts) {
                (true, "message", Some(channel), Some(message_ts)) => {
                    Ok(SlackEvent::ReactionAdded(ReactionAddedEvent {
                        channel,
                        user: reaction.user.unwrap_or_else(|| "unknown".to_string()),
                        reaction: reaction.reaction,
                        message_ts,
                        event_ts: reaction.event_ts,
                    }))
                }
                _ => Ok(SlackEvent::Unsupported { event_type }),
            }
        }
        _ => Ok(SlackEvent::Unsupported { event_type }),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    Ignored,
}

#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error("slack web api failed: {0}")]
    Gateway(#[from] crate::web::GatewayError),
    #[error("agent run failed: {0}")]
    Agent(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("handler failed for {event_type:?}: {source}")]
    HandlerFailed {
        event_type: SlackEventType,
        #[source]
        source: EventHandlerError,
    },
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;

    async fn handle(
        &self,
        event: &SlackEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Clone, Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(handler.event_type(), handler);
    }

    pub fn handles(&self, event_type: SlackEventType) -> bool {
        self.handlers.contains_key(&event_type)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub async fn dispatch(
        &self,
        event: &SlackEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let event_type = event.event_type();
        let Some(handler) = self.handlers.get(&event_type) else {
            debug!(
                event_name = "slack.dispatch.ignored",
                correlation_id = %ctx.correlation_id,
                event_type = ?event_type,
                "no handler registered for event"
            );
            return Ok(HandlerResult::Ignored);
        };

        handler
            .handle(event, ctx)
            .await
            .map_err(|source| DispatchError::HandlerFailed { event_type, source })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    use super::{
        parse_envelope, EventContext, EventDispatcher, EventHandler, EventHandlerError,
        HandlerResult, SlackEnvelope, SlackEvent, SlackEventType,
    };

    fn body(value: serde_json::Value) -> Vec<u8> {
        value.to_string().into_bytes()
    }

    #[test]
    fn parses_url_verification() {
        let envelope = parse_envelope(
            &body(json!({"type": "url_verification", "challenge": "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"})),
            "ticket",
        );
        assert!(matches!(
            envelope,
            Ok(SlackEnvelope::UrlVerification { challenge }) if challenge.starts_with("3eZb")
        ));
    }

    #[test]
    fn parses_app_mentions_with_thread_roots() {
        let raw = json!({
            "type": "event_callback",
            "event_id": "Ev01",
            "event": {
                "type": "app_mention", "channel": "C01ABCDEF", "user": "U1",
                "text": "<@UBOT> file this", "ts": "1714557700.000300",
                "thread_ts": "1714557600.000100", "event_ts": "1714557700.000300"
            }
        });

        let Ok(SlackEnvelope::EventCallback { event_id, event }) = parse_envelope(&body(raw), "ticket")
        else {
            panic!("expected event callback");
        };
        assert_eq!(event_id, "Ev01");
        assert_eq!(event.dedup_key(), Some(("C01ABCDEF", "1714557700.000300")));
        assert_eq!(event.thread_ts(), Some("1714557600.000100"));
    }

    #[test]
    fn top_level_mentions_use_their_own_ts_as_thread() {
        let raw = json!({
            "type": "event_callback",
            "event": {"type": "app_mention", "channel": "C1", "user": "U1", "text": "hi", "ts": "5.0"}
        });
        let Ok(SlackEnvelope::EventCallback { event, .. }) = parse_envelope(&body(raw), "ticket") else {
            panic!("expected event callback");
        };
        assert_eq!(event.thread_ts(), Some("5.0"));
        assert_eq!(event.dedup_key(), Some(("C1", "5.0")));
    }

    #[test]
    fn only_the_trigger_reaction_on_messages_is_recognised() {
        let reaction = |name: &str, item_type: &str| {
            body(json!({
                "type": "event_callback",
                "event": {
                    "type": "reaction_added", "user": "U2", "reaction": name,
                    "item": {"type": item_type, "channel": "C1", "ts": "7.0"},
                    "event_ts": "8.0"
                }
            }))
        };

        let Ok(SlackEnvelope::EventCallback { event, .. }) = parse_envelope(&reaction("ticket", "message"), ":Ticket:")
        else {
            panic!("expected event callback");
        };
        assert_eq!(event.event_type(), SlackEventType::ReactionAdded);
        assert_eq!(event.thread_ts(), Some("7.0"));

        for (name, item_type) in [("thumbsup", "message"), ("ticket", "file")] {
            let Ok(SlackEnvelope::EventCallback { event, .. }) = parse_envelope(&reaction(name, item_type), "ticket")
            else {
                panic!("expected event callback");
            };
            assert_eq!(event, SlackEvent::Unsupported { event_type: "reaction_added".to_string() });
        }
    }

    #[test]
    fn malformed_bodies_are_errors_and_unknown_envelopes_are_not() {
        assert!(parse_envelope(b"not json", "ticket").is_err());
        assert!(parse_envelope(&body(json!({"type": "event_callback"})), "ticket").is_err());
        assert!(matches!(
            parse_envelope(&body(json!({"type": "app_rate_limited"})), "ticket"),
            Ok(SlackEnvelope::Unsupported { .. })
        ));
    }

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        fn event_type(&self) -> SlackEventType {
            SlackEventType::AppMention
        }

        async fn handle(
            &self,
            event: &SlackEvent,
            ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            let channel = event.channel().unwrap_or_default();
            self.seen.lock().await.push(format!("{}:{channel}", ctx.correlation_id));
            Ok(HandlerResult::Processed)
        }
    }

    #[tokio::test]
    async fn dispatcher_routes_by_event_type_and_ignores_the_rest() {
        let handler = Arc::new(RecordingHandler::default());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(handler.clone());
        assert_eq!(dispatcher.handler_count(), 1);

        let mention = SlackEvent::AppMention(super::AppMentionEvent {
            channel: "C1".to_string(),
            user: "U1".to_string(),
            text: "hi".to_string(),
            ts: "1.0".to_string(),
            thread_ts: None,
            event_ts: "1.0".to_string(),
        });
        let ctx = EventContext { correlation_id: "Ev1".to_string() };

        let routed = dispatcher.dispatch(&mention, &ctx).await.map_err(|e| e.to_string());
        assert_eq!(routed, Ok(HandlerResult::Processed));

        let other = SlackEvent::Unsupported { event_type: "message".to_string() };
        let ignored = dispatcher.dispatch(&other, &ctx).await.map_err(|e| e.to_string());
        assert_eq!(ignored, Ok(HandlerResult::Ignored));

        assert_eq!(*handler.seen.lock().await, vec!["Ev1:C1".to_string()]);
    }
}
