//! `POST /slack/events`: verify, decode, dedup, acknowledge, then hand off.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use mission_control_slack::events::{
    parse_envelope, DispatchError, EventContext, SlackEnvelope, SlackEvent,
};
use mission_control_slack::signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use mission_control_slack::{EventDeduplicator, EventDispatcher, SignatureVerifier, SlackGateway};
use serde_json::json;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct IntakeState {
    pub verifier: Arc<SignatureVerifier>,
    pub dedup: Arc<EventDeduplicator>,
    pub dispatcher: Arc<EventDispatcher>,
    pub gateway: Arc<dyn SlackGateway>,
    pub trigger_reaction: String,
    pub in_flight: InFlight,
}

/// Counts spawned event handlers so shutdown can wait for them.
#[derive(Clone, Debug, Default)]
pub struct InFlight(Arc<AtomicUsize>);

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InFlight {
    fn start(&self) -> InFlightGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(Arc::clone(&self.0))
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Waits until no handler is running or `grace` elapses. Returns the
    /// number still running.
    pub async fn drain(&self, grace: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + grace;
        while self.count() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.count()
    }
}

pub fn router(state: IntakeState) -> Router {
    Router::new().route("/slack/events", post(receive_event)).with_state(state)
}

fn ack() -> Response {
    (StatusCode::OK, "ok").into_response()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

pub async fn receive_event(State(state): State<IntakeState>, headers: HeaderMap, body: Bytes) -> Response {
    let envelope = parse_envelope(&body, &state.trigger_reaction);

    // Slack sends the challenge while the app is being configured.
    if let Ok(SlackEnvelope::UrlVerification { challenge }) = &envelope {
        info!(event_name = "ingress.slack.url_verification", "answering url verification challenge");
        return Json(json!({ "challenge": challenge })).into_response();
    }

    let verified = state.verifier.verify(
        header(&headers, TIMESTAMP_HEADER),
        header(&headers, SIGNATURE_HEADER),
        &body,
        Utc::now().timestamp(),
    );
    if let Err(error) = verified {
        warn!(event_name = "ingress.slack.signature_rejected", error = %error, "rejected slack request");
        return (StatusCode::UNAUTHORIZED, "invalid signature").into_response();
    }

    let (event_id, event) = match envelope {
        Ok(SlackEnvelope::EventCallback { event_id, event }) => (event_id, event),
        Ok(SlackEnvelope::Unsupported { envelope_type }) => {
            debug!(event_name = "ingress.slack.ignored", envelope_type = %envelope_type, "ignoring envelope");
            return ack();
        }
        Ok(SlackEnvelope::UrlVerification { .. }) => return ack(),
        Err(error) => {
            warn!(event_name = "ingress.slack.malformed", error = %error, "could not decode slack request");
            return (StatusCode::BAD_REQUEST, error.to_string()).into_response();
        }
    };

    if !state.dispatcher.handles(event.event_type()) {
        debug!(
            event_name = "ingress.slack.ignored",
            event_id = %event_id,
            event_type = ?event.event_type(),
            "no handler for event"
        );
        return ack();
    }

    if let Some((channel, event_ts)) = event.dedup_key() {
        if !state.dedup.first_delivery(channel, event_ts) {
            info!(
                event_name = "ingress.slack.duplicate",
                event_id = %event_id,
                channel,
                event_ts,
                "dropping duplicate delivery"
            );
            return ack();
        }
    }

    let correlation_id = if event_id.is_empty() { uuid::Uuid::new_v4().to_string() } else { event_id };
    info!(
        event_name = "ingress.slack.accepted",
        correlation_id = %correlation_id,
        event_type = ?event.event_type(),
        channel = event.channel().unwrap_or("unknown"),
        thread_ts = event.thread_ts().unwrap_or("unknown"),
        "accepted slack event"
    );

    let guard = state.in_flight.start();
    tokio::spawn(async move {
        handle_event(state, event, EventContext { correlation_id }).await;
        drop(guard);
    });
    ack()
}

/// Runs the handler and reports failures back into the originating thread.
async fn handle_event(state: IntakeState, event: SlackEvent, ctx: EventContext) {
    let Err(failure) = state.dispatcher.dispatch(&event, &ctx).await else {
        return;
    };
    error!(
        event_name = "slack.event.failed",
        correlation_id = %ctx.correlation_id,
        error = %failure,
        "event handling failed"
    );

    let (Some(channel), Some(thread_ts)) = (event.channel(), event.thread_ts()) else {
        return;
    };
    let message = format!(":x: Sorry, I couldn't finish that: {}", failure_reason(&failure));
    if let Err(post_error) = state.gateway.post_thread_reply(channel, thread_ts, &message).await {
        error!(
            event_name = "slack.event.failure_report_failed",
            correlation_id = %ctx.correlation_id,
            channel,
            thread_ts,
            error = %post_error,
            "could not report failure to thread"
        );
    }
}

fn failure_reason(failure: &DispatchError) -> String {
    let DispatchError::HandlerFailed { source, .. } = failure;
    source.to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use chrono::Utc;
    use mission_control_slack::{EventDeduplicator, EventDispatcher, SignatureVerifier};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{router, InFlight, IntakeState};
    use crate::handler::test_support::{runtime, FakeGateway, ScriptedModel};
    use crate::handler::{MentionHandler, ThreadAssistant, TriggerReactionHandler};

    const SECRET: &str = "test-signing-secret";

    struct Harness {
        app: Router,
        gateway: Arc<FakeGateway>,
        model: Arc<ScriptedModel>,
    }

    fn harness(gateway: FakeGateway, model: ScriptedModel) -> Harness {
        let gateway = Arc::new(gateway);
        let model = Arc::new(model);
        let assistant = Arc::new(ThreadAssistant::new(gateway.clone(), runtime(model.clone())));

        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(Arc::new(MentionHandler::new(assistant.clone())));
        dispatcher.register(Arc::new(TriggerReactionHandler::new(assistant)));

        let app = router(IntakeState {
            verifier: Arc::new(SignatureVerifier::new(SecretString::from(SECRET.to_string()))),
            dedup: Arc::new(EventDeduplicator::default()),
            dispatcher: Arc::new(dispatcher),
            gateway: gateway.clone(),
            trigger_reaction: "ticket".to_string(),
            in_flight: InFlight::default(),
        });
        Harness { app, gateway, model }
    }

    fn signed_request(body: &Value, age_secs: i64) -> Request<Body> {
        let raw = body.to_string();
        let ts = (Utc::now().timestamp() - age_secs).to_string();
        let signature = SignatureVerifier::new(SecretString::from(SECRET.to_string()))
            .sign(&ts, raw.as_bytes())
            .unwrap_or_default();
        Request::post("/slack/events")
            .header("content-type", "application/json")
            .header("x-slack-request-timestamp", ts)
            .header("x-slack-signature", signature)
            .body(Body::from(raw))
            .unwrap_or_default()
    }

    fn mention(event_ts: &str) -> Value {
        json!({
            "type": "event_callback",
            "event_id": format!("Ev-{event_ts}"),
            "event": {
                "type": "app_mention", "channel": "C1", "user": "U1",
                "text": "<@UBOT> file it", "ts": event_ts, "thread_ts": "100.1", "event_ts": event_ts
            }
        })
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap_or_default();
        String::from_utf8_lossy(&bytes).to_string()
    }

    async fn wait_for_replies(gateway: &FakeGateway, count: usize) -> usize {
        for _ in 0..100 {
            let seen = gateway.replies().await.len();
            if seen >= count {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        gateway.replies().await.len()
    }

    #[tokio::test]
    async fn url_verification_echoes_the_challenge_without_a_signature() -> Result<(), String> {
        let h = harness(FakeGateway::default(), ScriptedModel::default());
        let request = Request::post("/slack/events")
            .body(Body::from(json!({"type": "url_verification", "challenge": "abc123"}).to_string()))
            .map_err(|e| e.to_string())?;

        let response = h.app.oneshot(request).await.map_err(|e| e.to_string())?;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).map_err(|e| e.to_string())?;
        assert_eq!(body, json!({"challenge": "abc123"}));
        Ok(())
    }

    #[tokio::test]
    async fn stale_or_unsigned_requests_are_unauthorized() -> Result<(), String> {
        let h = harness(FakeGateway::default(), ScriptedModel::default());

        let stale = h.app.clone().oneshot(signed_request(&mention("200.2"), 301)).await.map_err(|e| e.to_string())?;
        assert_eq!(stale.status(), StatusCode::UNAUTHORIZED);

        let unsigned = Request::post("/slack/events")
            .body(Body::from(mention("200.2").to_string()))
            .map_err(|e| e.to_string())?;
        let response = h.app.oneshot(unsigned).await.map_err(|e| e.to_string())?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn signed_but_malformed_bodies_are_bad_requests() -> Result<(), String> {
        let h = harness(FakeGateway::default(), ScriptedModel::default());
        let response = h
            .app
            .oneshot(signed_request(&json!({"type": "event_callback"}), 0))
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn mentions_are_acknowledged_then_answered_once() -> Result<(), String> {
        let h = harness(
            FakeGateway::with_thread(&[("U1", "100.1", "checkout is broken")]),
            ScriptedModel::replying("Created sc-7"),
        );

        let first = h.app.clone().oneshot(signed_request(&mention("200.2"), 0)).await.map_err(|e| e.to_string())?;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(body_text(first).await, "ok");

        let retry = h.app.clone().oneshot(signed_request(&mention("200.2"), 0)).await.map_err(|e| e.to_string())?;
        assert_eq!(retry.status(), StatusCode::OK);

        assert_eq!(wait_for_replies(&h.gateway, 1).await, 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.gateway.replies().await.len(), 1);
        assert_eq!(h.model.prompts.lock().await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn other_reactions_and_event_types_are_ignored() -> Result<(), String> {
        let h = harness(FakeGateway::with_thread(&[("U1", "100.1", "hi")]), ScriptedModel::default());

        let thumbs = json!({
            "type": "event_callback",
            "event": {"type": "reaction_added", "user": "U1", "reaction": "thumbsup",
                      "item": {"type": "message", "channel": "C1", "ts": "100.1"}, "event_ts": "300.3"}
        });
        let message = json!({"type": "event_callback", "event": {"type": "message", "channel": "C1", "ts": "1.0"}});

        for body in [thumbs, message] {
            let response = h.app.clone().oneshot(signed_request(&body, 0)).await.map_err(|e| e.to_string())?;
            assert_eq!(response.status(), StatusCode::OK);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.gateway.replies().await.is_empty());
        assert!(h.model.prompts.lock().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn handler_failures_are_reported_in_the_thread() -> Result<(), String> {
        let mut gateway = FakeGateway::with_thread(&[("U1", "100.1", "hi")]);
        gateway.fail_fetch = true;
        let h = harness(gateway, ScriptedModel::default());

        let response = h.app.clone().oneshot(signed_request(&mention("200.2"), 0)).await.map_err(|e| e.to_string())?;
        assert_eq!(response.status(), StatusCode::OK);

        assert_eq!(wait_for_replies(&h.gateway, 1).await, 1);
        let replies = h.gateway.replies().await;
        assert_eq!(replies[0].1, "100.1");
        assert!(replies[0].2.starts_with(":x: Sorry, I couldn't finish that:"));
        Ok(())
    }
}
