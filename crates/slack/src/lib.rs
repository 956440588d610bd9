//! Slack Events API intake for the assistant.
//!
//! # Architecture
//!
//! A webhook request passes through three stages before any work starts:
//!
//! 1. [`signature::SignatureVerifier`] checks the `v0` HMAC and timestamp.
//! 2. [`events::parse_envelope`] decodes the body into a typed envelope.
//! 3. [`dedup::EventDeduplicator`] drops repeated deliveries of one event.
//!
//! Accepted events go to the [`events::EventDispatcher`], whose handlers talk
//! back to Slack through the [`web::SlackGateway`] trait. Thread transcripts
//! and instruction cleanup live in [`thread`].
//!
//! # Key Types
//!
//! - `SlackEnvelope` / `SlackEvent` - decoded request bodies
//! - `EventHandler` - per-event-type async handler
//! - `SlackGateway` - thread reads and replies (`SlackWebGateway` in production)

pub mod dedup;
pub mod events;
pub mod signature;
pub mod thread;
pub mod web;

pub use dedup::EventDeduplicator;
pub use events::{
    parse_envelope, EventContext, EventDispatcher, EventHandler, EventHandlerError, HandlerResult,
    SlackEnvelope, SlackEvent, SlackEventType,
};
pub use signature::{SignatureError, SignatureVerifier};
pub use web::{GatewayError, SlackGateway, SlackWebGateway, ThreadMessage};
