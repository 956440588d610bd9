//! Agent runtime: the tool-calling conversation loop.
//!
//! This crate owns everything between a Slack request and the model:
//! - the capability-module contract and the [`tools::ToolRegistry`] that
//!   exposes configured modules as prefixed tools
//! - the model-completion contract ([`llm::LlmClient`]) and its Anthropic
//!   implementation
//! - the system prompt and per-run conversation state
//! - [`runtime::AgentRuntime`], the bounded loop that alternates model
//!   completions with concurrent tool execution
//!
//! # Architecture
//!
//! Each run starts from one user turn carrying the thread transcript and the
//! request. Every iteration issues one completion request. A completion
//! without tool calls ends the run with its text; otherwise every tool call
//! is executed concurrently through the registry and the results are fed
//! back as a single user turn. Runs stop at an iteration ceiling.
//!
//! # Key Types
//!
//! - `CapabilityModule` - uniform adapter over one backend (see `tools`)
//! - `ToolRegistry` - ordered module table, dispatch and read fan-out
//! - `LlmClient` - pluggable completion provider
//! - `AgentRuntime` - the loop (see `runtime`)

pub mod anthropic;
pub mod conversation;
pub mod llm;
pub mod prompt;
pub mod runtime;
pub mod schema;
pub mod tools;

pub use conversation::Placeholders;
pub use llm::{LlmClient, LlmError};
pub use runtime::{AgentError, AgentRequest, AgentRuntime};
pub use schema::{FieldKind, InputSchema};
pub use tools::{
    parse_action, ActionDeclaration, CapabilityModule, ToolDefinition, ToolOutcome, ToolRegistry,
};
