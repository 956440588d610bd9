//! Capability modules for the external backends the assistant can act on.
//!
//! # Architecture
//!
//! Each backend lives in its own module directory with three layers:
//!
//! - `client`: typed wrapper over [`fetch::RestClient`] (auth headers,
//!   endpoint paths, request bodies).
//! - `reads`: dashboard reads (activity, metrics, alerts) computed from
//!   client calls.
//! - `mod`: the [`CapabilityModule`] implementation with its action
//!   declarations and typed action enum.
//!
//! All clients share one [`IntegrationContext`], so retries, timeouts and the
//! reference-data cache behave identically across backends.

pub mod common;
pub mod fetch;
pub mod github;
pub mod notion;
pub mod shortcut;
pub mod slack_data;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;
use std::time::Duration;

use mission_control_agent::{CapabilityModule, ToolRegistry};
use mission_control_core::AppConfig;
use thiserror::Error;
use tracing::info;

pub use fetch::{ApiRequest, FetchError, ResponseCache, RestClient, RetryPolicy};
pub use github::GithubModule;
pub use notion::NotionModule;
pub use shortcut::ShortcutModule;
pub use slack_data::{SlackApi, SlackDataModule};

/// Shared outbound-call settings handed to every client.
#[derive(Clone, Debug)]
pub struct IntegrationContext {
    pub policy: RetryPolicy,
    pub cache: Arc<ResponseCache>,
    /// TTL for cached reference data (members, workflows, labels, projects).
    pub reference_ttl: Duration,
}

impl IntegrationContext {
    pub fn from_config(config: &AppConfig) -> Self {
        let ttl = Duration::from_secs(config.http.cache_ttl_secs);
        Self {
            policy: RetryPolicy::from_config(&config.http),
            cache: Arc::new(ResponseCache::new(ttl)),
            reference_ttl: ttl,
        }
    }
}

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("failed to build {module} client: {source}")]
    Client {
        module: &'static str,
        #[source]
        source: FetchError,
    },
    #[error(transparent)]
    Registry(#[from] mission_control_agent::tools::RegistryError),
}

/// Every known module in canonical registration order, configured or not.
pub fn default_modules(
    config: &AppConfig,
    context: &IntegrationContext,
) -> Result<Vec<Arc<dyn CapabilityModule>>, IntegrationError> {
    let shortcut = ShortcutModule::from_config(&config.shortcut, context)
        .map_err(|source| IntegrationError::Client { module: "shortcut", source })?;
    let github = GithubModule::from_config(&config.github, context)
        .map_err(|source| IntegrationError::Client { module: "github", source })?;
    let notion = NotionModule::from_config(&config.notion, context)
        .map_err(|source| IntegrationError::Client { module: "notion", source })?;
    let slack_data = SlackDataModule::from_config(&config.slack, context)
        .map_err(|source| IntegrationError::Client { module: "slack_data", source })?;

    Ok(vec![Arc::new(shortcut), Arc::new(github), Arc::new(notion), Arc::new(slack_data)])
}

/// Registers the configured subset of [`default_modules`].
pub fn build_registry(
    config: &AppConfig,
    context: &IntegrationContext,
) -> Result<ToolRegistry, IntegrationError> {
    let mut registry = ToolRegistry::new();
    for module in default_modules(config, context)? {
        registry.register_shared(module)?;
    }

    info!(
        event_name = "integrations.registry.ready",
        modules = ?registry.module_names(),
        tools = registry.tools().len(),
        "tool registry assembled"
    );
    Ok(registry)
}
