use std::sync::Arc;

use axum::Router;
use chrono::Utc;
use mission_control_agent::anthropic::{AnthropicClient, AnthropicSettings};
use mission_control_agent::prompt::{build_system_prompt, PromptError};
use mission_control_agent::{AgentRuntime, LlmClient, LlmError, ToolRegistry};
use mission_control_core::config::{AppConfig, ConfigError, LoadOptions};
use mission_control_integrations::slack_data::SLACK_API_URL;
use mission_control_integrations::{
    build_registry, FetchError, IntegrationContext, IntegrationError, ResponseCache, SlackApi,
};
use mission_control_slack::{EventDeduplicator, EventDispatcher, SignatureVerifier, SlackWebGateway};
use thiserror::Error;
use tracing::info;

use crate::dashboard::{self, DashboardState};
use crate::handler::{MentionHandler, ThreadAssistant, TriggerReactionHandler};
use crate::health;
use crate::intake::{self, InFlight, IntakeState};

pub struct Application {
    pub config: AppConfig,
    pub router: Router,
    pub registry: Arc<ToolRegistry>,
    pub dedup: Arc<EventDeduplicator>,
    pub cache: Arc<ResponseCache>,
    pub in_flight: InFlight,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Integrations(#[from] IntegrationError),
    #[error("llm.api_key is required to run the assistant")]
    MissingModelKey,
    #[error("model client setup failed: {0}")]
    Model(#[from] LlmError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("slack web client setup failed: {0}")]
    SlackClient(#[source] FetchError),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

/// Wires config into the registry, agent runtime, Slack intake and dashboard.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", correlation_id = "bootstrap", "starting application bootstrap");

    let context = IntegrationContext::from_config(&config);
    let registry = Arc::new(build_registry(&config, &context)?);

    let settings = AnthropicSettings::from_config(&config.llm).ok_or(BootstrapError::MissingModelKey)?;
    let llm: Arc<dyn LlmClient> = Arc::new(AnthropicClient::new(settings)?);

    let system_prompt = build_system_prompt(&registry.module_summaries(), Utc::now().date_naive())?;
    let runtime = Arc::new(
        AgentRuntime::new(Arc::clone(&llm), Arc::clone(&registry), system_prompt)
            .with_max_iterations(config.agent.max_iterations),
    );
    info!(
        event_name = "system.bootstrap.agent_ready",
        correlation_id = "bootstrap",
        model = %config.llm.model,
        modules = ?registry.module_names(),
        max_iterations = config.agent.max_iterations,
        "agent runtime initialized"
    );

    let slack_api = SlackApi::new(&config.slack.bot_token, SLACK_API_URL, &context).map_err(BootstrapError::SlackClient)?;
    let gateway = Arc::new(SlackWebGateway::new(slack_api));
    let assistant = Arc::new(ThreadAssistant::new(gateway.clone(), runtime));

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(Arc::new(MentionHandler::new(Arc::clone(&assistant))));
    dispatcher.register(Arc::new(TriggerReactionHandler::new(assistant)));

    let dedup = Arc::new(EventDeduplicator::default());
    let in_flight = InFlight::default();
    let intake_state = IntakeState {
        verifier: Arc::new(SignatureVerifier::new(config.slack.signing_secret.clone())),
        dedup: Arc::clone(&dedup),
        dispatcher: Arc::new(dispatcher),
        gateway,
        trigger_reaction: config.slack.trigger_reaction.clone(),
        in_flight: in_flight.clone(),
    };
    let dashboard_state = DashboardState {
        registry: Arc::clone(&registry),
        llm: Some(llm),
        api_key: config.dashboard.api_key.clone(),
    };

    let router = health::router(Arc::clone(&registry))
        .merge(intake::router(intake_state))
        .merge(dashboard::router(dashboard_state));

    Ok(Application { config, router, registry, dedup, cache: context.cache, in_flight })
}
