use mission_control_core::config::{AppConfig, LoadOptions};
use mission_control_integrations::{build_registry, IntegrationContext};

use super::{CommandResult, EXIT_CONFIG};

/// Prints the tool declarations the model would see, in registration order.
pub fn run(options: LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("tools", "config_validation", error.to_string(), EXIT_CONFIG)
        }
    };

    let context = IntegrationContext::from_config(&config);
    let registry = match build_registry(&config, &context) {
        Ok(registry) => registry,
        Err(error) => return CommandResult::failure("tools", "integrations", error.to_string(), 3),
    };

    match serde_json::to_string_pretty(&registry.tools()) {
        Ok(output) => CommandResult::success(output),
        Err(error) => CommandResult::failure("tools", "serialization", error.to_string(), 1),
    }
}
