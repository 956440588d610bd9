use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENV_PREFIX: &str = "MISSION_CONTROL_";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub http: HttpConfig,
    pub shortcut: ShortcutConfig,
    pub github: GithubConfig,
    pub notion: NotionConfig,
    pub dashboard: DashboardConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub bot_token: SecretString,
    pub signing_secret: SecretString,
    /// Emoji name (without colons) that turns a reaction into a request.
    pub trigger_reaction: String,
    /// Exposes Slack search and history as agent tools.
    pub data_enabled: bool,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_iterations: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

/// Outbound REST behaviour shared by every integration client.
#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub cache_ttl_secs: u64,
}

#[derive(Clone, Debug, Default)]
pub struct ShortcutConfig {
    pub api_token: Option<SecretString>,
    pub default_project_id: Option<i64>,
    pub default_workflow_state_id: Option<i64>,
    /// Restricts dashboard reads to one workflow; all workflows when unset.
    pub workflow_name: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct GithubConfig {
    pub token: Option<SecretString>,
    /// Allowed repositories in `owner/repo` form.
    pub repos: Vec<String>,
    pub org: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct NotionConfig {
    pub token: Option<SecretString>,
    pub allowed_databases: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct DashboardConfig {
    pub api_key: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_model: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_signing_secret: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                bot_token: String::new().into(),
                signing_secret: String::new().into(),
                trigger_reaction: "ticket".to_string(),
                data_enabled: false,
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.anthropic.com".to_string(),
                model: "claude-sonnet-4-20250514".to_string(),
                max_tokens: 4096,
                timeout_secs: 120,
            },
            agent: AgentConfig { max_iterations: 15 },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 3000,
                graceful_shutdown_secs: 15,
            },
            http: HttpConfig {
                timeout_ms: 10_000,
                max_attempts: 3,
                base_delay_ms: 200,
                cache_ttl_secs: 300,
            },
            shortcut: ShortcutConfig::default(),
            github: GithubConfig::default(),
            notion: NotionConfig::default(),
            dashboard: DashboardConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

/// Blank strings count as "not configured".
fn optional_secret(value: String) -> Option<SecretString> {
    (!value.trim().is_empty()).then(|| secret_value(value))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("mission-control.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(bot_token) = slack.bot_token {
                self.slack.bot_token = secret_value(bot_token);
            }
            if let Some(signing_secret) = slack.signing_secret {
                self.slack.signing_secret = secret_value(signing_secret);
            }
            if let Some(trigger_reaction) = slack.trigger_reaction {
                self.slack.trigger_reaction = trigger_reaction;
            }
            if let Some(data_enabled) = slack.data_enabled {
                self.slack.data_enabled = data_enabled;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = optional_secret(api_key);
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_iterations) = agent.max_iterations {
                self.agent.max_iterations = max_iterations;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(http) = patch.http {
            if let Some(timeout_ms) = http.timeout_ms {
                self.http.timeout_ms = timeout_ms;
            }
            if let Some(max_attempts) = http.max_attempts {
                self.http.max_attempts = max_attempts;
            }
            if let Some(base_delay_ms) = http.base_delay_ms {
                self.http.base_delay_ms = base_delay_ms;
            }
            if let Some(cache_ttl_secs) = http.cache_ttl_secs {
                self.http.cache_ttl_secs = cache_ttl_secs;
            }
        }

        if let Some(shortcut) = patch.shortcut {
            if let Some(api_token) = shortcut.api_token {
                self.shortcut.api_token = optional_secret(api_token);
            }
            if let Some(project_id) = shortcut.default_project_id {
                self.shortcut.default_project_id = Some(project_id);
            }
            if let Some(state_id) = shortcut.default_workflow_state_id {
                self.shortcut.default_workflow_state_id = Some(state_id);
            }
            if let Some(workflow_name) = shortcut.workflow_name {
                self.shortcut.workflow_name = Some(workflow_name);
            }
        }

        if let Some(github) = patch.github {
            if let Some(token) = github.token {
                self.github.token = optional_secret(token);
            }
            if let Some(repos) = github.repos {
                self.github.repos = repos;
            }
            if let Some(org) = github.org {
                self.github.org = Some(org).filter(|org| !org.trim().is_empty());
            }
        }

        if let Some(notion) = patch.notion {
            if let Some(token) = notion.token {
                self.notion.token = optional_secret(token);
            }
            if let Some(allowed_databases) = notion.allowed_databases {
                self.notion.allowed_databases = allowed_databases;
            }
        }

        if let Some(dashboard) = patch.dashboard {
            if let Some(api_key) = dashboard.api_key {
                self.dashboard.api_key = optional_secret(api_key);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SLACK_BOT_TOKEN") {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("SLACK_SIGNING_SECRET") {
            self.slack.signing_secret = secret_value(value);
        }
        if let Some(value) = read_env("SLACK_TRIGGER_REACTION") {
            self.slack.trigger_reaction = value;
        }
        if let Some(value) = read_env("SLACK_DATA_ENABLED") {
            self.slack.data_enabled = parse_bool("SLACK_DATA_ENABLED", &value)?;
        }

        if let Some(value) = read_env("LLM_API_KEY") {
            self.llm.api_key = optional_secret(value);
        }
        if let Some(value) = read_env("LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("AGENT_MAX_ITERATIONS") {
            self.agent.max_iterations = parse_u32("AGENT_MAX_ITERATIONS", &value)?;
        }

        if let Some(value) = read_env("SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SERVER_PORT") {
            self.server.port = parse_u16("SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("HTTP_TIMEOUT_MS") {
            self.http.timeout_ms = parse_u64("HTTP_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("HTTP_MAX_ATTEMPTS") {
            self.http.max_attempts = parse_u32("HTTP_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("HTTP_BASE_DELAY_MS") {
            self.http.base_delay_ms = parse_u64("HTTP_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("HTTP_CACHE_TTL_SECS") {
            self.http.cache_ttl_secs = parse_u64("HTTP_CACHE_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("SHORTCUT_API_TOKEN") {
            self.shortcut.api_token = optional_secret(value);
        }
        if let Some(value) = read_env("SHORTCUT_PROJECT_ID") {
            self.shortcut.default_project_id = Some(parse_i64("SHORTCUT_PROJECT_ID", &value)?);
        }
        if let Some(value) = read_env("SHORTCUT_WORKFLOW_STATE_ID") {
            self.shortcut.default_workflow_state_id =
                Some(parse_i64("SHORTCUT_WORKFLOW_STATE_ID", &value)?);
        }
        if let Some(value) = read_env("SHORTCUT_WORKFLOW_NAME") {
            self.shortcut.workflow_name = Some(value);
        }

        if let Some(value) = read_env("GITHUB_TOKEN") {
            self.github.token = optional_secret(value);
        }
        if let Some(value) = read_env("GITHUB_REPOS") {
            self.github.repos = parse_list(&value);
        }
        if let Some(value) = read_env("GITHUB_ORG") {
            self.github.org = Some(value);
        }

        if let Some(value) = read_env("NOTION_TOKEN") {
            self.notion.token = optional_secret(value);
        }
        if let Some(value) = read_env("NOTION_ALLOWED_DATABASES") {
            self.notion.allowed_databases = parse_list(&value);
        }

        if let Some(value) = read_env("DASHBOARD_API_KEY") {
            self.dashboard.api_key = optional_secret(value);
        }

        let log_level = read_env("LOGGING_LEVEL").or_else(|| read_env("LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("LOGGING_FORMAT").or_else(|| read_env("LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(bot_token);
        }
        if let Some(signing_secret) = overrides.slack_signing_secret {
            self.slack.signing_secret = secret_value(signing_secret);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_server(&self.server)?;
        validate_http(&self.http)?;
        validate_github(&self.github)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("mission-control.toml"), PathBuf::from("config/mission-control.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xoxp-") {
            " (hint: you may have used a user token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    if slack.signing_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.signing_secret is required. Get it from https://api.slack.com/apps > Your App > Basic Information > Signing Secret".to_string()
        ));
    }

    let reaction = slack.trigger_reaction.trim();
    if reaction.is_empty() || reaction.contains(':') || reaction.contains(char::is_whitespace) {
        return Err(ConfigError::Validation(
            "slack.trigger_reaction must be a bare emoji name such as `ticket`".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    if !llm.base_url.starts_with("http://") && !llm.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    // api_key is checked at bootstrap and by `doctor`.
    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_iterations == 0 || agent.max_iterations > 100 {
        return Err(ConfigError::Validation(
            "agent.max_iterations must be in range 1..=100".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_http(http: &HttpConfig) -> Result<(), ConfigError> {
    if http.timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "http.timeout_ms must be greater than zero".to_string(),
        ));
    }
    if http.max_attempts == 0 || http.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "http.max_attempts must be in range 1..=10".to_string(),
        ));
    }
    if http.cache_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "http.cache_ttl_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_github(github: &GithubConfig) -> Result<(), ConfigError> {
    for repo in &github.repos {
        let valid = matches!(
            repo.split_once('/'),
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/')
        );
        if !valid {
            return Err(ConfigError::Validation(format!(
                "github.repos entry `{repo}` must use the `owner/repo` form"
            )));
        }
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{key}")).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: format!("{ENV_PREFIX}{key}"), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.trim().parse::<i64>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().to_ascii_lowercase().parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    server: Option<ServerPatch>,
    http: Option<HttpPatch>,
    shortcut: Option<ShortcutPatch>,
    github: Option<GithubPatch>,
    notion: Option<NotionPatch>,
    dashboard: Option<DashboardPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    bot_token: Option<String>,
    signing_secret: Option<String>,
    trigger_reaction: Option<String>,
    data_enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_iterations: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct HttpPatch {
    timeout_ms: Option<u64>,
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    cache_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ShortcutPatch {
    api_token: Option<String>,
    default_project_id: Option<i64>,
    default_workflow_state_id: Option<i64>,
    workflow_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GithubPatch {
    token: Option<String>,
    repos: Option<Vec<String>>,
    org: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NotionPatch {
    token: Option<String>,
    allowed_databases: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct DashboardPatch {
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
