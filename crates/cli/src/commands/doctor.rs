use mission_control_core::config::{AppConfig, LoadOptions};
use mission_control_integrations::{default_modules, IntegrationContext};
use serde::Serialize;

use super::{escape_json, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: impl Into<String>, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name: name.into(), status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    configured_modules: Vec<String>,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if !json_output {
        return CommandResult { exit_code, output: render_human(&report) };
    }

    let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
        format!(
            "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
            escape_json(&error.to_string())
        )
    });
    CommandResult { exit_code, output }
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();
    let mut configured_modules = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_model_key(&config));
            checks.push(check_dashboard_key(&config));
            checks.extend(check_modules(&config, &mut configured_modules));
        }
        Err(error) => {
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()));
            checks.push(DoctorCheck::new(
                "modules",
                CheckStatus::Skipped,
                "skipped because configuration did not load",
            ));
        }
    }

    // Unconfigured modules are reported as skipped; only failures fail the run.
    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        format!("doctor: ready with {} configured module(s)", configured_modules.len())
    };

    DoctorReport { overall_status, summary, configured_modules, checks }
}

fn check_model_key(config: &AppConfig) -> DoctorCheck {
    match config.llm.api_key {
        Some(_) => DoctorCheck::new("llm_api_key", CheckStatus::Pass, format!("model `{}`", config.llm.model)),
        None => DoctorCheck::new("llm_api_key", CheckStatus::Fail, "llm.api_key is required to run the assistant"),
    }
}

fn check_dashboard_key(config: &AppConfig) -> DoctorCheck {
    match config.dashboard.api_key {
        Some(_) => DoctorCheck::new("dashboard_api_key", CheckStatus::Pass, "dashboard routes require a key"),
        None => DoctorCheck::new(
            "dashboard_api_key",
            CheckStatus::Skipped,
            "no dashboard.api_key set; dashboard routes are open",
        ),
    }
}

fn check_modules(config: &AppConfig, configured: &mut Vec<String>) -> Vec<DoctorCheck> {
    let context = IntegrationContext::from_config(config);
    let modules = match default_modules(config, &context) {
        Ok(modules) => modules,
        Err(error) => return vec![DoctorCheck::new("modules", CheckStatus::Fail, error.to_string())],
    };

    modules
        .iter()
        .map(|module| {
            let name = format!("module:{}", module.name());
            if module.is_configured() {
                configured.push(module.name().to_string());
                DoctorCheck::new(
                    name,
                    CheckStatus::Pass,
                    format!("configured with {} action(s)", module.actions().len()),
                )
            } else {
                DoctorCheck::new(name, CheckStatus::Skipped, "not configured; its tools are hidden")
            }
        })
        .collect()
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
