pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mission_control_core::config::LoadOptions;

#[derive(Debug, Parser)]
#[command(
    name = "mission-control",
    about = "Mission Control operator CLI",
    long_about = "Check readiness of the Slack assistant and inspect the tools it will expose to the model.",
    after_help = "Examples:\n  mission-control doctor --json\n  mission-control tools\n  mission-control --config ./mission-control.toml doctor"
)]
pub struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Read configuration from this file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Validate config and report which integration modules are configured")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print the JSON catalog of tools the configured modules expose")]
    Tools,
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        match &self.config {
            Some(path) => LoadOptions {
                config_path: Some(path.clone()),
                require_file: true,
                ..LoadOptions::default()
            },
            None => LoadOptions::default(),
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    let result = match cli.command {
        Command::Doctor { json } => commands::doctor::run(options, json),
        Command::Tools => commands::tools::run(options),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
