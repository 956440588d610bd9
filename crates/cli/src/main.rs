use std::process::ExitCode;

fn main() -> ExitCode {
    mission_control_cli::run()
}
