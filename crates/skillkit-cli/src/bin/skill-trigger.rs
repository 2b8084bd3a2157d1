use skillkit_cli::cmd::trigger::TriggerCli;
use std::process::ExitCode;

fn main() -> ExitCode {
    skillkit_cli::dispatch::main::<TriggerCli>()
}
