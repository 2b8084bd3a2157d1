use skillkit_cli::cmd::sentry::SentryCli;
use std::process::ExitCode;

fn main() -> ExitCode {
    skillkit_cli::dispatch::main::<SentryCli>()
}
