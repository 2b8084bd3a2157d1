use skillkit_cli::cmd::posthog::PostHogCli;
use std::process::ExitCode;

fn main() -> ExitCode {
    skillkit_cli::dispatch::main::<PostHogCli>()
}
