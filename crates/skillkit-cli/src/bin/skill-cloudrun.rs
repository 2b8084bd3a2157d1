use skillkit_cli::cmd::cloudrun::CloudRunCli;
use std::process::ExitCode;

fn main() -> ExitCode {
    skillkit_cli::dispatch::main::<CloudRunCli>()
}
