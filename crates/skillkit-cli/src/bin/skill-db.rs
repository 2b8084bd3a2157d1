use skillkit_cli::cmd::db::DbCli;
use std::process::ExitCode;

fn main() -> ExitCode {
    skillkit_cli::dispatch::main::<DbCli>()
}
