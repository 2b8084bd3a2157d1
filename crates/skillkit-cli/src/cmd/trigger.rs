use crate::dispatch::{hours, limit, Context, Tool};
use clap::{Parser, Subcommand};
use serde_json::Value;
use skillkit_core::config::Setting;
use skillkit_core::trigger::{self, Trigger};
use skillkit_core::Result;

#[derive(Parser)]
#[command(
    name = "skill-trigger",
    about = "Inspect Trigger.dev runs: recent, failed, errors and stats",
    version
)]
pub struct TriggerCli {
    #[command(subcommand)]
    command: TriggerCommand,
}

#[derive(Subcommand)]
pub enum TriggerCommand {
    /// List recent runs, optionally filtered by status
    Runs {
        #[arg(default_value_t = 20, value_parser = limit())]
        limit: u32,
        /// e.g. COMPLETED, FAILED, EXECUTING
        status: Option<String>,
    },
    /// List failed, crashed and timed-out runs
    Failed {
        #[arg(default_value_t = 10, value_parser = limit())]
        limit: u32,
    },
    /// Show one run with its attempts and tags
    Run { run_id: String },
    /// Show the error of a run
    Error { run_id: String },
    /// Aggregate run outcomes over a time window
    Stats {
        #[arg(default_value_t = 24, value_parser = hours())]
        hours: u32,
    },
    /// Replay a run
    Replay { run_id: String },
    /// Cancel a run
    Cancel { run_id: String },
}

impl Tool for TriggerCli {
    const SETTINGS: &'static [Setting] = trigger::SETTINGS;

    fn execute(self, ctx: &Context) -> Result<Value> {
        let api = Trigger::from_config(&ctx.config)?;
        match self.command {
            TriggerCommand::Runs { limit, status } => api.runs(limit, status.as_deref()),
            TriggerCommand::Failed { limit } => api.failed(limit),
            TriggerCommand::Run { run_id } => api.run(&run_id),
            TriggerCommand::Error { run_id } => api.error(&run_id),
            TriggerCommand::Stats { hours } => api.stats(hours, ctx.now),
            TriggerCommand::Replay { run_id } => api.replay(&run_id),
            TriggerCommand::Cancel { run_id } => api.cancel(&run_id),
        }
    }
}
