use crate::dispatch::{hours, limit, Context, Tool};
use clap::{Parser, Subcommand};
use serde_json::Value;
use skillkit_core::config::Setting;
use skillkit_core::sentry::{self, Sentry};
use skillkit_core::Result;

#[derive(Parser)]
#[command(
    name = "skill-sentry",
    about = "Inspect Sentry issues, latest events and transaction performance",
    version
)]
pub struct SentryCli {
    #[command(subcommand)]
    command: SentryCommand,
}

#[derive(Subcommand)]
pub enum SentryCommand {
    /// List project issues
    Issues {
        #[arg(default_value_t = 20, value_parser = limit())]
        limit: u32,
        /// Sentry search syntax
        #[arg(default_value = "is:unresolved")]
        query: String,
    },
    /// Show one issue
    Issue { issue_id: String },
    /// Latest event of an issue with its stack trace
    Latest { issue_id: String },
    /// Mark an issue resolved
    Resolve { issue_id: String },
    /// Slowest transactions, sorted by p95 duration
    Perf {
        #[arg(default_value_t = 24, value_parser = hours())]
        hours: u32,
        #[arg(default_value_t = 20, value_parser = limit())]
        limit: u32,
    },
}

impl Tool for SentryCli {
    const SETTINGS: &'static [Setting] = sentry::SETTINGS;

    fn execute(self, ctx: &Context) -> Result<Value> {
        let api = Sentry::from_config(&ctx.config)?;
        match self.command {
            SentryCommand::Issues { limit, query } => api.issues(limit, &query),
            SentryCommand::Issue { issue_id } => api.issue(&issue_id),
            SentryCommand::Latest { issue_id } => api.latest(&issue_id),
            SentryCommand::Resolve { issue_id } => api.resolve(&issue_id),
            SentryCommand::Perf { hours, limit } => api.perf(hours, limit),
        }
    }
}
