use crate::dispatch::{hours, limit, Context, Tool};
use clap::{Parser, Subcommand};
use serde_json::Value;
use skillkit_core::config::Setting;
use skillkit_core::posthog::{self, PostHog};
use skillkit_core::Result;

#[derive(Parser)]
#[command(
    name = "skill-posthog",
    about = "Query PostHog: exceptions, web vitals, LLM usage, HogQL and insights",
    version
)]
pub struct PostHogCli {
    #[command(subcommand)]
    command: PostHogCommand,
}

#[derive(Subcommand)]
pub enum PostHogCommand {
    /// Top exceptions by occurrence
    Errors {
        #[arg(default_value_t = 24, value_parser = hours())]
        hours: u32,
        #[arg(default_value_t = 20, value_parser = limit())]
        limit: u32,
    },
    /// Largest Contentful Paint per page
    Perf {
        #[arg(default_value_t = 24, value_parser = hours())]
        hours: u32,
        #[arg(default_value_t = 20, value_parser = limit())]
        limit: u32,
    },
    /// LLM generations, tokens and cost per model
    Llm {
        #[arg(default_value_t = 24, value_parser = hours())]
        hours: u32,
    },
    /// Run a HogQL query
    Query { hogql: String },
    /// List saved insights
    Insights {
        #[arg(default_value_t = 20, value_parser = limit())]
        limit: u32,
    },
    /// Run a saved insight's query
    Insight { id: u64 },
    /// Find dashboard insights that were never saved
    Triage,
    /// Save every dashboard insight reported by triage
    TriageFix,
}

impl Tool for PostHogCli {
    const SETTINGS: &'static [Setting] = posthog::SETTINGS;

    fn execute(self, ctx: &Context) -> Result<Value> {
        let api = PostHog::from_config(&ctx.config)?;
        match self.command {
            PostHogCommand::Errors { hours, limit } => api.errors(hours, limit, ctx.now),
            PostHogCommand::Perf { hours, limit } => api.perf(hours, limit, ctx.now),
            PostHogCommand::Llm { hours } => api.llm(hours, ctx.now),
            PostHogCommand::Query { hogql } => api.query(&hogql),
            PostHogCommand::Insights { limit } => api.insights(limit),
            PostHogCommand::Insight { id } => api.insight(id),
            PostHogCommand::Triage => api.triage(),
            PostHogCommand::TriageFix => api.triage_fix(),
        }
    }
}
