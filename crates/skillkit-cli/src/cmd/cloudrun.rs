use crate::dispatch::{hours, limit, Context, Tool};
use crate::output::note;
use clap::{Parser, Subcommand};
use serde_json::Value;
use skillkit_core::cloudrun::{self, CloudRunLogs, CloudRunSettings, Scope};
use skillkit_core::config::{Setting, Source};
use skillkit_core::process::Dependency;
use skillkit_core::{Result, SkillError};
use std::path::Path;

#[derive(Parser)]
#[command(
    name = "skill-cloudrun",
    about = "Read Cloud Run service logs through gcloud",
    version
)]
pub struct CloudRunCli {
    #[command(subcommand)]
    command: CloudRunCommand,
}

#[derive(Subcommand)]
pub enum CloudRunCommand {
    /// Save the service coordinates to the settings file
    Init {
        service: String,
        project: String,
        #[arg(default_value = "us-central1")]
        region: String,
        /// gcloud account to impersonate, e.g. ops@example.com
        account: Option<String>,
    },
    /// Show resolved settings and where they are stored
    Config,
    /// Entries at ERROR severity or above
    Errors {
        #[arg(default_value_t = 24, value_parser = hours())]
        hours: u32,
        #[arg(default_value_t = 50, value_parser = limit())]
        limit: u32,
    },
    /// Most recent entries of any severity
    Recent {
        #[arg(default_value_t = 1, value_parser = hours())]
        hours: u32,
        #[arg(default_value_t = 50, value_parser = limit())]
        limit: u32,
    },
    /// Entries whose text or JSON message contains TEXT
    Search {
        text: String,
        #[arg(default_value_t = 24, value_parser = hours())]
        hours: u32,
        #[arg(default_value_t = 50, value_parser = limit())]
        limit: u32,
    },
}

impl Tool for CloudRunCli {
    const SETTINGS: &'static [Setting] = cloudrun::SETTINGS;
    const DEPENDENCIES: &'static [Dependency] = &[cloudrun::GCLOUD];
    const OFFLINE: &'static [&'static str] = &["init", "config"];

    fn overlays(home: Option<&Path>) -> Vec<Box<dyn Source>> {
        cloudrun::settings_source(home)
            .map(|s| Box::new(s) as Box<dyn Source>)
            .into_iter()
            .collect()
    }

    fn execute(self, ctx: &Context) -> Result<Value> {
        match self.command {
            CloudRunCommand::Init {
                service,
                project,
                region,
                account,
            } => {
                let settings =
                    CloudRunSettings::new(&service, &project, &region, account.as_deref())?;
                cloudrun::init(ctx.home.as_deref(), &settings)
            }
            CloudRunCommand::Config => Ok(cloudrun::show_config(&ctx.config, ctx.home.as_deref())),
            CloudRunCommand::Errors { hours, limit } => read(ctx, Scope::Errors, hours, limit),
            CloudRunCommand::Recent { hours, limit } => read(ctx, Scope::Recent, hours, limit),
            CloudRunCommand::Search { text, hours, limit } => {
                if text.trim().is_empty() {
                    return Err(SkillError::invalid("text", text));
                }
                read(ctx, Scope::Search(text), hours, limit)
            }
        }
    }
}

fn read(ctx: &Context, scope: Scope, hours: u32, limit: u32) -> Result<Value> {
    let settings = CloudRunSettings::from_config(&ctx.config)?;
    let filter = cloudrun::build_filter(&settings, &scope);
    note(&format!("Filter: {filter}"));
    let gcloud = ctx.binary(&cloudrun::GCLOUD)?;
    CloudRunLogs::new(gcloud, settings).read(&filter, hours, limit)
}
