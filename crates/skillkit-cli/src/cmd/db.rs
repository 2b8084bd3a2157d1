use crate::dispatch::{row_limit, Context, Tool};
use clap::{Parser, Subcommand};
use serde_json::Value;
use skillkit_core::config::Setting;
use skillkit_core::db::{self, Database};
use skillkit_core::process::Dependency;
use skillkit_core::Result;

#[derive(Parser)]
#[command(
    name = "skill-db",
    about = "Read-only PostgreSQL queries through psql",
    version
)]
pub struct DbCli {
    #[command(subcommand)]
    command: DbCommand,
}

#[derive(Subcommand)]
pub enum DbCommand {
    /// Run a single SELECT or WITH statement
    Query {
        sql: String,
        #[arg(default_value_t = 100, value_parser = row_limit())]
        limit: u32,
    },
    /// List public tables with estimated row counts
    Tables,
    /// Show the columns of a table
    Describe { table: String },
}

impl Tool for DbCli {
    const SETTINGS: &'static [Setting] = db::SETTINGS;
    const DEPENDENCIES: &'static [Dependency] = &[db::PSQL];

    fn execute(self, ctx: &Context) -> Result<Value> {
        let database = Database::new(ctx.binary(&db::PSQL)?, &ctx.config)?;
        match self.command {
            DbCommand::Query { sql, limit } => database.query(&sql, limit),
            DbCommand::Tables => database.tables(),
            DbCommand::Describe { table } => database.describe(&table),
        }
    }
}
