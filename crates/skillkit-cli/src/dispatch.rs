//! Shared `main` for every `skill-*` binary.
//!
//! Order of checks: help and unknown commands first, then external
//! dependencies, then required settings, then argument errors, then the
//! handler. Whatever happens, exactly one JSON document reaches stdout.

use crate::output::print_json;
use chrono::{DateTime, Utc};
use clap::builder::RangedI64ValueParser;
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{value_parser, CommandFactory, Parser};
use serde_json::{json, Value};
use skillkit_core::config::{Config, EnvSource, Resolver, Setting, Source};
use skillkit_core::process::Dependency;
use skillkit_core::{Result, SkillError};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// A command-line tool over one upstream service.
pub trait Tool: Parser {
    /// Settings resolved for every invocation. Credentials and required
    /// settings are enforced unless the verb is offline.
    const SETTINGS: &'static [Setting];

    /// Binaries that must be on PATH.
    const DEPENDENCIES: &'static [Dependency] = &[];

    /// Verbs that run without dependencies or required settings.
    const OFFLINE: &'static [&'static str] = &[];

    /// Extra config sources consulted right after the environment.
    fn overlays(_home: Option<&Path>) -> Vec<Box<dyn Source>> {
        Vec::new()
    }

    fn execute(self, ctx: &Context) -> Result<Value>;
}

// ---------------------------------------------------------------------------
// Clap value parsers
// ---------------------------------------------------------------------------

pub fn limit() -> RangedI64ValueParser<u32> {
    value_parser!(u32).range(1..=100)
}

pub fn row_limit() -> RangedI64ValueParser<u32> {
    value_parser!(u32).range(1..=1000)
}

/// At most thirty days back.
pub fn hours() -> RangedI64ValueParser<u32> {
    value_parser!(u32).range(1..=720)
}

// ---------------------------------------------------------------------------
// Environment + Context
// ---------------------------------------------------------------------------

/// Everything a run reads from the outside world besides argv.
#[derive(Debug, Clone)]
pub struct Environment {
    pub vars: EnvSource,
    pub cwd: PathBuf,
    pub home: Option<PathBuf>,
}

impl Environment {
    pub fn from_process() -> Self {
        Self {
            vars: EnvSource::from_process(),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            home: home::home_dir(),
        }
    }

    fn resolver<T: Tool>(&self) -> Resolver {
        let home = self.home.as_deref();
        let mut resolver = Resolver::standard(self.vars.clone(), &self.cwd, home);
        // Each overlay lands directly after the environment; insert in reverse
        // so they keep their declared order.
        for source in T::overlays(home).into_iter().rev() {
            resolver = resolver.with_overlay(source);
        }
        resolver
    }
}

pub struct Context {
    pub config: Config,
    pub now: DateTime<Utc>,
    pub home: Option<PathBuf>,
    located: Vec<(&'static str, PathBuf)>,
}

impl Context {
    pub fn new(config: Config, now: DateTime<Utc>, home: Option<PathBuf>) -> Self {
        Self {
            config,
            now,
            home,
            located: Vec::new(),
        }
    }

    /// Path of a dependency, reusing the lookup done before execution.
    pub fn binary(&self, dep: &Dependency) -> Result<PathBuf> {
        match self.located.iter().find(|(name, _)| *name == dep.binary) {
            Some((_, path)) => Ok(path.clone()),
            None => dep.locate(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn main<T: Tool>() -> ExitCode {
    init_tracing();
    let env = Environment::from_process();
    finish(dispatch::<T, _, _>(std::env::args_os(), &env))
}

pub fn init_tracing() {
    // stdout carries the JSON document; logs go to stderr.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Print the outcome and pick the exit code.
pub fn finish(outcome: Result<Value>) -> ExitCode {
    let (document, code) = match outcome {
        Ok(value) => (value, ExitCode::SUCCESS),
        Err(e) => {
            tracing::debug!(error = %e, "command failed");
            (e.to_json(), ExitCode::FAILURE)
        }
    };
    if let Err(e) = print_json(&document) {
        eprintln!("error: {e:#}");
        return ExitCode::FAILURE;
    }
    code
}

pub fn dispatch<T, I, A>(argv: I, env: &Environment) -> Result<Value>
where
    T: Tool,
    I: IntoIterator<Item = A>,
    A: Into<OsString>,
{
    let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
    let verb = argv
        .iter()
        .skip(1)
        .map(|a| a.to_string_lossy().into_owned())
        .find(|a| !a.starts_with('-'));

    let parsed = match T::try_parse_from(&argv) {
        Ok(tool) => Ok(tool),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            | ErrorKind::DisplayVersion => return Ok(help::<T>()),
            ErrorKind::InvalidSubcommand => return Err(unknown_command::<T>(&err)),
            _ => Err(err),
        },
    };

    let offline = verb.as_deref().is_some_and(|v| T::OFFLINE.contains(&v));
    let mut located = Vec::new();
    if !offline {
        for dep in T::DEPENDENCIES {
            located.push((dep.binary, dep.locate()?));
        }
    }

    let config = env.resolver::<T>().resolve(T::SETTINGS);
    if !offline {
        config.check(T::SETTINGS)?;
    }

    let tool = parsed.map_err(|e| argument_error(&e))?;
    let ctx = Context {
        located,
        ..Context::new(config, Utc::now(), env.home.clone())
    };
    tracing::debug!(verb = verb.as_deref().unwrap_or_default(), "executing");
    tool.execute(&ctx)
}

// ---------------------------------------------------------------------------
// Help + clap error mapping
// ---------------------------------------------------------------------------

/// `{"tool", "version", "usage", "commands": [{name, about, usage}]}`.
pub fn help<T: Tool>() -> Value {
    let mut cmd = T::command();
    cmd.build();
    let names: Vec<String> = subcommand_names(&cmd);
    let commands: Vec<Value> = names
        .iter()
        .filter_map(|name| {
            let sub = cmd.find_subcommand_mut(name)?;
            Some(json!({
                "name": name,
                "about": sub.get_about().map(|a| a.to_string()),
                "usage": plain_usage(&sub.render_usage().to_string()),
            }))
        })
        .collect();
    json!({
        "tool": cmd.get_name(),
        "version": cmd.get_version(),
        "about": cmd.get_about().map(|a| a.to_string()),
        "usage": plain_usage(&cmd.render_usage().to_string()),
        "commands": commands,
    })
}

fn subcommand_names(cmd: &clap::Command) -> Vec<String> {
    cmd.get_subcommands()
        .filter(|s| !s.is_hide_set() && s.get_name() != "help")
        .map(|s| s.get_name().to_string())
        .collect()
}

fn plain_usage(rendered: &str) -> String {
    rendered
        .trim()
        .strip_prefix("Usage:")
        .unwrap_or(rendered)
        .trim()
        .to_string()
}

fn unknown_command<T: Tool>(err: &clap::Error) -> SkillError {
    SkillError::UnknownCommand {
        command: context_string(err, ContextKind::InvalidSubcommand).unwrap_or_default(),
        available: subcommand_names(&T::command()),
    }
}

fn argument_error(err: &clap::Error) -> SkillError {
    let usage = context_string(err, ContextKind::Usage).map(|u| plain_usage(&u));
    let arg = context_string(err, ContextKind::InvalidArg).unwrap_or_default();
    match err.kind() {
        ErrorKind::MissingRequiredArgument => SkillError::MissingArgument {
            name: arg_name(&arg),
            usage: usage.unwrap_or_default(),
        },
        ErrorKind::ValueValidation | ErrorKind::InvalidValue => SkillError::InvalidArgument {
            name: arg_name(&arg),
            value: context_string(err, ContextKind::InvalidValue).unwrap_or_default(),
            usage,
        },
        _ => SkillError::InvalidArgument {
            name: "argument".to_string(),
            value: if arg.is_empty() {
                err.kind().to_string()
            } else {
                arg
            },
            usage,
        },
    }
}

fn context_string(err: &clap::Error, kind: ContextKind) -> Option<String> {
    match err.get(kind)? {
        ContextValue::String(s) => Some(s.clone()),
        ContextValue::Strings(v) => v.first().cloned(),
        ContextValue::StyledStr(s) => Some(s.to_string()),
        _ => None,
    }
}

/// `<RUN_ID>` → `run_id`, `[LIMIT]` → `limit`, `--hours <HOURS>` → `hours`.
fn arg_name(display: &str) -> String {
    display
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_start_matches('-')
        .trim_matches(|c| matches!(c, '<' | '>' | '[' | ']' | '.'))
        .to_lowercase()
        .replace('-', "_")
}
