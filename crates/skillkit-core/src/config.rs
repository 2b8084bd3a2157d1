//! Credential and setting resolution.
//!
//! A [`Resolver`] holds an ordered list of [`Source`]s. For each requested
//! [`Setting`] the sources are asked in order and the first non-empty value
//! wins; later sources are never consulted for that setting. The standard
//! chain is:
//!
//! 1. the process environment,
//! 2. the first `.env` found walking up from the working directory,
//! 3. `~/.config/skillkit/.env`.
//!
//! Tools may layer extra sources right after the environment (see
//! [`Resolver::with_overlay`]). Resolution never fails: unresolved settings
//! come back empty and [`Config::check`] decides whether that is fatal.

use crate::error::{Result, SkillError};
use crate::paths;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Setting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    /// A secret; absence is reported as `missing_api_key`.
    Credential,
    /// A required non-secret value; absence is `missing_config`.
    Required,
    Optional,
}

/// Static description of one environment-style setting.
#[derive(Debug, Clone, Copy)]
pub struct Setting {
    pub name: &'static str,
    pub kind: SettingKind,
    pub default: Option<&'static str>,
    pub fix: &'static str,
}

impl Setting {
    pub const fn credential(name: &'static str, fix: &'static str) -> Self {
        Self {
            name,
            kind: SettingKind::Credential,
            default: None,
            fix,
        }
    }

    pub const fn required(name: &'static str, fix: &'static str) -> Self {
        Self {
            name,
            kind: SettingKind::Required,
            default: None,
            fix,
        }
    }

    pub const fn optional(name: &'static str, default: Option<&'static str>) -> Self {
        Self {
            name,
            kind: SettingKind::Optional,
            default,
            fix: "",
        }
    }

    fn missing(&self) -> SkillError {
        let setting = self.name.to_string();
        let fix = self.fix.to_string();
        match self.kind {
            SettingKind::Credential => SkillError::MissingApiKey { setting, fix },
            _ => SkillError::MissingConfig { setting, fix },
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Resolved settings for one invocation. Built once, never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    values: BTreeMap<String, String>,
}

impl Config {
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// The resolved value, or `""` when unresolved.
    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    /// The value of `setting`, or its `missing_*` error when empty.
    pub fn require(&self, setting: &Setting) -> Result<&str> {
        let value = self.get(setting.name);
        if value.is_empty() {
            return Err(setting.missing());
        }
        Ok(value)
    }

    /// Fail on the first non-optional setting that resolved empty.
    pub fn check(&self, settings: &[Setting]) -> Result<()> {
        for setting in settings {
            if setting.kind != SettingKind::Optional {
                self.require(setting)?;
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// One resolution strategy.
pub trait Source {
    fn name(&self) -> String;
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Environment variables, captured once at start-up.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    vars: HashMap<String, String>,
}

impl EnvSource {
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    pub fn from_pairs<K: Into<String>, V: Into<String>>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Source for EnvSource {
    fn name(&self) -> String {
        "environment".to_string()
    }

    fn lookup(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// A single `KEY=value` file. A missing file resolves nothing.
#[derive(Debug, Clone)]
pub struct DotenvFile {
    path: PathBuf,
    contents: Option<String>,
}

impl DotenvFile {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let contents = std::fs::read_to_string(&path).ok();
        Self { path, contents }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.contents.is_some()
    }
}

impl Source for DotenvFile {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn lookup(&self, key: &str) -> Option<String> {
        dotenv_lookup(self.contents.as_deref()?, key)
    }
}

/// The first `.env` found walking up from a start directory.
#[derive(Debug, Clone)]
pub struct DotenvWalk {
    file: Option<DotenvFile>,
}

impl DotenvWalk {
    pub fn from_dir(start: &Path) -> Self {
        Self {
            file: find_upward(start, paths::DOTENV_FILE).map(DotenvFile::open),
        }
    }

    pub fn found(&self) -> Option<&Path> {
        self.file.as_ref().map(DotenvFile::path)
    }
}

impl Source for DotenvWalk {
    fn name(&self) -> String {
        match &self.file {
            Some(f) => f.name(),
            None => "project .env (none found)".to_string(),
        }
    }

    fn lookup(&self, key: &str) -> Option<String> {
        self.file.as_ref()?.lookup(key)
    }
}

/// Walk upward from `start` until a directory containing a file `name` is
/// found, or the filesystem root is passed.
pub fn find_upward(start: &Path, name: &str) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        match dir.parent() {
            Some(p) => dir = p.to_path_buf(),
            None => return None,
        }
    }
}

/// Value of the first `KEY=value` line (optionally `export KEY=value`) whose
/// key is exactly `key`. One pair of surrounding quotes is stripped.
pub fn dotenv_lookup(contents: &str, key: &str) -> Option<String> {
    for line in contents.lines() {
        let line = line.trim_start();
        if line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        if k == key {
            return Some(unquote(v.trim()).to_string());
        }
    }
    None
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

pub struct Resolver {
    sources: Vec<Box<dyn Source>>,
}

impl Resolver {
    pub fn new(sources: Vec<Box<dyn Source>>) -> Self {
        Self { sources }
    }

    /// Environment → project `.env` → home fallback `.env`.
    pub fn standard(env: EnvSource, cwd: &Path, home: Option<&Path>) -> Self {
        let mut sources: Vec<Box<dyn Source>> =
            vec![Box::new(env), Box::new(DotenvWalk::from_dir(cwd))];
        if let Some(home) = home {
            sources.push(Box::new(DotenvFile::open(paths::fallback_env(home))));
        }
        Self::new(sources)
    }

    /// Insert `source` directly after the environment.
    pub fn with_overlay(mut self, source: Box<dyn Source>) -> Self {
        let at = self.sources.len().min(1);
        self.sources.insert(at, source);
        self
    }

    pub fn resolve(&self, settings: &[Setting]) -> Config {
        let mut values = BTreeMap::new();
        for setting in settings {
            let found = self.sources.iter().find_map(|source| {
                source
                    .lookup(setting.name)
                    .filter(|v| !v.is_empty())
                    .map(|v| (source.name(), v))
            });
            let value = match found {
                Some((origin, value)) => {
                    tracing::debug!(setting = setting.name, %origin, "resolved setting");
                    value
                }
                None => setting.default.unwrap_or_default().to_string(),
            };
            values.insert(setting.name.to_string(), value);
        }
        Config { values }
    }
}
