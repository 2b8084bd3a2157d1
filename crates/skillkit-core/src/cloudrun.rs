//! Cloud Run service logs read through `gcloud logging read`.
//!
//! The service coordinates live in their own settings file written by
//! `init`, layered between the process environment and the `.env` walk.

use crate::config::{Config, DotenvFile, Setting};
use crate::error::{Result, SkillError};
use crate::io::{atomic_write, render_env};
use crate::normalize::{format_duration_ms, no_data, str_field, truncate, LONG_TEXT, SHORT_TEXT};
use crate::paths;
use crate::process::{run_json, Dependency};
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const SERVICE: Setting = Setting::required(
    "CLOUDRUN_SERVICE",
    "Run `skill-cloudrun init <service> <project>` or set CLOUDRUN_SERVICE",
);
pub const PROJECT: Setting = Setting::required(
    "CLOUDRUN_PROJECT",
    "Run `skill-cloudrun init <service> <project>` or set CLOUDRUN_PROJECT",
);
pub const REGION: Setting = Setting::optional("CLOUDRUN_REGION", Some("us-central1"));
pub const ACCOUNT: Setting = Setting::optional("CLOUDRUN_ACCOUNT", None);
pub const SETTINGS: &[Setting] = &[SERVICE, PROJECT, REGION, ACCOUNT];

pub const GCLOUD: Dependency = Dependency::new(
    "gcloud",
    "Install the Google Cloud SDK (https://cloud.google.com/sdk/docs/install) and run `gcloud auth login`",
);

static SERVICE_RE: OnceLock<Regex> = OnceLock::new();
static PROJECT_RE: OnceLock<Regex> = OnceLock::new();
static REGION_RE: OnceLock<Regex> = OnceLock::new();
static ACCOUNT_RE: OnceLock<Regex> = OnceLock::new();

fn service_re() -> &'static Regex {
    SERVICE_RE.get_or_init(|| Regex::new(r"^[a-z]([-a-z0-9]{0,61}[a-z0-9])?$").unwrap())
}

fn project_re() -> &'static Regex {
    PROJECT_RE.get_or_init(|| Regex::new(r"^[a-z][-a-z0-9]{4,28}[a-z0-9]$").unwrap())
}

fn region_re() -> &'static Regex {
    REGION_RE.get_or_init(|| Regex::new(r"^[a-z]+-[a-z]+[0-9]+$").unwrap())
}

fn account_re() -> &'static Regex {
    ACCOUNT_RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+$").unwrap())
}

// ---------------------------------------------------------------------------
// Settings file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloudRunSettings {
    pub service: String,
    pub project: String,
    pub region: String,
    pub account: Option<String>,
}

impl CloudRunSettings {
    /// Validated settings. Every value ends up quoted inside a logging filter
    /// or passed as a gcloud flag, so only identifier-shaped input is accepted.
    pub fn new(service: &str, project: &str, region: &str, account: Option<&str>) -> Result<Self> {
        if !service_re().is_match(service) {
            return Err(SkillError::invalid("service", service));
        }
        if !project_re().is_match(project) {
            return Err(SkillError::invalid("project", project));
        }
        if !region_re().is_match(region) {
            return Err(SkillError::invalid("region", region));
        }
        let account = account.filter(|a| !a.is_empty());
        if let Some(account) = account {
            if !account_re().is_match(account) {
                return Err(SkillError::invalid("account", account));
            }
        }
        Ok(Self {
            service: service.to_string(),
            project: project.to_string(),
            region: region.to_string(),
            account: account.map(str::to_string),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let service = config.require(&SERVICE)?;
        let project = config.require(&PROJECT)?;
        Self::new(
            service,
            project,
            config.get(REGION.name),
            Some(config.get(ACCOUNT.name)),
        )
    }

    pub fn render(&self) -> String {
        let mut pairs = vec![
            (SERVICE.name, self.service.as_str()),
            (PROJECT.name, self.project.as_str()),
            (REGION.name, self.region.as_str()),
        ];
        if let Some(account) = &self.account {
            pairs.push((ACCOUNT.name, account.as_str()));
        }
        render_env(&pairs)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write(path, self.render().as_bytes())?;
        tracing::info!(path = %path.display(), "saved cloud run settings");
        Ok(())
    }

    fn to_json(&self) -> Value {
        json!(self)
    }
}

/// The settings file as a config source, when a home directory is known.
pub fn settings_source(home: Option<&Path>) -> Option<DotenvFile> {
    home.map(|h| DotenvFile::open(paths::cloudrun_settings(h)))
}

pub fn init(home: Option<&Path>, settings: &CloudRunSettings) -> Result<Value> {
    let path = settings_path(home)?;
    settings.save(&path)?;
    let mut out = settings.to_json();
    out["saved"] = json!(path.display().to_string());
    Ok(out)
}

/// Resolved settings plus where the settings file lives. Works without any
/// setting present.
pub fn show_config(config: &Config, home: Option<&Path>) -> Value {
    let path = home.map(paths::cloudrun_settings);
    let value = |s: &Setting| {
        let v = config.get(s.name);
        if v.is_empty() {
            Value::Null
        } else {
            json!(v)
        }
    };
    json!({
        "service": value(&SERVICE),
        "project": value(&PROJECT),
        "region": value(&REGION),
        "account": value(&ACCOUNT),
        "settings_file": path.as_ref().map(|p| p.display().to_string()),
        "settings_file_exists": path.as_ref().is_some_and(|p| p.exists()),
    })
}

fn settings_path(home: Option<&Path>) -> Result<PathBuf> {
    home.map(paths::cloudrun_settings).ok_or_else(|| SkillError::MissingConfig {
        setting: "HOME".into(),
        fix: "Set HOME so the settings file can be written".into(),
    })
}

// ---------------------------------------------------------------------------
// Log queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Errors,
    Recent,
    Search(String),
}

/// Quote `text` for use inside a double-quoted logging filter literal.
pub fn escape_filter_text(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn build_filter(settings: &CloudRunSettings, scope: &Scope) -> String {
    let mut clauses = vec![
        r#"resource.type="cloud_run_revision""#.to_string(),
        format!(r#"resource.labels.service_name="{}""#, settings.service),
        format!(r#"resource.labels.location="{}""#, settings.region),
    ];
    match scope {
        Scope::Errors => clauses.push("severity>=ERROR".into()),
        Scope::Recent => {}
        Scope::Search(text) => {
            let text = escape_filter_text(text);
            clauses.push(format!(
                r#"(textPayload:"{text}" OR jsonPayload.message:"{text}")"#
            ));
        }
    }
    clauses.join(" AND ")
}

pub fn gcloud_args(settings: &CloudRunSettings, filter: &str, hours: u32, limit: u32) -> Vec<String> {
    let mut args = vec![
        "logging".to_string(),
        "read".to_string(),
        filter.to_string(),
        format!("--project={}", settings.project),
        format!("--limit={limit}"),
        format!("--freshness={hours}h"),
        "--format=json".to_string(),
    ];
    if let Some(account) = &settings.account {
        args.push(format!("--account={account}"));
    }
    args
}

pub struct CloudRunLogs {
    gcloud: PathBuf,
    settings: CloudRunSettings,
}

impl CloudRunLogs {
    pub fn new(gcloud: PathBuf, settings: CloudRunSettings) -> Self {
        Self { gcloud, settings }
    }

    pub fn settings(&self) -> &CloudRunSettings {
        &self.settings
    }

    pub fn read(&self, filter: &str, hours: u32, limit: u32) -> Result<Value> {
        let args = gcloud_args(&self.settings, filter, hours, limit);
        let entries = run_json(&self.gcloud, &args, &[])?;
        Ok(summarize_entries(hours, &entries))
    }
}

pub fn summarize_entries(hours: u32, entries: &Value) -> Value {
    let entries = entries.as_array().map(Vec::as_slice).unwrap_or(&[]);
    if entries.is_empty() {
        return no_data(json!({ "hours": hours }));
    }
    let mut by_severity = Map::new();
    for entry in entries {
        let severity = str_field(entry, "severity").unwrap_or("DEFAULT");
        let n = by_severity.get(severity).and_then(Value::as_u64).unwrap_or(0);
        by_severity.insert(severity.to_string(), json!(n + 1));
    }
    let projected: Vec<Value> = entries.iter().map(summarize_entry).collect();
    json!({
        "hours": hours,
        "count": projected.len(),
        "by_severity": by_severity,
        "entries": projected,
    })
}

pub fn summarize_entry(entry: &Value) -> Value {
    let mut out = Map::new();
    out.insert("time".into(), entry.get("timestamp").cloned().unwrap_or_default());
    out.insert(
        "severity".into(),
        json!(str_field(entry, "severity").unwrap_or("DEFAULT")),
    );
    out.insert("message".into(), entry_message(entry));

    if let Some(request) = entry.get("httpRequest") {
        if let Some(status) = request.get("status") {
            out.insert("status".into(), status.clone());
        }
        if let Some(url) = str_field(request, "requestUrl") {
            out.insert("url".into(), json!(truncate(url, SHORT_TEXT)));
        }
        if let Some(latency) = str_field(request, "latency") {
            out.insert("latency".into(), json!(format_latency(latency)));
        }
    }
    Value::Object(out)
}

fn entry_message(entry: &Value) -> Value {
    let text = str_field(entry, "textPayload")
        .or_else(|| entry.get("jsonPayload").and_then(|p| str_field(p, "message")))
        .or_else(|| {
            entry
                .get("protoPayload")
                .and_then(|p| p.get("status"))
                .and_then(|s| str_field(s, "message"))
        });
    if let Some(text) = text {
        return json!(truncate(text.trim_end(), LONG_TEXT));
    }
    match entry.get("httpRequest") {
        Some(request) => json!(format!(
            "{} {}",
            str_field(request, "requestMethod").unwrap_or("?"),
            truncate(str_field(request, "requestUrl").unwrap_or(""), SHORT_TEXT)
        )),
        None => Value::Null,
    }
}

/// `"0.123456s"` → `"123ms"`; anything unparseable is passed through.
fn format_latency(latency: &str) -> String {
    latency
        .strip_suffix('s')
        .and_then(|secs| secs.parse::<f64>().ok())
        .map(|secs| format_duration_ms(secs * 1000.0))
        .unwrap_or_else(|| latency.to_string())
}
