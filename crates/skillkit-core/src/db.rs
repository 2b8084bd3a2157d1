//! Read-only PostgreSQL inspection through `psql`.
//!
//! Every statement is wrapped so that psql prints a single `json_agg` value;
//! an aggregate over zero rows prints nothing. The session runs with
//! `default_transaction_read_only`, so PostgreSQL refuses writes even when a
//! `SELECT` calls a function that would make one.

use crate::config::{Config, Setting};
use crate::error::{Result, SkillError};
use crate::normalize::{no_data, truncate, LONG_TEXT};
use crate::process::{run_json, Dependency};
use regex::Regex;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::OnceLock;

pub const DATABASE_URL: Setting = Setting::required(
    "DATABASE_URL",
    "Set DATABASE_URL to a postgres:// connection string, ideally for a read-only role",
);
pub const SETTINGS: &[Setting] = &[DATABASE_URL];

/// Server options for every session. Writes fail inside a read-only
/// transaction.
pub const READ_ONLY_OPTIONS: &str = "-c default_transaction_read_only=on";

pub const PSQL: Dependency = Dependency::new(
    "psql",
    "Install the PostgreSQL client (e.g. `brew install libpq` or `apt install postgresql-client`)",
);

static LEADING_KEYWORD_RE: OnceLock<Regex> = OnceLock::new();
static TABLE_RE: OnceLock<Regex> = OnceLock::new();

fn leading_keyword_re() -> &'static Regex {
    LEADING_KEYWORD_RE.get_or_init(|| Regex::new(r"(?i)^\s*(select|with)\b").unwrap())
}

fn table_re() -> &'static Regex {
    TABLE_RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]{0,62}\.)?[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap()
    })
}

/// Accept a single `SELECT` or `WITH` statement, returning it without its
/// trailing semicolon.
///
/// Any other `;` is rejected, including one inside a string literal.
/// Data-modifying CTEs are refused by PostgreSQL itself once the statement is
/// wrapped in a subquery.
pub fn validate_select(sql: &str) -> Result<&str> {
    let stmt = sql.trim();
    let stmt = stmt.strip_suffix(';').unwrap_or(stmt).trim_end();
    if stmt.is_empty() || stmt.contains(';') || !leading_keyword_re().is_match(stmt) {
        return Err(SkillError::invalid("sql", truncate(sql.trim(), LONG_TEXT)));
    }
    Ok(stmt)
}

/// `(schema, table)`; the schema defaults to `public`.
pub fn validate_table(name: &str) -> Result<(&str, &str)> {
    if !table_re().is_match(name) {
        return Err(SkillError::invalid("table", name));
    }
    Ok(name.split_once('.').unwrap_or(("public", name)))
}

/// Wrap `sql` so psql prints its first `limit` rows as one JSON array.
pub fn wrap_json(sql: &str, limit: u32) -> String {
    format!("SELECT json_agg(t) FROM (SELECT * FROM ({sql}) AS q LIMIT {limit}) AS t")
}

fn tables_sql() -> &'static str {
    "SELECT c.relname AS table, c.reltuples::bigint AS estimated_rows \
     FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
     WHERE n.nspname = 'public' AND c.relkind IN ('r', 'p') \
     ORDER BY c.relname"
}

fn describe_sql(schema: &str, table: &str) -> String {
    format!(
        "SELECT column_name AS name, data_type AS type, \
         is_nullable = 'YES' AS nullable, column_default AS default \
         FROM information_schema.columns \
         WHERE table_schema = '{schema}' AND table_name = '{table}' \
         ORDER BY ordinal_position"
    )
}

/// Decode `%XX` escapes; malformed escapes are kept as written.
fn percent_decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("00");
            out.push(u8::from_str_radix(hex, 16).unwrap_or(0));
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Split the password out of a connection URL so it travels in `PGPASSWORD`
/// instead of the process arguments. Strings that are not URLs pass through.
pub fn split_password(url: &str) -> (String, Option<String>) {
    let Ok(mut parsed) = reqwest::Url::parse(url) else {
        return (url.to_string(), None);
    };
    match parsed.password().map(percent_decode) {
        Some(password) if parsed.set_password(None).is_ok() => (parsed.to_string(), Some(password)),
        _ => (url.to_string(), None),
    }
}

pub struct Database {
    psql: PathBuf,
    target: String,
    password: Option<String>,
}

impl Database {
    pub fn new(psql: PathBuf, config: &Config) -> Result<Self> {
        let (target, password) = split_password(config.require(&DATABASE_URL)?);
        Ok(Self {
            psql,
            target,
            password,
        })
    }

    /// Environment for psql: the read-only session options and, when the URL
    /// carried one, the password.
    pub fn envs(&self) -> Vec<(&'static str, String)> {
        let mut envs = vec![("PGOPTIONS", READ_ONLY_OPTIONS.to_string())];
        if let Some(password) = &self.password {
            envs.push(("PGPASSWORD", password.clone()));
        }
        envs
    }

    pub fn args(&self, sql: &str) -> Vec<String> {
        vec![
            self.target.clone(),
            "-X".into(),
            "-A".into(),
            "-t".into(),
            "-q".into(),
            "-v".into(),
            "ON_ERROR_STOP=1".into(),
            "-c".into(),
            sql.to_string(),
        ]
    }

    fn rows(&self, sql: &str, limit: u32) -> Result<Vec<Value>> {
        let out = run_json(&self.psql, &self.args(&wrap_json(sql, limit)), &self.envs())?;
        Ok(match out {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            other => vec![other],
        })
    }

    pub fn query(&self, sql: &str, limit: u32) -> Result<Value> {
        let stmt = validate_select(sql)?;
        // One extra row tells us whether the cap cut anything off.
        let mut rows = self.rows(stmt, limit.saturating_add(1))?;
        if rows.is_empty() {
            return Ok(no_data(json!({ "query": truncate(stmt, LONG_TEXT) })));
        }
        let truncated = rows.len() > limit as usize;
        rows.truncate(limit as usize);
        Ok(json!({
            "count": rows.len(),
            "truncated": truncated,
            "rows": rows,
        }))
    }

    pub fn tables(&self) -> Result<Value> {
        let tables = self.rows(tables_sql(), 10_000)?;
        if tables.is_empty() {
            return Ok(no_data(json!({ "schema": "public" })));
        }
        Ok(json!({ "count": tables.len(), "tables": tables }))
    }

    pub fn describe(&self, name: &str) -> Result<Value> {
        let (schema, table) = validate_table(name)?;
        let columns = self.rows(&describe_sql(schema, table), 10_000)?;
        if columns.is_empty() {
            return Err(SkillError::NotFound(format!("table {schema}.{table} does not exist")));
        }
        Ok(json!({
            "table": table,
            "schema": schema,
            "count": columns.len(),
            "columns": columns,
        }))
    }
}
