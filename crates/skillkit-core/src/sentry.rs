//! Sentry issues, events and transaction performance.

use crate::config::{Config, Setting};
use crate::envelope::{Envelope, Records};
use crate::error::{Result, SkillError};
use crate::http::ApiClient;
use crate::normalize::{
    as_number, format_duration_ms, str_field, text_field, truncate, LONG_TEXT, SHORT_TEXT,
};
use serde_json::{json, Map, Value};

pub const AUTH_TOKEN: Setting = Setting::credential(
    "SENTRY_AUTH_TOKEN",
    "Set SENTRY_AUTH_TOKEN to an auth token with event:read and event:write scopes (Sentry → Settings → Auth Tokens)",
);
pub const ORG: Setting = Setting::required(
    "SENTRY_ORG",
    "Set SENTRY_ORG to your organization slug (the part after sentry.io/organizations/)",
);
pub const PROJECT: Setting = Setting::required(
    "SENTRY_PROJECT",
    "Set SENTRY_PROJECT to the project slug shown in Sentry → Settings → Projects",
);
pub const URL: Setting = Setting::optional("SENTRY_URL", Some("https://sentry.io"));
pub const SETTINGS: &[Setting] = &[AUTH_TOKEN, ORG, PROJECT, URL];

/// Innermost stack frames kept per exception.
pub const FRAME_TAIL: usize = 5;

pub struct Sentry {
    client: ApiClient,
    org: String,
    project: String,
}

impl Sentry {
    pub fn from_config(config: &Config) -> Result<Self> {
        let token = config.require(&AUTH_TOKEN)?;
        Ok(Self {
            client: ApiClient::new(config.get(URL.name), token),
            org: config.require(&ORG)?.to_string(),
            project: config.require(&PROJECT)?.to_string(),
        })
    }

    pub fn issues(&self, limit: u32, query: &str) -> Result<Value> {
        let resp = self.client.get(
            &format!("/api/0/projects/{}/{}/issues/", self.org, self.project),
            &[("query", query.to_string()), ("limit", limit.to_string())],
        );
        Envelope::classify(resp, Records::TopLevel).project(json!({ "query": query }), |body| {
            let issues: Vec<Value> = body
                .as_array()
                .map(|a| a.iter().take(limit as usize).map(summarize_issue).collect())
                .unwrap_or_default();
            Ok(json!({ "count": issues.len(), "issues": issues }))
        })
    }

    pub fn issue(&self, id: &str) -> Result<Value> {
        let id = parse_issue_id(id)?;
        let resp = self.client.get(&format!("/api/0/issues/{id}/"), &[]);
        Envelope::classify(resp, Records::Object).project(json!({}), |body| Ok(issue_detail(&body)))
    }

    pub fn latest(&self, id: &str) -> Result<Value> {
        let id = parse_issue_id(id)?;
        let resp = self
            .client
            .get(&format!("/api/0/issues/{id}/events/latest/"), &[]);
        Envelope::classify(resp, Records::Object).project(json!({}), |body| Ok(latest_event(&body)))
    }

    pub fn resolve(&self, id: &str) -> Result<Value> {
        let id = parse_issue_id(id)?;
        let resp = self.client.put(
            &format!("/api/0/issues/{id}/"),
            &json!({ "status": "resolved" }),
        );
        let body = Envelope::classify(resp, Records::Object)
            .into_body()?
            .unwrap_or_default();
        Ok(json!({
            "resolved": id,
            "status": str_field(&body, "status").unwrap_or("resolved"),
        }))
    }

    pub fn perf(&self, hours: u32, limit: u32) -> Result<Value> {
        let query: Vec<(&str, String)> = vec![
            ("field", "transaction".into()),
            ("field", "count()".into()),
            ("field", "p95(transaction.duration)".into()),
            ("query", format!("event.type:transaction project:{}", self.project)),
            ("statsPeriod", format!("{hours}h")),
            ("sort", "-p95_transaction_duration".into()),
            ("per_page", limit.to_string()),
        ];
        let resp = self
            .client
            .get(&format!("/api/0/organizations/{}/events/", self.org), &query);
        Envelope::classify(resp, Records::At("data")).project(json!({ "hours": hours }), |body| {
            let transactions: Vec<Value> = body
                .get("data")
                .and_then(Value::as_array)
                .map(|rows| rows.iter().map(summarize_transaction).collect())
                .unwrap_or_default();
            Ok(json!({
                "hours": hours,
                "count": transactions.len(),
                "transactions": transactions,
            }))
        })
    }
}

pub fn parse_issue_id(id: &str) -> Result<&str> {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Ok(id)
    } else {
        Err(SkillError::invalid("issue_id", id))
    }
}

pub fn summarize_issue(issue: &Value) -> Value {
    json!({
        "id": issue.get("id"),
        "short_id": issue.get("shortId"),
        "title": text_field(issue, "title", SHORT_TEXT),
        "culprit": text_field(issue, "culprit", SHORT_TEXT),
        "level": issue.get("level"),
        "status": issue.get("status"),
        // Sentry reports the event count as a string.
        "events": issue.get("count").and_then(as_number).map(|n| n as u64),
        "users": issue.get("userCount"),
        "first_seen": issue.get("firstSeen"),
        "last_seen": issue.get("lastSeen"),
        "link": issue.get("permalink"),
    })
}

fn issue_detail(issue: &Value) -> Value {
    let mut detail = summarize_issue(issue);
    if let Value::Object(map) = &mut detail {
        map.insert("title".into(), text_field(issue, "title", LONG_TEXT));
        map.insert("platform".into(), issue.get("platform").cloned().unwrap_or_default());
        map.insert(
            "assigned_to".into(),
            issue
                .get("assignedTo")
                .and_then(|a| a.get("name"))
                .cloned()
                .unwrap_or_default(),
        );
        map.insert(
            "metadata".into(),
            json!({
                "type": issue.get("metadata").and_then(|m| m.get("type")),
                "value": issue
                    .get("metadata")
                    .map(|m| text_field(m, "value", LONG_TEXT))
                    .unwrap_or_default(),
            }),
        );
    }
    detail
}

pub fn latest_event(event: &Value) -> Value {
    let exceptions: Vec<Value> = event
        .get("entries")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|e| str_field(e, "type") == Some("exception"))
        .filter_map(|e| e.get("data")?.get("values")?.as_array())
        .flatten()
        .map(summarize_exception)
        .collect();

    let tags: Map<String, Value> = event
        .get("tags")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|t| Some((str_field(t, "key")?.to_string(), t.get("value")?.clone())))
        .collect();

    let message = str_field(event, "message")
        .filter(|m| !m.is_empty())
        .or_else(|| str_field(event, "title"))
        .map(|m| truncate(m, LONG_TEXT));

    json!({
        "event_id": event.get("eventID"),
        "date": event.get("dateCreated"),
        "message": message,
        "exceptions": exceptions,
        "tags": tags,
    })
}

fn summarize_exception(exception: &Value) -> Value {
    let frames: Vec<Value> = exception
        .get("stacktrace")
        .and_then(|s| s.get("frames"))
        .and_then(Value::as_array)
        .map(|frames| {
            let skip = frames.len().saturating_sub(FRAME_TAIL);
            frames
                .iter()
                .skip(skip)
                .map(|f| {
                    json!({
                        "file": f.get("filename"),
                        "function": f.get("function"),
                        "line": f.get("lineNo"),
                        "in_app": f.get("inApp"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    json!({
        "type": exception.get("type"),
        "value": text_field(exception, "value", LONG_TEXT),
        "frames": frames,
    })
}

fn summarize_transaction(row: &Value) -> Value {
    let p95 = row
        .get("p95(transaction.duration)")
        .and_then(as_number)
        .unwrap_or(0.0);
    json!({
        "name": text_field(row, "transaction", SHORT_TEXT),
        "count": row.get("count()"),
        "p95_ms": p95.round(),
        "p95": format_duration_ms(p95),
    })
}
