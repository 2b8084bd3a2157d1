//! Trigger.dev runs API.

use crate::config::{Config, Setting};
use crate::envelope::{Envelope, Records};
use crate::error::{Result, SkillError};
use crate::http::ApiClient;
use crate::normalize::{
    cutoff, ensure_prefix, format_duration_ms, num_field, round_to, str_field, text_field,
    DurationStats, LONG_TEXT, SHORT_TEXT,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const SECRET_KEY: Setting = Setting::credential(
    "TRIGGER_SECRET_KEY",
    "Set TRIGGER_SECRET_KEY to a secret key (tr_dev_… or tr_prod_…) from the Trigger.dev dashboard, in the environment or a .env file",
);
pub const API_URL: Setting = Setting::optional("TRIGGER_API_URL", Some("https://api.trigger.dev"));
pub const SETTINGS: &[Setting] = &[SECRET_KEY, API_URL];

pub const RUN_PREFIX: &str = "run_";
pub const FAILED_STATUSES: &[&str] = &["FAILED", "CRASHED", "SYSTEM_FAILURE", "TIMED_OUT"];
pub const STATUSES: &[&str] = &[
    "PENDING_VERSION",
    "QUEUED",
    "DEQUEUED",
    "EXECUTING",
    "WAITING",
    "DELAYED",
    "COMPLETED",
    "CANCELED",
    "FAILED",
    "CRASHED",
    "SYSTEM_FAILURE",
    "EXPIRED",
    "TIMED_OUT",
];
/// Page size used by `stats`; the window is sampled, not paginated.
pub const STATS_SAMPLE: u32 = 100;

pub struct Trigger {
    client: ApiClient,
}

impl Trigger {
    pub fn from_config(config: &Config) -> Result<Self> {
        let token = config.require(&SECRET_KEY)?;
        Ok(Self {
            client: ApiClient::new(config.get(API_URL.name), token),
        })
    }

    pub fn runs(&self, limit: u32, status: Option<&str>) -> Result<Value> {
        let status = status.map(parse_status).transpose()?;
        let mut query = vec![("page[size]", limit.to_string())];
        if let Some(s) = &status {
            query.push(("filter[status]", s.clone()));
        }
        let resp = self.client.get("/api/v1/runs", &query);
        Envelope::classify(resp, Records::At("data")).project(
            json!({ "status_filter": status }),
            |body| {
                let runs = summarize_all(&body);
                Ok(json!({ "count": runs.len(), "runs": runs }))
            },
        )
    }

    pub fn failed(&self, limit: u32) -> Result<Value> {
        let query = [
            ("page[size]", limit.to_string()),
            ("filter[status]", FAILED_STATUSES.join(",")),
        ];
        let resp = self.client.get("/api/v1/runs", &query);
        Envelope::classify(resp, Records::At("data")).project(
            json!({ "status_filter": FAILED_STATUSES.join(",") }),
            |body| {
                let runs = summarize_all(&body);
                Ok(json!({ "count": runs.len(), "failed_runs": runs }))
            },
        )
    }

    pub fn run(&self, run_id: &str) -> Result<Value> {
        let run_id = ensure_prefix(RUN_PREFIX, run_id);
        let body = self.fetch_run(&run_id)?;
        Ok(run_detail(&body))
    }

    pub fn error(&self, run_id: &str) -> Result<Value> {
        let run_id = ensure_prefix(RUN_PREFIX, run_id);
        let body = self.fetch_run(&run_id)?;
        Ok(run_error(&run_id, &body))
    }

    pub fn stats(&self, hours: u32, now: DateTime<Utc>) -> Result<Value> {
        let from = cutoff(now, hours).to_rfc3339_opts(SecondsFormat::Secs, true);
        let query = [
            ("page[size]", STATS_SAMPLE.to_string()),
            ("filter[createdAt][from]", from),
        ];
        let resp = self.client.get("/api/v1/runs", &query);
        Envelope::classify(resp, Records::At("data"))
            .project(json!({ "hours": hours }), |body| Ok(aggregate(hours, &body)))
    }

    pub fn replay(&self, run_id: &str) -> Result<Value> {
        let run_id = ensure_prefix(RUN_PREFIX, run_id);
        let resp = self
            .client
            .post(&format!("/api/v1/runs/{run_id}/replay"), &json!({}));
        let body = Envelope::classify(resp, Records::Object)
            .into_body()?
            .unwrap_or_default();
        Ok(json!({ "replayed": run_id, "new_run_id": body.get("id") }))
    }

    pub fn cancel(&self, run_id: &str) -> Result<Value> {
        let run_id = ensure_prefix(RUN_PREFIX, run_id);
        let resp = self
            .client
            .post(&format!("/api/v2/runs/{run_id}/cancel"), &json!({}));
        Envelope::classify(resp, Records::Object).into_body()?;
        Ok(json!({ "cancelled": run_id }))
    }

    fn fetch_run(&self, run_id: &str) -> Result<Value> {
        let resp = self.client.get(&format!("/api/v3/runs/{run_id}"), &[]);
        Ok(Envelope::classify(resp, Records::Object)
            .into_body()?
            .unwrap_or_default())
    }
}

fn parse_status(status: &str) -> Result<String> {
    let upper = status.trim().to_ascii_uppercase();
    if STATUSES.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(SkillError::InvalidArgument {
            name: "status".into(),
            value: status.to_string(),
            usage: Some(format!("one of: {}", STATUSES.join(", "))),
        })
    }
}

// ---------------------------------------------------------------------------
// Projections
// ---------------------------------------------------------------------------

fn summarize_all(body: &Value) -> Vec<Value> {
    body.get("data")
        .and_then(Value::as_array)
        .map(|runs| runs.iter().map(summarize_run).collect())
        .unwrap_or_default()
}

/// `{id, task, status, created, duration_ms, duration}`.
pub fn summarize_run(run: &Value) -> Value {
    let duration_ms = num_field(run, "durationMs").unwrap_or(0.0);
    json!({
        "id": run.get("id"),
        "task": run.get("taskIdentifier"),
        "status": run.get("status"),
        "created": run.get("createdAt"),
        "duration_ms": duration_ms.round() as u64,
        "duration": format_duration_ms(duration_ms),
    })
}

pub fn run_detail(run: &Value) -> Value {
    let mut out = summarize_run(run);
    out["started"] = run.get("startedAt").cloned().unwrap_or(Value::Null);
    out["finished"] = run.get("finishedAt").cloned().unwrap_or(Value::Null);
    out["attempts"] = json!(run
        .get("attemptCount")
        .and_then(Value::as_u64)
        .or_else(|| run.get("attempts").and_then(Value::as_array).map(|a| a.len() as u64))
        .unwrap_or(0));
    out["is_test"] = run.get("isTest").cloned().unwrap_or(json!(false));
    out["tags"] = run.get("tags").cloned().unwrap_or_else(|| json!([]));
    out["cost_cents"] = run.get("costInCents").cloned().unwrap_or(Value::Null);
    out["error"] = match run.get("error") {
        Some(e) if e.is_object() => text_field(e, "message", LONG_TEXT),
        _ => Value::Null,
    };
    out
}

pub fn run_error(run_id: &str, run: &Value) -> Value {
    let error = match run.get("error") {
        Some(e) if !e.is_null() => e,
        _ => return json!({ "status": "no_error", "run_id": run_id }),
    };
    let message = if let Some(s) = error.as_str() {
        json!(crate::normalize::truncate(s, LONG_TEXT))
    } else {
        text_field(error, "message", LONG_TEXT)
    };
    json!({
        "run_id": run_id,
        "task": run.get("taskIdentifier"),
        "status": run.get("status"),
        "error": {
            "name": text_field(error, "name", SHORT_TEXT),
            "message": message,
            "stack": text_field(error, "stackTrace", LONG_TEXT),
        },
    })
}

pub fn aggregate(hours: u32, body: &Value) -> Value {
    let runs = body
        .get("data")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut by_status: BTreeMap<String, u64> = BTreeMap::new();
    let mut durations = Vec::new();
    let mut failed = 0u64;
    for run in &runs {
        let status = str_field(run, "status").unwrap_or("UNKNOWN");
        *by_status.entry(status.to_string()).or_default() += 1;
        if FAILED_STATUSES.contains(&status) {
            failed += 1;
        }
        if let Some(ms) = num_field(run, "durationMs").filter(|ms| *ms > 0.0) {
            durations.push(ms);
        }
    }

    let total = runs.len();
    let failure_rate = if total == 0 {
        0.0
    } else {
        round_to(failed as f64 / total as f64, 3)
    };
    let partial = body
        .get("pagination")
        .and_then(|p| p.get("next"))
        .is_some_and(|next| !next.is_null());

    json!({
        "hours": hours,
        "total": total,
        "failed": failed,
        "failure_rate": failure_rate,
        "by_status": by_status,
        "duration": DurationStats::from_samples(&durations).map(|s| s.to_json()),
        "partial": partial,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;

    fn trigger(server: &mockito::ServerGuard) -> Trigger {
        let config = Config::from_pairs([
            ("TRIGGER_SECRET_KEY", "tr_dev_test"),
            ("TRIGGER_API_URL", server.url().as_str()),
        ]);
        Trigger::from_config(&config).unwrap()
    }

    fn run(id: &str, status: &str, duration: u64) -> Value {
        json!({
            "id": id,
            "status": status,
            "taskIdentifier": "send-email",
            "createdAt": "2026-10-19T10:00:00.000Z",
            "durationMs": duration,
            "isTest": false,
        })
    }

    #[test]
    fn missing_key_is_reported() {
        let err = Trigger::from_config(&Config::default()).err().unwrap();
        assert_eq!(err.kind(), "missing_api_key");
    }

    #[test]
    fn failed_lists_failed_runs() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/api/v1/runs")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page[size]".into(), "5".into()),
                Matcher::UrlEncoded(
                    "filter[status]".into(),
                    "FAILED,CRASHED,SYSTEM_FAILURE,TIMED_OUT".into(),
                ),
            ]))
            .with_body(
                json!({ "data": [
                    run("run_1", "FAILED", 500),
                    run("run_2", "CRASHED", 1500),
                    run("run_3", "FAILED", 90000),
                ]})
                .to_string(),
            )
            .create();

        let out = trigger(&server).failed(5).unwrap();
        mock.assert();
        assert_eq!(out["count"], 3);
        let runs = out["failed_runs"].as_array().unwrap();
        assert_eq!(runs.len(), 3);
        for r in runs {
            for key in ["id", "task", "status", "created", "duration_ms"] {
                assert!(r.get(key).is_some(), "missing {key}");
            }
        }
        assert_eq!(runs[0]["duration"], "500ms");
        assert_eq!(runs[1]["duration"], "1.5s");
        assert_eq!(runs[2]["duration"], "1.5m");
    }

    #[test]
    fn empty_runs_is_no_data() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/api/v1/runs")
            .match_query(Matcher::Any)
            .with_body(r#"{"data": [], "pagination": {}}"#)
            .create();

        let out = trigger(&server).runs(20, Some("completed")).unwrap();
        assert_eq!(out["status"], "no_data");
        assert_eq!(out["status_filter"], "COMPLETED");
    }

    #[test]
    fn unknown_status_is_rejected_before_calling() {
        let server = mockito::Server::new();
        let err = trigger(&server).runs(20, Some("sideways")).unwrap_err();
        assert_eq!(err.kind(), "invalid_status");
    }

    #[test]
    fn error_without_error_field_is_no_error() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/api/v3/runs/run_abc123")
            .with_body(json!({ "id": "run_abc123", "status": "COMPLETED", "error": null }).to_string())
            .create();

        let out = trigger(&server).error("abc123").unwrap();
        mock.assert();
        assert_eq!(out, json!({ "status": "no_error", "run_id": "run_abc123" }));
    }

    #[test]
    fn error_projects_message_and_stack() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/api/v3/runs/run_x")
            .with_body(
                json!({
                    "id": "run_x",
                    "status": "FAILED",
                    "taskIdentifier": "sync",
                    "error": { "name": "TypeError", "message": "x is undefined", "stackTrace": "at sync.ts:3" },
                })
                .to_string(),
            )
            .create();

        let out = trigger(&server).error("run_x").unwrap();
        assert_eq!(out["run_id"], "run_x");
        assert_eq!(out["error"]["name"], "TypeError");
        assert_eq!(out["error"]["message"], "x is undefined");
        assert_eq!(out["error"]["stack"], "at sync.ts:3");
    }

    #[test]
    fn unknown_run_is_not_found() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/api/v3/runs/run_missing")
            .with_status(404)
            .with_body(r#"{"error": "Run not found"}"#)
            .create();

        let err = trigger(&server).run("missing").unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn stats_aggregates_window() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/api/v1/runs")
            .match_query(Matcher::UrlEncoded(
                "filter[createdAt][from]".into(),
                "2026-10-18T12:00:00Z".into(),
            ))
            .with_body(
                json!({
                    "data": [
                        run("run_1", "COMPLETED", 1000),
                        run("run_2", "COMPLETED", 3000),
                        run("run_3", "FAILED", 2000),
                        run("run_4", "QUEUED", 0),
                    ],
                    "pagination": { "next": null },
                })
                .to_string(),
            )
            .create();

        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let out = trigger(&server).stats(24, now).unwrap();
        assert_eq!(out["total"], 4);
        assert_eq!(out["failed"], 1);
        assert_eq!(out["failure_rate"], 0.25);
        assert_eq!(out["by_status"]["COMPLETED"], 2);
        assert_eq!(out["duration"]["count"], 3);
        assert_eq!(out["duration"]["avg"], "2.0s");
        assert_eq!(out["partial"], false);
    }

    #[test]
    fn replay_returns_new_run() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/v1/runs/run_old/replay")
            .with_body(r#"{"id": "run_new"}"#)
            .create();

        let out = trigger(&server).replay("old").unwrap();
        mock.assert();
        assert_eq!(out, json!({ "replayed": "run_old", "new_run_id": "run_new" }));
    }

    #[test]
    fn detail_counts_attempts() {
        let body = json!({
            "id": "run_1",
            "status": "COMPLETED",
            "taskIdentifier": "t",
            "attempts": [{}, {}],
            "error": null,
        });
        let out = run_detail(&body);
        assert_eq!(out["attempts"], 2);
        assert_eq!(out["error"], Value::Null);
    }
}
