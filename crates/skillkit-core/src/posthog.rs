//! PostHog insights and HogQL queries.
//!
//! Windowed queries embed an absolute cutoff timestamp computed once per
//! request instead of `now() - INTERVAL`, so the same inputs always produce the
//! same query text.

use crate::config::{Config, Setting};
use crate::envelope::{Envelope, Records};
use crate::error::{Result, SkillError};
use crate::http::ApiClient;
use crate::normalize::{
    as_number, cutoff, format_duration_ms, no_data, round_to, str_field, truncate, zip_columns,
    LONG_TEXT, SHORT_TEXT,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

pub const API_KEY: Setting = Setting::credential(
    "POSTHOG_API_KEY",
    "Set POSTHOG_API_KEY to a personal API key (phx_…) from PostHog → Settings → Personal API keys",
);
pub const PROJECT_ID: Setting = Setting::required(
    "POSTHOG_PROJECT_ID",
    "Set POSTHOG_PROJECT_ID to the numeric project id shown in PostHog → Settings → Project",
);
pub const HOST: Setting = Setting::optional("POSTHOG_HOST", Some("https://us.posthog.com"));
pub const SETTINGS: &[Setting] = &[API_KEY, PROJECT_ID, HOST];

/// Insights fetched for triage; a single page.
pub const TRIAGE_PAGE: u32 = 200;

pub struct PostHog {
    client: ApiClient,
    project_id: String,
}

impl PostHog {
    pub fn from_config(config: &Config) -> Result<Self> {
        let key = config.require(&API_KEY)?;
        let project_id = config.require(&PROJECT_ID)?;
        if project_id.is_empty() || !project_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(SkillError::invalid("project_id", project_id));
        }
        Ok(Self {
            client: ApiClient::new(config.get(HOST.name), key),
            project_id: project_id.to_string(),
        })
    }

    fn path(&self, rest: &str) -> String {
        format!("/api/projects/{}/{rest}", self.project_id)
    }

    fn hogql(&self, sql: &str) -> Envelope {
        tracing::debug!(%sql, "hogql");
        let body = json!({ "query": { "kind": "HogQLQuery", "query": sql } });
        Envelope::classify(self.client.post(&self.path("query/"), &body), Records::At("results"))
    }

    // -----------------------------------------------------------------------
    // HogQL-backed verbs
    // -----------------------------------------------------------------------

    pub fn errors(&self, hours: u32, limit: u32, now: DateTime<Utc>) -> Result<Value> {
        let sql = format!(
            "SELECT properties.$exception_type AS type, properties.$exception_message AS message, \
             count() AS occurrences, max(timestamp) AS last_seen \
             FROM events \
             WHERE event = '$exception' AND timestamp >= toDateTime('{}') \
             GROUP BY type, message ORDER BY occurrences DESC LIMIT {limit}",
            hogql_time(now, hours)
        );
        self.hogql(&sql).project(json!({ "hours": hours }), |body| {
            let errors: Vec<Value> = results(&body)
                .iter()
                .map(|row| {
                    json!({
                        "type": cell_text(row, 0, SHORT_TEXT),
                        "message": cell_text(row, 1, LONG_TEXT),
                        "occurrences": row.get(2),
                        "last_seen": row.get(3),
                    })
                })
                .collect();
            Ok(json!({ "hours": hours, "count": errors.len(), "errors": errors }))
        })
    }

    pub fn perf(&self, hours: u32, limit: u32, now: DateTime<Utc>) -> Result<Value> {
        let sql = format!(
            "SELECT properties.$pathname AS path, count() AS samples, \
             avg(toFloat(properties.$web_vitals_LCP_value)) AS lcp, \
             quantile(0.75)(toFloat(properties.$web_vitals_LCP_value)) AS p75_lcp \
             FROM events \
             WHERE event = '$web_vitals' AND timestamp >= toDateTime('{}') \
             AND properties.$web_vitals_LCP_value IS NOT NULL \
             GROUP BY path ORDER BY samples DESC LIMIT {limit}",
            hogql_time(now, hours)
        );
        self.hogql(&sql).project(json!({ "hours": hours }), |body| {
            let pages: Vec<Value> = results(&body)
                .iter()
                .map(|row| {
                    let lcp = cell_number(row, 2);
                    let p75 = cell_number(row, 3);
                    json!({
                        "path": cell_text(row, 0, SHORT_TEXT),
                        "samples": row.get(1),
                        "lcp_ms": lcp.round(),
                        "lcp": format_duration_ms(lcp),
                        "p75_lcp_ms": p75.round(),
                        "p75_lcp": format_duration_ms(p75),
                    })
                })
                .collect();
            Ok(json!({ "hours": hours, "count": pages.len(), "pages": pages }))
        })
    }

    pub fn llm(&self, hours: u32, now: DateTime<Utc>) -> Result<Value> {
        let sql = format!(
            "SELECT properties.$ai_model AS model, count() AS generations, \
             sum(toFloat(properties.$ai_input_tokens)) AS input_tokens, \
             sum(toFloat(properties.$ai_output_tokens)) AS output_tokens, \
             sum(toFloat(properties.$ai_total_cost_usd)) AS cost_usd, \
             avg(toFloat(properties.$ai_latency)) AS avg_latency \
             FROM events \
             WHERE event = '$ai_generation' AND timestamp >= toDateTime('{}') \
             GROUP BY model ORDER BY generations DESC LIMIT 50",
            hogql_time(now, hours)
        );
        self.hogql(&sql)
            .project(json!({ "hours": hours }), |body| Ok(llm_usage(hours, &body)))
    }

    pub fn query(&self, sql: &str) -> Result<Value> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(SkillError::invalid("query", sql));
        }
        self.hogql(sql)
            .project(json!({ "query": truncate(sql, LONG_TEXT) }), |body| {
                let columns = columns(&body);
                let rows: Vec<Value> = results(&body)
                    .iter()
                    .map(|row| zip_columns(&columns, row))
                    .collect();
                Ok(json!({ "count": rows.len(), "columns": columns, "rows": rows }))
            })
    }

    // -----------------------------------------------------------------------
    // Insights
    // -----------------------------------------------------------------------

    fn list_insights(&self, limit: u32) -> Envelope {
        let resp = self
            .client
            .get(&self.path("insights/"), &[("limit", limit.to_string())]);
        Envelope::classify(resp, Records::At("results"))
    }

    pub fn insights(&self, limit: u32) -> Result<Value> {
        self.list_insights(limit).project(json!({}), |body| {
            let insights: Vec<Value> = results(&body).iter().map(summarize_insight).collect();
            Ok(json!({ "count": insights.len(), "insights": insights }))
        })
    }

    /// Fetch a saved insight's definition, then execute its query.
    pub fn insight(&self, id: u64) -> Result<Value> {
        let resp = self.client.get(&self.path(&format!("insights/{id}/")), &[]);
        let definition = Envelope::classify(resp, Records::Object)
            .into_body()?
            .unwrap_or_default();

        let Some(query) = runnable_query(&definition) else {
            return Err(SkillError::Unsupported {
                what: "insight".into(),
                message: format!("insight {id} has no query definition to execute"),
            });
        };
        let kind = str_field(&query, "kind").unwrap_or("unknown").to_string();

        let resp = self
            .client
            .post(&self.path("query/"), &json!({ "query": query }));
        let body = Envelope::classify(resp, Records::Object)
            .into_body()?
            .unwrap_or_default();

        let columns = columns(&body);
        let results: Vec<Value> = results(&body)
            .iter()
            .map(|row| {
                if columns.is_empty() {
                    row.clone()
                } else {
                    zip_columns(&columns, row)
                }
            })
            .collect();
        Ok(json!({
            "id": id,
            "name": insight_name(&definition),
            "kind": kind,
            "count": results.len(),
            "results": results,
        }))
    }

    pub fn triage(&self) -> Result<Value> {
        self.list_insights(TRIAGE_PAGE)
            .project(json!({}), |body| Ok(triage_report(results(&body))))
    }

    /// Mark every unsaved dashboard insight as saved.
    pub fn triage_fix(&self) -> Result<Value> {
        let Some(body) = self.list_insights(TRIAGE_PAGE).into_body()? else {
            return Ok(no_data(json!({})));
        };
        let mut fixed = Vec::new();
        let mut failed = Vec::new();
        let mut last_error = None;
        for insight in results(&body).iter().filter(|i| is_unsaved_on_dashboard(i)) {
            let Some(id) = insight.get("id").and_then(Value::as_u64) else {
                continue;
            };
            let resp = self.client.patch(
                &self.path(&format!("insights/{id}/")),
                &json!({ "saved": true }),
            );
            match Envelope::classify(resp, Records::Object).into_body() {
                Ok(_) => fixed.push(id),
                Err(e) => {
                    tracing::warn!(id, error = %e, "failed to save insight");
                    failed.push(json!({ "id": id, "error": e.kind(), "message": e.to_string() }));
                    last_error = Some(e);
                }
            }
        }
        if fixed.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        Ok(json!({
            "fixed_count": fixed.len(),
            "fixed": fixed,
            "failed_count": failed.len(),
            "failed": failed,
        }))
    }
}

// ---------------------------------------------------------------------------
// Projections
// ---------------------------------------------------------------------------

fn hogql_time(now: DateTime<Utc>, hours: u32) -> String {
    cutoff(now, hours).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn results(body: &Value) -> &[Value] {
    body.get("results")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn columns(body: &Value) -> Vec<Value> {
    body.get("columns")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn cell_text(row: &Value, i: usize, max: usize) -> Value {
    match row.get(i) {
        Some(Value::String(s)) => json!(truncate(s, max)),
        Some(v) => v.clone(),
        None => Value::Null,
    }
}

fn cell_number(row: &Value, i: usize) -> f64 {
    row.get(i).and_then(as_number).unwrap_or(0.0)
}

pub fn llm_usage(hours: u32, body: &Value) -> Value {
    let mut total_generations = 0.0;
    let mut total_input = 0.0;
    let mut total_output = 0.0;
    let mut total_cost = 0.0;
    let models: Vec<Value> = results(body)
        .iter()
        .map(|row| {
            let generations = cell_number(row, 1);
            let input = cell_number(row, 2);
            let output = cell_number(row, 3);
            let cost = cell_number(row, 4);
            // $ai_latency is reported in seconds.
            let latency_ms = cell_number(row, 5) * 1000.0;
            total_generations += generations;
            total_input += input;
            total_output += output;
            total_cost += cost;
            json!({
                "model": cell_text(row, 0, SHORT_TEXT),
                "generations": generations as u64,
                "input_tokens": input as u64,
                "output_tokens": output as u64,
                "cost_usd": round_to(cost, 4),
                "avg_latency_ms": latency_ms.round(),
                "avg_latency": format_duration_ms(latency_ms),
            })
        })
        .collect();
    json!({
        "hours": hours,
        "totals": {
            "generations": total_generations as u64,
            "input_tokens": total_input as u64,
            "output_tokens": total_output as u64,
            "cost_usd": round_to(total_cost, 4),
        },
        "models": models,
    })
}

fn insight_name(insight: &Value) -> Value {
    let name = str_field(insight, "name")
        .filter(|n| !n.is_empty())
        .or_else(|| str_field(insight, "derived_name"));
    match name {
        Some(n) => json!(truncate(n, SHORT_TEXT)),
        None => Value::Null,
    }
}

fn dashboards(insight: &Value) -> Vec<Value> {
    insight
        .get("dashboards")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

pub fn summarize_insight(insight: &Value) -> Value {
    json!({
        "id": insight.get("id"),
        "short_id": insight.get("short_id"),
        "name": insight_name(insight),
        "saved": insight.get("saved").and_then(Value::as_bool).unwrap_or(false),
        "dashboards": dashboards(insight),
        "last_refresh": insight.get("last_refresh"),
    })
}

/// Unsaved insights attached to at least one dashboard.
pub fn is_unsaved_on_dashboard(insight: &Value) -> bool {
    let saved = insight.get("saved").and_then(Value::as_bool).unwrap_or(false);
    !saved && !dashboards(insight).is_empty()
}

pub fn triage_report(insights: &[Value]) -> Value {
    let not_saved: Vec<Value> = insights
        .iter()
        .filter(|i| is_unsaved_on_dashboard(i))
        .map(|i| {
            json!({
                "id": i.get("id"),
                "name": insight_name(i),
                "dashboards": dashboards(i),
            })
        })
        .collect();
    let unnamed = insights
        .iter()
        .filter(|i| str_field(i, "name").is_none_or(str::is_empty))
        .count();
    json!({
        "total": insights.len(),
        "not_saved_count": not_saved.len(),
        "not_saved": not_saved,
        "unnamed_count": unnamed,
    })
}

/// The query node to POST for a saved insight. Visualization wrappers are
/// unwrapped to their data source.
fn runnable_query(insight: &Value) -> Option<Value> {
    let query = insight.get("query").filter(|q| q.is_object())?;
    if matches!(str_field(query, "kind"), Some("InsightVizNode" | "DataTableNode")) {
        return query.get("source").filter(|s| s.is_object()).cloned();
    }
    Some(query.clone())
}
