//! Small pure helpers shared by every projection.
//!
//! Projections never look at the clock, the environment or the network; the
//! only time-dependent input is the cutoff computed once per request by
//! [`cutoff`].

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};

/// Limit for titles, names, paths and URLs.
pub const SHORT_TEXT: usize = 100;
/// Limit for messages, stack traces and SQL.
pub const LONG_TEXT: usize = 500;

/// Cut `text` to at most `max` characters, marking the cut with `…`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

/// Human-readable duration next to the raw millisecond value.
///
/// Below one second renders milliseconds, below one minute seconds, otherwise
/// minutes. The unit is picked after rounding, so 999.6 is `1.0s`.
pub fn format_duration_ms(ms: f64) -> String {
    let ms = if ms.is_finite() { ms.max(0.0).round() } else { 0.0 };
    if ms < 1_000.0 {
        return format!("{}ms", ms as u64);
    }
    let tenths = (ms / 100.0).round();
    if tenths < 600.0 {
        format!("{:.1}s", tenths / 10.0)
    } else {
        format!("{:.1}m", ms / 60_000.0)
    }
}

/// Prefix `id` with `prefix` unless it already carries it.
pub fn ensure_prefix(prefix: &str, id: &str) -> String {
    let id = id.trim();
    if id.starts_with(prefix) {
        id.to_string()
    } else {
        format!("{prefix}{id}")
    }
}

/// The "hours ago" boundary for windowed queries.
pub fn cutoff(now: DateTime<Utc>, hours: u32) -> DateTime<Utc> {
    now - Duration::hours(i64::from(hours))
}

/// `{"status": "no_data", ...context}`.
pub fn no_data(context: Value) -> Value {
    let mut out = Map::new();
    out.insert("status".into(), json!("no_data"));
    if let Value::Object(fields) = context {
        out.extend(fields);
    }
    Value::Object(out)
}

pub fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Numeric field, accepting numbers that arrive encoded as strings.
pub fn num_field(value: &Value, key: &str) -> Option<f64> {
    as_number(value.get(key)?)
}

pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Truncated string field, or `null` when absent.
pub fn text_field(value: &Value, key: &str, max: usize) -> Value {
    match str_field(value, key) {
        Some(s) => json!(truncate(s, max)),
        None => Value::Null,
    }
}

/// Round to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// `{"<column>": value, ...}` for one positional row of a tabular response.
pub fn zip_columns(columns: &[Value], row: &Value) -> Value {
    let Some(cells) = row.as_array() else {
        return row.clone();
    };
    let mut out = Map::new();
    for (i, cell) in cells.iter().enumerate() {
        let name = columns
            .get(i)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("col{i}"));
        out.insert(name, cell.clone());
    }
    Value::Object(out)
}

// ---------------------------------------------------------------------------
// DurationStats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DurationStats {
    pub count: usize,
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
}

impl DurationStats {
    /// `None` for an empty sample.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let min_ms = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max_ms = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg_ms = samples.iter().sum::<f64>() / samples.len() as f64;
        Some(Self {
            count: samples.len(),
            min_ms,
            max_ms,
            avg_ms,
        })
    }

    pub fn to_json(&self) -> Value {
        json!({
            "count": self.count,
            "min_ms": self.min_ms.round(),
            "min": format_duration_ms(self.min_ms),
            "max_ms": self.max_ms.round(),
            "max": format_duration_ms(self.max_ms),
            "avg_ms": self.avg_ms.round(),
            "avg": format_duration_ms(self.avg_ms),
        })
    }
}
