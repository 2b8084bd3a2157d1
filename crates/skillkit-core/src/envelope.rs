//! Classification of an upstream reply, decided once right after the call.

use crate::error::{Result, SkillError};
use crate::http::ApiResponse;
use crate::normalize::no_data;
use serde_json::Value;

/// Where the records live in a successful body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Records {
    /// An array under this top-level key (`{"data": [...]}`).
    At(&'static str),
    /// The body itself is the array.
    TopLevel,
    /// A single object; never empty.
    Object,
}

#[derive(Debug)]
pub enum Envelope {
    Error(SkillError),
    Empty,
    Success(Value),
}

impl Envelope {
    pub fn classify(response: ApiResponse, records: Records) -> Self {
        let ApiResponse { status, body } = response;

        if status == 0 {
            let detail = upstream_message(&body).unwrap_or("transport failure");
            return Envelope::Error(SkillError::Transport(detail.to_string()));
        }
        if let Some(message) = upstream_message(&body) {
            return Envelope::Error(if status == 404 {
                SkillError::NotFound(message.to_string())
            } else {
                SkillError::Api(message.to_string())
            });
        }
        if status == 404 {
            return Envelope::Error(SkillError::NotFound("resource does not exist".into()));
        }
        if !(200..300).contains(&status) {
            return Envelope::Error(SkillError::Api(format!("HTTP {status}")));
        }

        let empty = match records {
            Records::At(key) => body
                .get(key)
                .and_then(Value::as_array)
                .is_none_or(Vec::is_empty),
            Records::TopLevel => body.as_array().is_none_or(Vec::is_empty),
            Records::Object => false,
        };
        if empty {
            Envelope::Empty
        } else {
            Envelope::Success(body)
        }
    }

    /// Run `project` on success; `Empty` becomes `{"status": "no_data", ...context}`.
    pub fn project<F>(self, context: Value, project: F) -> Result<Value>
    where
        F: FnOnce(Value) -> Result<Value>,
    {
        match self {
            Envelope::Error(e) => Err(e),
            Envelope::Empty => Ok(no_data(context)),
            Envelope::Success(body) => project(body),
        }
    }

    /// The success body; `Empty` is passed through as `None`.
    pub fn into_body(self) -> Result<Option<Value>> {
        match self {
            Envelope::Error(e) => Err(e),
            Envelope::Empty => Ok(None),
            Envelope::Success(body) => Ok(Some(body)),
        }
    }
}

/// A top-level `detail` or `error` string marks an upstream failure.
fn upstream_message(body: &Value) -> Option<&str> {
    ["detail", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
}
