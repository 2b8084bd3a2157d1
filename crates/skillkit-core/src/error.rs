use crate::normalize::{truncate, LONG_TEXT};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SkillError {
    #[error("{tool} not found on PATH")]
    MissingDependency { tool: String, fix: String },

    #[error("credential {setting} is not set")]
    MissingApiKey { setting: String, fix: String },

    #[error("setting {setting} is not set")]
    MissingConfig { setting: String, fix: String },

    #[error("missing required argument '{name}'")]
    MissingArgument { name: String, usage: String },

    #[error("invalid {name} '{value}'")]
    InvalidArgument {
        name: String,
        value: String,
        usage: Option<String>,
    },

    #[error("api error: {0}")]
    Api(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unknown command '{command}'")]
    UnknownCommand {
        command: String,
        available: Vec<String>,
    },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unsupported {what}: {message}")]
    Unsupported { what: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SkillError {
    pub fn invalid(name: &str, value: impl Into<String>) -> Self {
        SkillError::InvalidArgument {
            name: name.to_string(),
            value: value.into(),
            usage: None,
        }
    }

    /// Machine-readable name emitted in the `error` field.
    pub fn kind(&self) -> String {
        match self {
            SkillError::MissingDependency { .. } => "missing_dependency".to_string(),
            SkillError::MissingApiKey { .. } => "missing_api_key".to_string(),
            SkillError::MissingConfig { .. } => "missing_config".to_string(),
            SkillError::MissingArgument { name, .. } => format!("missing_{name}"),
            SkillError::InvalidArgument { name, .. } => format!("invalid_{name}"),
            SkillError::Api(_) => "api_error".to_string(),
            SkillError::NotFound(_) => "not_found".to_string(),
            SkillError::UnknownCommand { .. } => "unknown_command".to_string(),
            SkillError::Transport(_) => "curl_failed".to_string(),
            SkillError::Unsupported { what, .. } => format!("unsupported_{what}"),
            SkillError::Io(_) => "io_error".to_string(),
        }
    }

    /// The Normalized Result printed for this failure.
    pub fn to_json(&self) -> Value {
        let kind = self.kind();
        match self {
            SkillError::MissingDependency { tool, fix } => {
                json!({ "error": kind, "tool": tool, "fix": fix })
            }
            SkillError::MissingApiKey { setting, fix }
            | SkillError::MissingConfig { setting, fix } => {
                json!({ "error": kind, "setting": setting, "fix": fix })
            }
            SkillError::MissingArgument { usage, .. } => json!({ "error": kind, "usage": usage }),
            SkillError::InvalidArgument { value, usage, .. } => {
                let mut out = json!({ "error": kind, "value": value });
                if let Some(usage) = usage {
                    out["usage"] = json!(usage);
                }
                out
            }
            SkillError::UnknownCommand { command, available } => {
                json!({ "error": kind, "command": command, "available": available })
            }
            SkillError::Api(message)
            | SkillError::NotFound(message)
            | SkillError::Transport(message)
            | SkillError::Unsupported { message, .. } => {
                json!({ "error": kind, "message": truncate(message, LONG_TEXT) })
            }
            SkillError::Io(e) => json!({ "error": kind, "message": e.to_string() }),
        }
    }
}

pub type Result<T> = std::result::Result<T, SkillError>;
