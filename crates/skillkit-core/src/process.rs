//! External CLIs (`gcloud`, `psql`) that speak JSON on stdout.
//!
//! Mirrors the HTTP client contract: one invocation, no retries. A non-zero
//! exit is an upstream failure carrying the tool's stderr; a spawn failure or
//! unparseable stdout is a transport failure.

use crate::error::{Result, SkillError};
use crate::normalize::{truncate, SHORT_TEXT};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// An external binary a tool cannot work without.
#[derive(Debug, Clone, Copy)]
pub struct Dependency {
    pub binary: &'static str,
    pub fix: &'static str,
}

impl Dependency {
    pub const fn new(binary: &'static str, fix: &'static str) -> Self {
        Self { binary, fix }
    }

    /// Locate the binary on PATH.
    pub fn locate(&self) -> Result<PathBuf> {
        which::which(self.binary).map_err(|_| SkillError::MissingDependency {
            tool: self.binary.to_string(),
            fix: self.fix.to_string(),
        })
    }
}

/// Run `program args...` with `envs` added to the inherited environment and
/// decode its stdout as JSON.
pub fn run_json(program: &Path, args: &[String], envs: &[(&str, String)]) -> Result<Value> {
    tracing::debug!(program = %program.display(), ?args, "running");
    let output = Command::new(program)
        .args(args)
        .envs(envs.iter().map(|(k, v)| (*k, v.as_str())))
        .stdin(Stdio::null())
        .output()
        .map_err(|e| SkillError::Transport(format!("failed to run {}: {e}", program.display())))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = stderr.trim();
        tracing::warn!(status = ?output.status.code(), "command failed");
        return Err(SkillError::Api(if message.is_empty() {
            format!("{} exited with {}", program.display(), output.status)
        } else {
            message.to_string()
        }));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let text = stdout.trim();
    if text.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }
    serde_json::from_str(text).map_err(|_| {
        SkillError::Transport(format!(
            "non-JSON output from {}: {}",
            program.display(),
            truncate(text, SHORT_TEXT)
        ))
    })
}

/// Executable shell scripts standing in for external CLIs in tests.
#[cfg(all(test, unix))]
pub(crate) mod fake {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::sync::{Mutex, MutexGuard};

    // Writing and exec'ing scripts from parallel threads can hit ETXTBSY.
    static EXEC: Mutex<()> = Mutex::new(());

    pub fn lock() -> MutexGuard<'static, ()> {
        EXEC.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
