//! Append-only audit log.
//!
//! Separate from diagnostic logging: this file is the durable record of who
//! logged in, what commands were attempted, and what happened to jobs.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{errors::Error, utils::{iso_timestamp_utc, truncate_text}, Result};

const AUDIT_MAX_TEXT: usize = 500;

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl AuditEvent {
    pub fn auth(user: &str, success: bool) -> Self {
        Self {
            timestamp: iso_timestamp_utc(),
            event: "auth".to_string(),
            user: Some(user.to_string()),
            command: None,
            allowed: None,
            reason: None,
            job_id: None,
            action: None,
            success: Some(success),
        }
    }

    pub fn command(user: &str, command: &str, allowed: bool, reason: Option<&str>) -> Self {
        Self {
            timestamp: iso_timestamp_utc(),
            event: "command".to_string(),
            user: Some(user.to_string()),
            command: Some(command.to_string()),
            allowed: Some(allowed),
            reason: reason.map(|s| s.to_string()),
            job_id: None,
            action: None,
            success: None,
        }
    }

    pub fn job(user: &str, job_id: &str, action: &str) -> Self {
        Self {
            timestamp: iso_timestamp_utc(),
            event: "job".to_string(),
            user: Some(user.to_string()),
            command: None,
            allowed: None,
            reason: None,
            job_id: Some(job_id.to_string()),
            action: Some(action.to_string()),
            success: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, mut event: AuditEvent) -> Result<()> {
        // Operator input can be arbitrarily large; cap what lands on disk.
        if let Some(s) = &event.command {
            event.command = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }
        if let Some(s) = &event.reason {
            event.reason = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        // Plain text format for readability.
        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));

        let value = serde_json::to_value(&event)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::External(
                "audit event is not a JSON object".to_string(),
            ));
        };
        for (k, v) in obj {
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            out.push_str(&json_value_to_display(v));
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }
}

fn json_value_to_display(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "<unprintable>".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_file(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}.log"))
    }

    #[test]
    fn json_mode_writes_one_line_per_event() {
        let log = AuditLogger::new(tmp_file("tbp-audit-json"), true);
        log.write(AuditEvent::auth("admin", true)).unwrap();
        log.write(AuditEvent::command("admin", "pwd", true, None))
            .unwrap();

        let written = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }

    #[test]
    fn long_commands_are_truncated_on_write() {
        let log = AuditLogger::new(tmp_file("tbp-audit-trunc"), true);
        let long = "x".repeat(AUDIT_MAX_TEXT + 50);
        log.write(AuditEvent::command("admin", &long, false, Some("not in allow list")))
            .unwrap();

        let written = std::fs::read_to_string(log.path()).unwrap();
        assert!(written.contains("..."));
        assert!(!written.contains(&long));
    }

    #[test]
    fn text_mode_writes_readable_blocks() {
        let log = AuditLogger::new(tmp_file("tbp-audit-text"), false);
        log.write(AuditEvent::job("admin", "job-1", "created")).unwrap();

        let written = std::fs::read_to_string(log.path()).unwrap();
        assert!(written.contains("="));
        assert!(written.contains("job_id: job-1"));
        assert!(written.contains("action: created"));
    }
}
