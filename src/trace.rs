//! JSON-lines trace of MCP tool calls.

use chrono::Local;
use serde_json::{json, Value};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

const MAX_FIELD_LEN: usize = 1000;

/// Appends one JSON object per tool call to a file under the temp dir.
/// Disabled instances do nothing.
pub struct TraceLog {
    file: Option<Mutex<File>>,
    path: Option<PathBuf>,
}

impl TraceLog {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = std::env::temp_dir().join(format!("dynamics_crm_mcp_trace_{}.jsonl", timestamp));
        Self::open(path)
    }

    pub fn disabled() -> Self {
        Self {
            file: None,
            path: None,
        }
    }

    fn open(path: PathBuf) -> Self {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
        {
            Ok(file) => {
                tracing::info!(path = %path.display(), "tool trace enabled");
                Self {
                    file: Some(Mutex::new(file)),
                    path: Some(path),
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to create trace file");
                Self::disabled()
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record a finished tool call. `outcome` is the rendered response body.
    pub fn record(&self, tool: &str, arguments: &Value, success: bool, outcome: &Value, elapsed: Duration) {
        let Some(file) = &self.file else {
            return;
        };
        let line = json!({
            "timestamp": Local::now().to_rfc3339(),
            "tool": tool,
            "arguments": truncate_json(arguments, MAX_FIELD_LEN),
            "success": success,
            "outcome": truncate_json(outcome, MAX_FIELD_LEN),
            "elapsedMs": elapsed.as_millis() as u64,
        });
        if let Ok(mut f) = file.lock() {
            let _ = writeln!(f, "{}", line);
            let _ = f.flush();
        }
    }
}

impl std::fmt::Debug for TraceLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceLog").field("path", &self.path).finish()
    }
}

/// Serialized value cut to at most `max_len` bytes on a char boundary.
fn truncate_json(value: &Value, max_len: usize) -> String {
    let s = value.to_string();
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_json_respects_char_boundaries() {
        let value = json!("ääääää");
        let out = truncate_json(&value, 4);
        assert!(out.ends_with("...(truncated)"));
        assert!(out.starts_with("\"ä"));

        assert_eq!(truncate_json(&json!({"a": 1}), 100), "{\"a\":1}");
    }

    #[test]
    fn test_record_writes_one_line_per_call() {
        let path = std::env::temp_dir().join(format!(
            "dynamics_crm_mcp_trace_test_{}.jsonl",
            std::process::id()
        ));
        let trace = TraceLog::open(path.clone());
        assert_eq!(trace.path(), Some(path.as_path()));

        trace.record(
            "dynamics_get_contact",
            &json!({"id": "C1"}),
            true,
            &json!({"success": true}),
            Duration::from_millis(12),
        );
        trace.record(
            "dynamics_delete_contact",
            &json!({"id": "C2"}),
            false,
            &json!({"success": false}),
            Duration::from_millis(3),
        );

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let _ = std::fs::remove_file(&path);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["tool"], "dynamics_get_contact");
        assert_eq!(lines[0]["elapsedMs"], 12);
        assert_eq!(lines[1]["success"], false);
    }

    #[test]
    fn test_disabled_trace_is_silent() {
        let trace = TraceLog::new(false);
        assert!(trace.path().is_none());
        trace.record("t", &json!({}), true, &json!({}), Duration::ZERO);
    }
}
