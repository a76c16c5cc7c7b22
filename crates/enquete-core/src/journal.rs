use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use crate::error::EnqueteError;
use crate::models::JournalEntry;

/// Append-only JSONL record of flow operations. Every write is best-effort:
/// a journal failure must never surface into the survey flow.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    path: Option<PathBuf>,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    fn try_append(&self, entry: &JournalEntry) {
        let Some(path) = &self.path else {
            return;
        };
        if let Ok(serialized) = serde_json::to_string(entry) {
            let mut line = serialized;
            line.push('\n');
            let _ = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut file| file.write_all(line.as_bytes()));
        }
    }

    pub fn log_status(
        &self,
        operation: &str,
        status: &str,
        started: Instant,
        session_id: Option<&str>,
        question_id: Option<&str>,
        details: Option<serde_json::Value>,
    ) {
        self.try_append(&JournalEntry {
            request_id: Uuid::new_v4().to_string(),
            operation: operation.to_string(),
            status: status.to_string(),
            latency_ms: started.elapsed().as_millis(),
            created_at: Utc::now().to_rfc3339(),
            session_id: session_id.map(ToString::to_string),
            question_id: question_id.map(ToString::to_string),
            error_code: None,
            error_message: None,
            details,
        });
    }

    pub fn log_warning(
        &self,
        operation: &str,
        started: Instant,
        session_id: Option<&str>,
        question_id: Option<&str>,
        warning_message: &str,
    ) {
        self.try_append(&JournalEntry {
            request_id: Uuid::new_v4().to_string(),
            operation: operation.to_string(),
            status: "warning".to_string(),
            latency_ms: started.elapsed().as_millis(),
            created_at: Utc::now().to_rfc3339(),
            session_id: session_id.map(ToString::to_string),
            question_id: question_id.map(ToString::to_string),
            error_code: None,
            error_message: Some(warning_message.to_string()),
            details: None,
        });
    }

    pub fn log_error(
        &self,
        operation: &str,
        started: Instant,
        session_id: Option<&str>,
        question_id: Option<&str>,
        err: &EnqueteError,
    ) {
        self.try_append(&JournalEntry {
            request_id: Uuid::new_v4().to_string(),
            operation: operation.to_string(),
            status: "error".to_string(),
            latency_ms: started.elapsed().as_millis(),
            created_at: Utc::now().to_rfc3339(),
            session_id: session_id.map(ToString::to_string),
            question_id: question_id.map(ToString::to_string),
            error_code: Some(err.code().to_string()),
            error_message: Some(err.to_string()),
            details: None,
        });
    }
}
