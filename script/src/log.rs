//! Capped, append-only log buffer for one script execution (§3 "Log
//! Entry", §4.6).

use std::sync::Mutex;

use mcphub_core::sanitize::{sanitize_fields, sanitize_message};
use serde::Serialize;
use serde_json::Value;

pub const MAX_LOG_ENTRIES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Any value other than the four known levels folds to `info` (§4.6).
    pub fn parse_or_info(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "debug" => LogLevel::Debug,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Value>,
}

/// A fresh buffer is created per `execute()` call (§4.6: "a fresh log
/// buffer"). Once the cap is reached, further appends are silent no-ops
/// (§4.6, §8's 1000/1001st-entry boundary test).
pub struct LogBuffer {
    entries: Mutex<Vec<LogEntry>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, level: LogLevel, message: &str, fields: Option<Value>) {
        let mut guard = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if guard.len() >= MAX_LOG_ENTRIES {
            return;
        }
        guard.push(LogEntry {
            level,
            message: sanitize_message(message),
            fields: fields.map(|f| sanitize_fields(&f)),
        });
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Clones out the current entries without consuming the buffer; used
    /// when a shared `Arc` handle is still held elsewhere (§4.6).
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_at_1000_entries_silently() {
        let buffer = LogBuffer::new();
        for i in 0..1005 {
            buffer.push(LogLevel::Info, &format!("entry {i}"), None);
        }
        assert_eq!(buffer.len(), MAX_LOG_ENTRIES);
    }

    #[test]
    fn unknown_level_folds_to_info() {
        assert_eq!(LogLevel::parse_or_info("bogus"), LogLevel::Info);
        assert_eq!(LogLevel::parse_or_info("WARN"), LogLevel::Warn);
    }
}
