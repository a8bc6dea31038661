//! Log sinks: the single place every log line is finally written through.

use crate::level::LogLevel;
use crate::logger::Fields;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::RwLock;

/// Backend that receives finished log lines.
///
/// Implementations are shared by every request in the process and must be
/// safe for concurrent use. A sink may panic for levels it considers fatal;
/// callers that must survive that wrap escalated writes themselves.
pub trait LogSink: Send + Sync {
    fn emit(&self, level: LogLevel, message: &str, fields: &Fields);
}

/// Forwards log lines to `tracing` under the `reqlog` target.
///
/// Fields are rendered as a single JSON object in the `fields` attribute.
/// `fatal` and `panic` go out as `ERROR` events tagged with `severity`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, level: LogLevel, message: &str, fields: &Fields) {
        let rendered = serde_json::to_string(fields).unwrap_or_default();
        match level {
            LogLevel::Debug => {
                tracing::debug!(target: "reqlog", fields = %rendered, "{message}")
            }
            LogLevel::Info => tracing::info!(target: "reqlog", fields = %rendered, "{message}"),
            LogLevel::Warn => tracing::warn!(target: "reqlog", fields = %rendered, "{message}"),
            LogLevel::Error | LogLevel::Fatal | LogLevel::Panic => tracing::error!(
                target: "reqlog",
                severity = level.as_str(),
                fields = %rendered,
                "{message}"
            ),
        }
    }
}

/// A single captured log line.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: i64,
    pub level: LogLevel,
    pub message: String,
    pub fields: Fields,
}

impl LogRecord {
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }
}

/// Bounded in-memory sink. Keeps the newest `capacity` lines.
pub struct MemorySink {
    records: RwLock<VecDeque<LogRecord>>,
    capacity: usize,
    panic_at: Option<LogLevel>,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            panic_at: None,
        }
    }

    /// Make the sink panic on any line at or above `level`, the way some
    /// backends abort on fatal writes.
    pub fn panicking_at(mut self, level: LogLevel) -> Self {
        self.panic_at = Some(level);
        self
    }

    /// Snapshot of captured lines, oldest first.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .read()
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Captured lines with the given message, oldest first.
    pub fn with_message(&self, message: &str) -> Vec<LogRecord> {
        self.records
            .read()
            .map(|r| r.iter().filter(|rec| rec.message == message).cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.write() {
            records.clear();
        }
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl LogSink for MemorySink {
    fn emit(&self, level: LogLevel, message: &str, fields: &Fields) {
        if let Some(threshold) = self.panic_at
            && level >= threshold
        {
            panic!("memory sink refuses {level} line: {message}");
        }
        let record = LogRecord {
            timestamp: chrono::Utc::now().timestamp_millis(),
            level,
            message: message.to_string(),
            fields: fields.clone(),
        };
        if let Ok(mut records) = self.records.write() {
            if records.len() >= self.capacity {
                records.pop_front();
            }
            records.push_back(record);
        }
    }
}
