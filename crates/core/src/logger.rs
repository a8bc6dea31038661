use crate::level::LogLevel;
use crate::sink::{LogSink, TracingSink};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Structured fields attached to a log line. Keys are unique; the last
/// write for a key wins.
pub type Fields = serde_json::Map<String, Value>;

/// Process-wide logger backend. Cheap to clone; every clone writes to the
/// same sink.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
}

impl Logger {
    pub fn new(sink: impl LogSink + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub fn from_arc(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Logger writing through `tracing`.
    pub fn tracing() -> Self {
        Self::new(TracingSink)
    }

    /// Field logger with no fields attached.
    pub fn fields(&self) -> FieldLogger {
        FieldLogger {
            sink: self.sink.clone(),
            fields: Arc::new(Fields::new()),
        }
    }

    pub fn with_field(&self, key: impl Into<String>, value: impl Into<Value>) -> FieldLogger {
        self.fields().with_field(key, value)
    }

    pub fn with_fields(&self, fields: Fields) -> FieldLogger {
        self.fields().with_fields(fields)
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        self.sink.emit(level, message, &Fields::new());
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

/// A sink handle plus an immutable set of fields.
///
/// `with_field` and `with_fields` derive a child; the parent is never
/// changed, so a `FieldLogger` handed out to other code stays stable.
#[derive(Clone)]
pub struct FieldLogger {
    sink: Arc<dyn LogSink>,
    fields: Arc<Fields>,
}

impl FieldLogger {
    pub fn with_field(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut child = self.clone();
        child.insert(key.into(), value.into());
        child
    }

    pub fn with_fields(&self, fields: Fields) -> Self {
        let mut child = self.clone();
        child.extend(fields);
        child
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Copy-on-write insert: the map is only cloned when another handle
    /// still shares it.
    pub(crate) fn insert(&mut self, key: String, value: Value) {
        Arc::make_mut(&mut self.fields).insert(key, value);
    }

    pub(crate) fn extend(&mut self, fields: Fields) {
        if fields.is_empty() {
            return;
        }
        let map = Arc::make_mut(&mut self.fields);
        for (key, value) in fields {
            map.insert(key, value);
        }
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        self.sink.emit(level, message, &self.fields);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

impl fmt::Debug for FieldLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldLogger")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use serde_json::json;

    #[test]
    fn test_child_does_not_touch_parent() {
        let sink = Arc::new(MemorySink::new(10));
        let logger = Logger::from_arc(sink.clone());

        let parent = logger.with_field("a", 1);
        let child = parent.with_field("b", 2).with_field("a", 3);

        assert_eq!(parent.fields().len(), 1);
        assert_eq!(parent.fields()["a"], json!(1));
        assert_eq!(child.fields()["a"], json!(3));
        assert_eq!(child.fields()["b"], json!(2));

        child.warn("hello");
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, LogLevel::Warn);
        assert_eq!(records[0].field("b"), Some(&json!(2)));
    }

    #[test]
    fn test_with_fields_last_write_wins() {
        let logger = Logger::new(MemorySink::new(1));
        let mut batch = Fields::new();
        batch.insert("k".into(), json!("first"));
        let fl = logger.with_field("k", "zero").with_fields(batch);
        assert_eq!(fl.fields()["k"], json!("first"));
    }
}
