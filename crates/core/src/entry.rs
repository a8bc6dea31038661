//! Per-request log entries.
//!
//! A [`LogEntry`] accumulates fields while a request is handled and writes
//! exactly one completion line when it ends. Handlers reach it through an
//! [`EntryHandle`] found in the request's [`LogContext`](crate::LogContext).

use crate::config::RequestLoggerConfig;
use crate::level::LogLevel;
use crate::logger::{FieldLogger, Fields, Logger};
use crate::panic::{CapturedPanic, clear_backtrace};
use axum::extract::ConnectInfo;
use axum::http::Request;
use serde_json::Value;
use std::net::SocketAddr;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Correlation id assigned to a request upstream of the request logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Request attributes the entry is seeded with.
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    pub request_id: Option<String>,
    pub method: String,
    pub path: String,
    pub client_addr: String,
    pub user_agent: String,
    pub scheme: String,
    pub protocol: String,
}

impl RequestMetadata {
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let headers = request.headers();
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let request_id = request
            .extensions()
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .or_else(|| header("x-request-id"));

        let client_addr = header("x-forwarded-for")
            .map(|v| v.split(',').next().unwrap_or("").trim().to_string())
            .or_else(|| header("x-real-ip"))
            .or_else(|| {
                request
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.to_string())
            })
            .unwrap_or_default();

        let scheme = request
            .uri()
            .scheme_str()
            .map(str::to_string)
            .or_else(|| header("x-forwarded-proto"))
            .unwrap_or_else(|| "http".to_string());

        Self {
            request_id,
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            client_addr,
            user_agent: header("user-agent").unwrap_or_default(),
            scheme,
            protocol: format!("{:?}", request.version()),
        }
    }
}

/// Accumulated state for one in-flight request.
#[derive(Debug)]
pub struct LogEntry {
    logger: FieldLogger,
    level: Option<LogLevel>,
    completed: bool,
}

impl LogEntry {
    /// Seed the entry from request metadata and, if configured, write the
    /// "request started" line.
    pub fn new(logger: &Logger, meta: &RequestMetadata, config: &RequestLoggerConfig) -> Self {
        let mut fields = Fields::new();
        if let Some(id) = &meta.request_id {
            fields.insert("req_id".into(), Value::from(id.as_str()));
        }
        if config.protocol_fields {
            fields.insert("http_scheme".into(), Value::from(meta.scheme.as_str()));
            fields.insert("http_proto".into(), Value::from(meta.protocol.as_str()));
        }
        fields.insert("method".into(), Value::from(meta.method.as_str()));
        fields.insert("ip".into(), Value::from(meta.client_addr.as_str()));
        fields.insert("ua".into(), Value::from(meta.user_agent.as_str()));
        fields.insert("uri".into(), Value::from(meta.path.as_str()));

        let entry = Self {
            logger: logger.with_fields(fields),
            level: None,
            completed: false,
        };
        if config.write_start_line {
            entry.logger.info("request started");
        }
        entry
    }

    pub fn logger(&self) -> &FieldLogger {
        &self.logger
    }

    /// Level the completion line will be written at.
    pub fn level(&self) -> LogLevel {
        self.level.unwrap_or_default()
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.level = Some(level);
    }

    /// Raise the completion level to at least `level`; never lowers it.
    pub fn raise_level(&mut self, level: LogLevel) {
        if level > self.level() {
            self.level = Some(level);
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn add_field(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        if self.completed {
            return;
        }
        self.logger.insert(key.into(), value.into());
    }

    pub fn add_fields(&mut self, fields: Fields) {
        if self.completed {
            return;
        }
        self.logger.extend(fields);
    }

    /// Attach the panic and escalate the completion level. Writes nothing;
    /// the panic is reported by the completion line.
    pub fn record_panic(&mut self, panic: &CapturedPanic) {
        if self.completed {
            return;
        }
        self.logger.insert("stack".into(), Value::from(panic.stack.as_str()));
        self.logger.insert("panic".into(), Value::from(panic.message.as_str()));
        self.level = Some(LogLevel::Panic);
    }

    /// Write the completion line. Only the first call writes; later calls
    /// return `false`.
    pub fn complete(&mut self, status: u16, bytes: u64, elapsed: Duration) -> bool {
        match self.close(status, bytes, elapsed) {
            Some((logger, level)) => {
                write_guarded(&logger, level, "completed");
                true
            }
            None => false,
        }
    }

    /// Merge the response fields and mark the entry completed, returning the
    /// logger and level the completion line is written with.
    fn close(
        &mut self,
        status: u16,
        bytes: u64,
        elapsed: Duration,
    ) -> Option<(FieldLogger, LogLevel)> {
        if self.completed {
            return None;
        }
        self.completed = true;
        self.logger.insert("status".into(), Value::from(status));
        self.logger.insert("bytes".into(), Value::from(bytes));
        self.logger.insert(
            "res_ms".into(),
            Value::from(elapsed.as_nanos() as f64 / 1_000_000.0),
        );
        Some((self.logger.clone(), self.level()))
    }
}

/// Write a line without letting a panicking sink escape. If the sink
/// refuses an escalated line, the same line is retried at `error`.
fn write_guarded(logger: &FieldLogger, level: LogLevel, message: &str) {
    let written = catch_unwind(AssertUnwindSafe(|| logger.log(level, message))).is_ok();
    if !written {
        clear_backtrace();
        if level.is_escalated()
            && catch_unwind(AssertUnwindSafe(|| logger.log(LogLevel::Error, message))).is_err()
        {
            clear_backtrace();
        }
    }
}

/// Shared handle to a request's [`LogEntry`].
///
/// Only the task handling the request touches the entry, so the lock is
/// never contended; it exists so the handle can cross `.await` points.
#[derive(Debug, Clone)]
pub struct EntryHandle(Arc<Mutex<LogEntry>>);

impl EntryHandle {
    pub fn new(entry: LogEntry) -> Self {
        Self(Arc::new(Mutex::new(entry)))
    }

    fn lock(&self) -> MutexGuard<'_, LogEntry> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the entry's current field logger.
    pub fn logger(&self) -> FieldLogger {
        self.lock().logger().clone()
    }

    pub fn add_field(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.lock().add_field(key, value);
    }

    pub fn add_fields(&self, fields: Fields) {
        self.lock().add_fields(fields);
    }

    pub fn set_level(&self, level: LogLevel) {
        self.lock().set_level(level);
    }

    pub fn raise_level(&self, level: LogLevel) {
        self.lock().raise_level(level);
    }

    pub fn level(&self) -> LogLevel {
        self.lock().level()
    }

    pub fn record_panic(&self, panic: &CapturedPanic) {
        self.lock().record_panic(panic);
    }

    /// The line is written after the lock is released, so a sink may use
    /// this entry again.
    pub fn complete(&self, status: u16, bytes: u64, elapsed: Duration) -> bool {
        let closed = self.lock().close(status, bytes, elapsed);
        match closed {
            Some((logger, level)) => {
                write_guarded(&logger, level, "completed");
                true
            }
            None => false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.lock().is_completed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{LogSink, MemorySink};
    use axum::body::Body;
    use serde_json::json;

    fn meta() -> RequestMetadata {
        RequestMetadata {
            request_id: None,
            method: "GET".into(),
            path: "/articles".into(),
            client_addr: "10.0.0.1".into(),
            user_agent: "curl/8".into(),
            scheme: "http".into(),
            protocol: "HTTP/1.1".into(),
        }
    }

    fn setup() -> (Arc<MemorySink>, Logger) {
        let sink = Arc::new(MemorySink::new(64));
        let logger = Logger::from_arc(sink.clone());
        (sink, logger)
    }

    #[test]
    fn test_start_line_and_seed_fields() {
        let (sink, logger) = setup();
        let _entry = LogEntry::new(&logger, &meta(), &RequestLoggerConfig::default());

        let started = sink.with_message("request started");
        assert_eq!(started.len(), 1);
        let rec = &started[0];
        assert_eq!(rec.level, LogLevel::Info);
        assert_eq!(rec.field("method"), Some(&json!("GET")));
        assert_eq!(rec.field("uri"), Some(&json!("/articles")));
        assert_eq!(rec.field("ip"), Some(&json!("10.0.0.1")));
        assert_eq!(rec.field("ua"), Some(&json!("curl/8")));
        assert!(rec.field("req_id").is_none());
        assert!(rec.field("http_scheme").is_none());
    }

    #[test]
    fn test_start_line_disabled_and_protocol_fields() {
        let (sink, logger) = setup();
        let config = RequestLoggerConfig {
            write_start_line: false,
            protocol_fields: true,
            ..Default::default()
        };
        let mut m = meta();
        m.request_id = Some("abc-1".into());
        let mut entry = LogEntry::new(&logger, &m, &config);
        assert!(sink.is_empty());

        entry.complete(204, 0, Duration::from_millis(1));
        let rec = &sink.records()[0];
        assert_eq!(rec.field("req_id"), Some(&json!("abc-1")));
        assert_eq!(rec.field("http_scheme"), Some(&json!("http")));
        assert_eq!(rec.field("http_proto"), Some(&json!("HTTP/1.1")));
    }

    #[test]
    fn test_complete_exactly_once() {
        let (sink, logger) = setup();
        let mut entry = LogEntry::new(&logger, &meta(), &RequestLoggerConfig::default());
        entry.add_field("article", 123);
        entry.add_field("article", 124);

        assert!(entry.complete(200, 5, Duration::from_micros(1500)));
        assert!(!entry.complete(500, 0, Duration::ZERO));
        entry.add_field("late", true);

        let completed = sink.with_message("completed");
        assert_eq!(completed.len(), 1);
        let rec = &completed[0];
        assert_eq!(rec.level, LogLevel::Info);
        assert_eq!(rec.field("article"), Some(&json!(124)));
        assert_eq!(rec.field("status"), Some(&json!(200)));
        assert_eq!(rec.field("bytes"), Some(&json!(5)));
        assert_eq!(rec.field("res_ms"), Some(&json!(1.5)));
        assert!(rec.field("late").is_none());
    }

    #[test]
    fn test_record_panic_escalates_without_writing() {
        let (sink, logger) = setup();
        let config = RequestLoggerConfig {
            write_start_line: false,
            ..Default::default()
        };
        let mut entry = LogEntry::new(&logger, &meta(), &config);
        entry.record_panic(&CapturedPanic {
            message: "boom".into(),
            stack: "frame 0".into(),
        });
        assert!(sink.is_empty());
        assert_eq!(entry.level(), LogLevel::Panic);

        entry.complete(500, 22, Duration::ZERO);
        let rec = &sink.records()[0];
        assert_eq!(rec.level, LogLevel::Panic);
        assert_eq!(rec.field("panic"), Some(&json!("boom")));
        assert_eq!(rec.field("stack"), Some(&json!("frame 0")));
        assert_eq!(rec.field("status"), Some(&json!(500)));
    }

    #[test]
    fn test_raise_level_never_lowers() {
        let (_sink, logger) = setup();
        let mut entry = LogEntry::new(&logger, &meta(), &RequestLoggerConfig::default());
        entry.raise_level(LogLevel::Warn);
        assert_eq!(entry.level(), LogLevel::Warn);
        entry.raise_level(LogLevel::Debug);
        assert_eq!(entry.level(), LogLevel::Warn);
        entry.set_level(LogLevel::Debug);
        assert_eq!(entry.level(), LogLevel::Debug);
    }

    #[test]
    fn test_panicking_sink_falls_back_to_error() {
        crate::panic::install_backtrace_hook();
        let sink = Arc::new(MemorySink::new(8).panicking_at(LogLevel::Fatal));
        let logger = Logger::from_arc(sink.clone());
        let mut entry = LogEntry::new(&logger, &meta(), &RequestLoggerConfig::default());
        entry.set_level(LogLevel::Panic);

        assert!(entry.complete(500, 0, Duration::ZERO));
        let completed = sink.with_message("completed");
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].level, LogLevel::Error);
        // The sink's own panic must not be attached to a later request.
        assert!(crate::panic::last_backtrace().is_none());
    }

    /// A sink that touches the entry it is writing for.
    struct ReentrantSink {
        entry: std::sync::OnceLock<EntryHandle>,
        seen_completed: std::sync::atomic::AtomicBool,
    }

    impl LogSink for ReentrantSink {
        fn emit(&self, _level: LogLevel, _message: &str, _fields: &Fields) {
            if let Some(entry) = self.entry.get() {
                entry.add_field("late", true);
                self.seen_completed
                    .store(entry.is_completed(), std::sync::atomic::Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_sink_may_reenter_entry_on_completion() {
        let sink = Arc::new(ReentrantSink {
            entry: std::sync::OnceLock::new(),
            seen_completed: std::sync::atomic::AtomicBool::new(false),
        });
        let logger = Logger::from_arc(sink.clone());
        let config = RequestLoggerConfig {
            write_start_line: false,
            ..Default::default()
        };
        let handle = EntryHandle::new(LogEntry::new(&logger, &meta(), &config));
        let _ = sink.entry.set(handle.clone());

        assert!(handle.complete(200, 0, Duration::ZERO));
        assert!(sink.seen_completed.load(std::sync::atomic::Ordering::SeqCst));
        // Completed entries ignore further fields.
        assert!(handle.logger().fields().get("late").is_none());
    }

    #[test]
    fn test_handle_shares_entry() {
        let (sink, logger) = setup();
        let handle = EntryHandle::new(LogEntry::new(
            &logger,
            &meta(),
            &RequestLoggerConfig::default(),
        ));
        let other = handle.clone();
        other.add_field("paginate", true);
        let mut batch = Fields::new();
        batch.insert("page".into(), json!(2));
        other.add_fields(batch);
        assert_eq!(handle.logger().fields()["paginate"], json!(true));

        assert!(handle.complete(200, 0, Duration::ZERO));
        assert!(other.is_completed());
        assert!(!other.complete(200, 0, Duration::ZERO));
        assert_eq!(sink.with_message("completed").len(), 1);
    }

    #[test]
    fn test_metadata_from_request() {
        let mut request = Request::builder()
            .method("POST")
            .uri("/articles/search?q=rust")
            .header("user-agent", "test-agent")
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.2")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(RequestId("req-42".into()));

        let m = RequestMetadata::from_request(&request);
        assert_eq!(m.method, "POST");
        assert_eq!(m.path, "/articles/search");
        assert_eq!(m.user_agent, "test-agent");
        assert_eq!(m.client_addr, "203.0.113.9");
        assert_eq!(m.request_id.as_deref(), Some("req-42"));
        assert_eq!(m.scheme, "http");
        assert_eq!(m.protocol, "HTTP/1.1");
    }

    #[test]
    fn test_metadata_connect_info_fallback() {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        let m = RequestMetadata::from_request(&request);
        assert_eq!(m.client_addr, "127.0.0.1:5000");
        assert!(m.request_id.is_none());
        assert_eq!(m.user_agent, "");
    }
}
