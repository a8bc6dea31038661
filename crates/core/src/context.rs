//! The context store: which logger does "the current request" log through.
//!
//! A [`LogContext`] is installed once at boot with the process-wide
//! [`Logger`] and derived once per request with that request's
//! [`EntryHandle`]. It travels in the request's extensions and, while the
//! downstream handler runs, in a task-local so code that never sees the
//! request can still find it.

use crate::entry::EntryHandle;
use crate::error::ContextError;
use crate::logger::{FieldLogger, Logger};
use axum::extract::FromRequestParts;
use axum::http::Extensions;
use axum::http::request::Parts;
use std::convert::Infallible;
use std::future::Future;

tokio::task_local! {
    static CURRENT: LogContext;
}

#[derive(Debug, Clone, Default)]
pub struct LogContext {
    logger: Option<Logger>,
    entry: Option<EntryHandle>,
}

impl LogContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a context carrying the process-wide fallback logger.
    pub fn with_logger(&self, logger: Logger) -> Self {
        Self {
            logger: Some(logger),
            entry: self.entry.clone(),
        }
    }

    /// Derive a context carrying a request's log entry.
    pub fn with_entry(&self, entry: EntryHandle) -> Self {
        Self {
            logger: self.logger.clone(),
            entry: Some(entry),
        }
    }

    pub fn logger(&self) -> Option<&Logger> {
        self.logger.as_ref()
    }

    pub fn entry(&self) -> Option<&EntryHandle> {
        self.entry.as_ref()
    }

    /// The request entry's logger if one is installed, else the fallback
    /// logger.
    pub fn try_log(&self) -> Result<FieldLogger, ContextError> {
        if let Some(entry) = &self.entry {
            return Ok(entry.logger());
        }
        self.logger
            .as_ref()
            .map(Logger::fields)
            .ok_or(ContextError::MissingLogger)
    }

    /// Like [`try_log`](Self::try_log), but a missing logger is a setup bug
    /// and panics.
    pub fn log(&self) -> FieldLogger {
        match self.try_log() {
            Ok(logger) => logger,
            Err(e) => panic!("reqlog: {e}; install one with LogContext::with_logger at boot"),
        }
    }

    /// Run `fut` with this context as the task's current one.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }

    /// The context of the surrounding [`scope`](Self::scope), if any.
    pub fn current() -> Option<LogContext> {
        CURRENT.try_with(Clone::clone).ok()
    }
}

/// Context stored in `extensions`; empty when none was installed.
pub fn log_context(extensions: &Extensions) -> LogContext {
    extensions.get::<LogContext>().cloned().unwrap_or_default()
}

/// Logger for the request the extensions belong to.
///
/// # Panics
///
/// If neither a request entry nor a fallback logger is installed.
pub fn request_log<B>(request: &axum::http::Request<B>) -> FieldLogger {
    log_context(request.extensions()).log()
}

/// Logger for the current task scope.
///
/// # Panics
///
/// If called outside any [`LogContext::scope`] or the scope has no logger.
pub fn current_log() -> FieldLogger {
    LogContext::current().unwrap_or_default().log()
}

impl<S: Send + Sync> FromRequestParts<S> for LogContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(log_context(&parts.extensions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestLoggerConfig;
    use crate::entry::{LogEntry, RequestMetadata};
    use crate::sink::MemorySink;
    use serde_json::json;
    use std::sync::Arc;

    fn entry(logger: &Logger) -> EntryHandle {
        let config = RequestLoggerConfig {
            write_start_line: false,
            ..Default::default()
        };
        EntryHandle::new(LogEntry::new(logger, &RequestMetadata::default(), &config))
    }

    #[test]
    fn test_resolve_prefers_entry() {
        let sink = Arc::new(MemorySink::new(8));
        let logger = Logger::from_arc(sink.clone());
        let base = LogContext::new().with_logger(logger.clone());

        base.log().info("boot");
        assert!(sink.records()[0].fields.is_empty());

        let handle = entry(&logger);
        handle.add_field("article", 123);
        let ctx = base.with_entry(handle);
        ctx.log().info("inside");
        assert_eq!(sink.records()[1].field("article"), Some(&json!(123)));

        // The base context is unchanged by deriving.
        assert!(base.entry().is_none());
    }

    #[test]
    fn test_missing_logger() {
        let ctx = LogContext::new();
        assert!(matches!(ctx.try_log(), Err(ContextError::MissingLogger)));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| ctx.log()));
        assert!(result.is_err());
    }

    #[test]
    fn test_entry_without_fallback_logger() {
        let logger = Logger::new(MemorySink::new(1));
        let ctx = LogContext::new().with_entry(entry(&logger));
        assert!(ctx.try_log().is_ok());
    }

    #[tokio::test]
    async fn test_task_local_scope() {
        assert!(LogContext::current().is_none());
        let sink = Arc::new(MemorySink::new(8));
        let ctx = LogContext::new().with_logger(Logger::from_arc(sink.clone()));
        ctx.scope(async {
            tokio::task::yield_now().await;
            current_log().with_field("deep", true).info("nested");
        })
        .await;
        assert_eq!(sink.records()[0].field("deep"), Some(&json!(true)));
        assert!(LogContext::current().is_none());
    }

    #[tokio::test]
    async fn test_extractor() {
        let logger = Logger::new(MemorySink::new(1));
        let mut request = axum::http::Request::builder()
            .uri("/")
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(LogContext::new().with_logger(logger));
        let (mut parts, _) = request.into_parts();
        let ctx = LogContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(ctx.logger().is_some());
    }
}
