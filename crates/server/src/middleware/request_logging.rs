//! The request logger: one [`LogEntry`] per request, completed exactly once.
//!
//! Each request moves through `start -> downstream running -> [panic] ->
//! complete`. The entry is created and installed before the downstream
//! service runs; a panic is turned into a 500 and recorded on the entry; the
//! completion line is written by [`ObservedBody`] once the response body has
//! been fully sent, or by [`CompletionGuard`] if the request is abandoned
//! before a response exists.

use crate::body::ObservedBody;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use reqlog_core::config::RequestLoggerConfig;
use reqlog_core::error::ServerError;
use reqlog_core::panic::CapturedPanic;
use reqlog_core::{EntryHandle, LogContext, LogEntry, LogLevel, Logger, RequestMetadata};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Status recorded for requests the client abandoned before a response was
/// produced.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Logger backend plus request logger options; the state of
/// [`request_logging_middleware`].
///
/// Panic entries carry the panic-site stack only once
/// [`install_backtrace_hook`](reqlog_core::panic::install_backtrace_hook) has
/// been called at startup; otherwise the stack is taken where the panic was
/// caught.
#[derive(Debug, Clone)]
pub struct HttpLogger {
    logger: Logger,
    config: Arc<RequestLoggerConfig>,
}

impl HttpLogger {
    pub fn new(logger: Logger, config: RequestLoggerConfig) -> Self {
        Self {
            logger,
            config: Arc::new(config),
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn config(&self) -> &RequestLoggerConfig {
        &self.config
    }

    fn timeout(&self) -> Option<Duration> {
        self.config.request_timeout_secs.map(Duration::from_secs)
    }

    fn new_entry(&self, request: &Request) -> EntryHandle {
        let meta = RequestMetadata::from_request(request);
        EntryHandle::new(LogEntry::new(&self.logger, &meta, &self.config))
    }
}

/// Completes the entry as canceled if dropped while still armed.
///
/// Held across the downstream await: when the connection goes away, hyper
/// drops the request future and this is the only code that still runs.
struct CompletionGuard {
    entry: Option<EntryHandle>,
    start: Instant,
}

impl CompletionGuard {
    fn new(entry: EntryHandle, start: Instant) -> Self {
        Self {
            entry: Some(entry),
            start,
        }
    }

    fn disarm(&mut self) {
        self.entry = None;
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            entry.add_field("canceled", true);
            entry.raise_level(LogLevel::Warn);
            entry.complete(CLIENT_CLOSED_REQUEST, 0, self.start.elapsed());
        }
    }
}

/// Middleware that creates, installs and completes the request's log entry.
///
/// A [`LogContext`] already present in the extensions (installed at boot)
/// is derived from, so its fallback logger stays reachable; otherwise the
/// [`HttpLogger`]'s logger becomes the fallback.
pub async fn request_logging_middleware(
    State(http): State<HttpLogger>,
    mut request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let entry = http.new_entry(&request);
    let method = request.method().clone();

    let base = request
        .extensions()
        .get::<LogContext>()
        .filter(|ctx| ctx.logger().is_some())
        .cloned()
        .unwrap_or_else(|| LogContext::new().with_logger(http.logger.clone()));
    let ctx = base.with_entry(entry.clone());
    request.extensions_mut().insert(ctx.clone());

    let mut guard = CompletionGuard::new(entry.clone(), start);
    let downstream = AssertUnwindSafe(ctx.scope(next.run(request))).catch_unwind();
    // `None` means the deadline passed and the downstream future was dropped.
    let outcome = match http.timeout() {
        Some(limit) => tokio::time::timeout(limit, downstream).await.ok(),
        None => Some(downstream.await),
    };
    guard.disarm();

    let response = match outcome {
        Some(Ok(response)) => response,
        Some(Err(payload)) => {
            // Still on the polling thread, so the hook's backtrace is ours.
            let captured = CapturedPanic::from_payload(payload);
            entry.record_panic(&captured);
            ServerError::Panic.into_response()
        }
        None => {
            entry.add_field("timed_out", true);
            entry.raise_level(LogLevel::Warn);
            ServerError::Timeout.into_response()
        }
    };

    let (parts, body) = response.into_parts();
    let body = ObservedBody::new(body, entry, &method, parts.status, start);
    Response::from_parts(parts, Body::new(body))
}
