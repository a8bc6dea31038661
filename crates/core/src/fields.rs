//! Adding fields to the current request's log entry.
//!
//! Every function here is a silent no-op when no entry is installed, so
//! code can call them without knowing whether it runs inside a request.

use crate::context::{LogContext, log_context};
use crate::logger::Fields;
use axum::http::Request;
use serde_json::Value;

pub fn set_log_field(ctx: &LogContext, key: impl Into<String>, value: impl Into<Value>) {
    if let Some(entry) = ctx.entry() {
        entry.add_field(key, value);
    }
}

pub fn set_log_fields(ctx: &LogContext, fields: Fields) {
    if let Some(entry) = ctx.entry() {
        entry.add_fields(fields);
    }
}

pub fn set_request_log_field<B>(
    request: &Request<B>,
    key: impl Into<String>,
    value: impl Into<Value>,
) {
    set_log_field(&log_context(request.extensions()), key, value);
}

pub fn set_request_log_fields<B>(request: &Request<B>, fields: Fields) {
    set_log_fields(&log_context(request.extensions()), fields);
}

/// Set a field on the entry of the surrounding task scope.
pub fn set_current_field(key: impl Into<String>, value: impl Into<Value>) {
    if let Some(ctx) = LogContext::current() {
        set_log_field(&ctx, key, value);
    }
}

pub fn set_current_fields(fields: Fields) {
    if let Some(ctx) = LogContext::current() {
        set_log_fields(&ctx, fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestLoggerConfig;
    use crate::entry::{EntryHandle, LogEntry, RequestMetadata};
    use crate::logger::Logger;
    use crate::sink::MemorySink;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_noop_without_entry() {
        let sink = Arc::new(MemorySink::new(4));
        let ctx = LogContext::new().with_logger(Logger::from_arc(sink.clone()));
        set_log_field(&ctx, "ignored", 1);
        set_log_field(&LogContext::new(), "ignored", 1);
        set_current_field("ignored", 1);
        assert!(ctx.log().fields().is_empty());

        let request = Request::builder().uri("/").body(()).unwrap();
        set_request_log_field(&request, "ignored", 1);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_mutations_reach_entry() {
        let sink = Arc::new(MemorySink::new(4));
        let logger = Logger::from_arc(sink.clone());
        let config = RequestLoggerConfig {
            write_start_line: false,
            ..Default::default()
        };
        let handle = EntryHandle::new(LogEntry::new(
            &logger,
            &RequestMetadata::default(),
            &config,
        ));
        let ctx = LogContext::new().with_entry(handle.clone());

        let mut request = Request::builder().uri("/").body(()).unwrap();
        request.extensions_mut().insert(ctx.clone());
        set_request_log_field(&request, "article", 123);

        let mut batch = Fields::new();
        batch.insert("paginate".into(), json!(true));
        set_request_log_fields(&request, batch);

        ctx.scope(async {
            set_current_field("deep", "yes");
            let mut more = Fields::new();
            more.insert("article".into(), json!(124));
            set_current_fields(more);
        })
        .await;

        let fields = handle.logger().fields().clone();
        assert_eq!(fields["article"], json!(124));
        assert_eq!(fields["paginate"], json!(true));
        assert_eq!(fields["deep"], json!("yes"));
    }
}
