use axum::{extract::Request, middleware::Next, response::Response};
use futures::FutureExt;
use reqlog_core::panic::{last_backtrace, payload_message};
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;

/// Development aid: print a downstream panic and its stack to stderr, then
/// keep unwinding so the request logger still records it.
pub async fn print_panics_middleware(request: Request, next: Next) -> Response {
    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            let stack =
                last_backtrace().unwrap_or_else(|| Backtrace::force_capture().to_string());
            eprintln!("PANIC: {}\n{stack}", payload_message(payload.as_ref()));
            std::panic::resume_unwind(payload)
        }
    }
}
