use axum::extract::State;
use axum::{extract::Request, middleware::Next, response::Response};
use reqlog_core::counter::RequestCounter;
use reqlog_core::fields::set_request_log_field;
use std::sync::Arc;

/// Middleware that bumps the process-wide request tally and attaches the
/// value to the request's log entry as `count`.
///
/// Must sit inside the request logger; outside it there is no entry and the
/// field is dropped.
pub async fn request_counter_middleware(
    State(counter): State<Arc<RequestCounter>>,
    request: Request,
    next: Next,
) -> Response {
    set_request_log_field(&request, "count", counter.increment());
    next.run(request).await
}
