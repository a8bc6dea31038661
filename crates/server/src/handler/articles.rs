//! Demo article routes. The route-level middleware here exercise the
//! field-mutation API from inside the request logger.

use axum::extract::{Query, Request};
use axum::middleware::Next;
use axum::response::Response;
use reqlog_core::context::{current_log, request_log};
use reqlog_core::fields::{set_current_field, set_log_field, set_request_log_field};
use reqlog_core::LogContext;
use serde::Deserialize;

pub const DEMO_ARTICLE_ID: u64 = 123;

/// Tags every article request with the article it resolves to.
pub async fn article_ctx(request: Request, next: Next) -> Response {
    request_log(&request).warn("inside article context");
    set_request_log_field(&request, "article", DEMO_ARTICLE_ID);
    next.run(request).await
}

pub async fn paginate_ctx(request: Request, next: Next) -> Response {
    request_log(&request).warn("inside paginate context");
    if let Some(ctx) = request.extensions().get::<LogContext>() {
        set_log_field(ctx, "paginate", true);
    }
    next.run(request).await
}

pub async fn list(ctx: LogContext) -> &'static str {
    ctx.log().info("articles list");
    "list"
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: Option<String>,
}

pub async fn search(Query(params): Query<SearchParams>) -> String {
    if let Some(q) = &params.q {
        set_current_field("query", q.as_str());
    }
    current_log().info("articles search");
    match params.q {
        Some(q) => format!("search: {q}"),
        None => "search".to_string(),
    }
}
