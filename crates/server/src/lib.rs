pub mod body;
pub mod handler;
pub mod middleware;

use axum::routing::get;
use axum::{Extension, Router, middleware as axum_mw};
use middleware::request_logging::HttpLogger;
use reqlog_core::LogContext;
use reqlog_core::counter::RequestCounter;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub http_logger: HttpLogger,
    pub counter: Arc<RequestCounter>,
    /// Process-wide context carrying the fallback logger; every request's
    /// context is derived from it.
    pub log_context: LogContext,
}

impl AppState {
    pub fn new(http_logger: HttpLogger) -> Self {
        let log_context = LogContext::new().with_logger(http_logger.logger().clone());
        Self {
            http_logger,
            counter: Arc::new(RequestCounter::new()),
            log_context,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let article_routes = Router::new()
        .route(
            "/",
            get(handler::articles::list).route_layer(axum_mw::from_fn(
                handler::articles::paginate_ctx,
            )),
        )
        .route("/search", get(handler::articles::search))
        .route_layer(axum_mw::from_fn(handler::articles::article_ctx));

    let mut router = Router::new()
        .route("/", get(handler::index))
        .route("/panic", get(handler::trigger_panic))
        .route("/health", get(handler::health::health))
        .nest("/articles", article_routes)
        .with_state(state.clone());

    // Layers run outer → inner in reverse order of the calls below.
    if state.http_logger.config().print_panics {
        router = router.layer(axum_mw::from_fn(
            middleware::print_panics::print_panics_middleware,
        ));
    }
    router
        .layer(axum_mw::from_fn_with_state(
            state.counter.clone(),
            middleware::request_counter::request_counter_middleware,
        ))
        .layer(axum_mw::from_fn_with_state(
            state.http_logger.clone(),
            middleware::request_logging::request_logging_middleware,
        ))
        .layer(axum_mw::from_fn(
            middleware::request_id::request_id_middleware,
        ))
        .layer(Extension(state.log_context))
}
