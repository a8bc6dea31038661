pub mod articles;
pub mod health;

use reqlog_core::LogContext;

pub async fn index(ctx: LogContext) -> &'static str {
    ctx.log().info("index");
    "index"
}

/// Always panics; shows panic recovery end to end.
pub async fn trigger_panic(ctx: LogContext) -> &'static str {
    ctx.log().info("about to panic");
    panic!("boom");
}
