//! Application struct that encapsulates server assembly and serving logic.

use crate::cli::RunArgs;
use reqlog_core::config::Config;
use reqlog_core::lifecycle::signal::{SignalHandler, wait_for_shutdown};
use reqlog_core::panic::install_backtrace_hook;
use reqlog_core::{LogContext, Logger};
use reqlog_server::AppState;
use reqlog_server::middleware::request_logging::HttpLogger;
use std::net::SocketAddr;
use std::time::Duration;

pub struct Application {
    config: Config,
    app_router: axum::Router,
    log_context: LogContext,
}

impl Application {
    /// Apply CLI overrides, install the logger backend and build the router.
    pub fn build(mut config: Config, args: &RunArgs) -> anyhow::Result<Self> {
        if let Some(ref host) = args.host {
            config.host = host.clone();
        }
        if let Some(port) = args.port {
            config.port = port;
        }

        // Panic entries carry the panic-site stack only with the hook in place.
        install_backtrace_hook();
        let http_logger = HttpLogger::new(Logger::tracing(), config.request_logger.clone());
        let state = AppState::new(http_logger);
        let log_context = state.log_context.clone();
        log_context
            .try_log()?
            .with_field("version", env!("CARGO_PKG_VERSION"))
            .info("booting up server");

        let app_router = reqlog_server::build_router(state);
        Ok(Self {
            config,
            app_router,
            log_context,
        })
    }

    /// Serve HTTP until SIGINT/SIGTERM, then drain gracefully.
    pub async fn serve(self) -> anyhow::Result<()> {
        let Self {
            config,
            app_router,
            log_context,
        } = self;

        let (signal_handler, shutdown_rx) = SignalHandler::new();
        tokio::spawn(signal_handler.run());

        if config.ticker_interval_secs > 0 {
            let period = Duration::from_secs(config.ticker_interval_secs);
            let mut ticker_rx = shutdown_rx.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Ok(log) = log_context.try_log() {
                                log.info("tick");
                            }
                        }
                        _ = ticker_rx.wait_for(|stop| *stop) => break,
                    }
                }
            });
        }

        let addr = format!("{}:{}", config.host, config.port);
        tracing::info!("Starting HTTP server on {addr}");
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        axum::serve(
            listener,
            app_router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
        .await?;

        tracing::info!("Server shut down.");
        Ok(())
    }
}
