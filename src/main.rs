mod app;
mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command, RunArgs};
use reqlog_core::config::Config;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Command::Run(RunArgs::default()));

    match command {
        Command::Run(args) => cmd_run(args),
    }
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    // A missing file means defaults; a broken one is fatal. The fallback can
    // only be reported once logging is up.
    let loaded = Config::load_optional(&args.config)
        .with_context(|| format!("failed to load config from '{}'", args.config))?;
    let missing = loaded.is_none();
    let config = loaded.unwrap_or_default();

    let level = args.log_level.as_deref().unwrap_or(&config.log_level);
    let _guard = reqlog_core::lifecycle::logging::init_logging(
        level,
        config.log_format,
        config.logging_to_file,
        config.log_dir.as_deref(),
    );
    if missing {
        tracing::warn!("Config file '{}' not found, using defaults", args.config);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let application = app::Application::build(config, &args)?;
        application.serve().await
    })
}
