//! CLI argument parsing with subcommand architecture.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "reqlog", version, about = "Demo server for request-scoped logging")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the demo server (default when no subcommand is given)
    Run(RunArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to config file
    #[arg(short, long, default_value = "config.yaml", env = "REQLOG_CONFIG")]
    pub config: String,

    /// Listen host
    #[arg(long, env = "REQLOG_HOST")]
    pub host: Option<String>,

    /// Listen port
    #[arg(long, env = "REQLOG_PORT")]
    pub port: Option<u16>,

    /// Log level (overrides config)
    #[arg(long, env = "REQLOG_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            config: "config.yaml".to_string(),
            host: None,
            port: None,
            log_level: None,
        }
    }
}
