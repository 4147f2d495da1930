//! CLI module for Agentgate
//!
//! - `serve`: run the gateway
//! - `config`: print the resolved configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod config;

/// Agentgate CLI
#[derive(Parser, Debug)]
#[command(name = "agentgate")]
#[command(about = "Distributed agent runtime gateway")]
#[command(version)]
pub struct Cli {
    /// Extra configuration file, applied after config/local.toml
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the gateway (default)
    Serve,
    /// Print the resolved configuration as TOML
    Config,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Some(Commands::Config) => config::run(config_path),
        Some(Commands::Serve) | None => {
            let config = crate::server::load_config(config_path)?;
            crate::server::run(config).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_with_config() {
        let cli = Cli::parse_from(["agentgate", "serve", "--config", "gw.toml", "--log-json"]);
        assert!(matches!(cli.command, Some(Commands::Serve)));
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("gw.toml")));
        assert!(cli.log_json);
    }

    #[test]
    fn test_no_subcommand_defaults_to_serve() {
        let cli = Cli::parse_from(["agentgate"]);
        assert!(cli.command.is_none());
        assert!(!cli.log_json);
    }

    #[test]
    fn test_cli_definition_is_valid() {
        <Cli as clap::CommandFactory>::command().debug_assert();
    }
}
