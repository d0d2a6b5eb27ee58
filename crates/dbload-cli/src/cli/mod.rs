//! CLI for dbload.

mod commands;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use dbload_core::config::{self, DbloadConfig};

use commands::{run_completions, run_load, run_serve};

/// Top-level CLI for dbload.
#[derive(Debug, Parser)]
#[command(name = "dbload")]
#[command(about = "dbload: load SQLite databases from URLs in the background", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/dbload/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the HTTP load service.
    Serve {
        /// Listen address (overrides `bind` from the config).
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Submit a URL to a running service and follow its progress.
    Load {
        /// HTTP/HTTPS URL of a SQLite database (or a zip / tar.gz containing one).
        url: String,

        /// Name to install the database under.
        #[arg(long)]
        name: String,

        /// Root URL of the service.
        #[arg(long, default_value = "http://127.0.0.1:8001", value_name = "URL")]
        server: String,

        /// Bearer token, if the service requires one.
        #[arg(long, env = "DBLOAD_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Print a shell completion script.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn load_config(path: Option<&Path>) -> Result<DbloadConfig> {
    let cfg = match path {
        Some(p) => config::load_from_path(p)?,
        None => config::load_or_init()?,
    };
    tracing::debug!("loaded config: {:?}", cfg);
    Ok(cfg)
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Serve { bind } => {
                let cfg = load_config(cli.config.as_deref())?;
                run_serve(&cfg, bind.as_deref()).await?;
            }
            CliCommand::Load {
                url,
                name,
                server,
                token,
            } => {
                let cfg = load_config(cli.config.as_deref())?;
                run_load(&cfg, &server, &url, &name, token).await?;
            }
            CliCommand::Completions { shell } => run_completions(shell),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
