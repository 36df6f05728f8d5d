//! CLI module for Atelier
//!
//! Provides the host commands:
//! - `run`: start a multi-window session driven from stdin
//! - `generate`: assemble one app description and print it

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Atelier session host CLI
#[derive(Parser, Debug)]
#[command(name = "atelier")]
#[command(about = "Prompt-assembled desktop apps")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a multi-window session; each stdin line is a prompt
    Run {
        /// Number of windows to open
        #[arg(long)]
        windows: Option<usize>,
        /// Config file path (defaults to the platform config dir)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Assemble one app from a description and print it as JSON
    Generate {
        /// Natural-language description of the app
        description: String,
        /// Config file path (defaults to the platform config dir)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Run { windows, config }) => {
            let config = crate::config::AtelierConfig::load(config.as_deref())?;
            let windows = windows.unwrap_or(config.session.windows);
            crate::session::run(config, windows).await
        }
        Some(Commands::Generate {
            description,
            config,
        }) => {
            let config = crate::config::AtelierConfig::load(config.as_deref())?;
            let app = crate::session::generate_once(&config, &description).await?;
            println!("{}", serde_json::to_string_pretty(&app)?);
            Ok(())
        }
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
