//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// AuditLens - Flag anomalous transactions with an LLM
#[derive(Parser)]
#[command(name = "auditlens")]
#[command(about = "Upload transaction CSVs, store them, and have an LLM flag outliers", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to ~/.config/auditlens/config.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Save a CSV to the database and analyze it for anomalies
    Analyze {
        /// CSV file with BA, monthly, actCode, amount columns
        #[arg(short, long)]
        file: PathBuf,

        /// Print the dashboard as JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Skip the database write even if one is configured
        #[arg(long)]
        no_persist: bool,

        /// What to do if the database write fails: continue, abort
        #[arg(long)]
        on_persist_failure: Option<String>,

        /// Override the configured model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Validate a CSV without saving or analyzing it
    Check {
        /// CSV file to validate
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Start the web dashboard
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Directory of extra static files served as a fallback
        #[arg(long)]
        static_dir: Option<PathBuf>,

        /// Allowed CORS origin (repeatable)
        #[arg(long = "allowed-origin")]
        allowed_origins: Vec<String>,
    },

    /// Show the effective configuration (secrets redacted)
    Config,

    /// Manage the analysis prompt
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List prompts and whether they are overridden
    List,

    /// Print a prompt's effective content
    Show {
        /// Prompt ID (e.g. detect_anomalies)
        id: String,
    },

    /// Print the override directory
    Path,
}
