//! AuditLens CLI - LLM-assisted transaction anomaly detection
//!
//! Usage:
//!   auditlens analyze --file CSV   Save and analyze a transaction file
//!   auditlens check --file CSV     Validate a file without side effects
//!   auditlens serve --port 3000    Start the web dashboard
//!   auditlens config               Show the effective configuration

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Analyze {
            file,
            json,
            no_persist,
            on_persist_failure,
            model,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let options = commands::AnalyzeOptions {
                json,
                no_persist,
                on_persist_failure: on_persist_failure.as_deref(),
                model: model.as_deref(),
            };
            commands::cmd_analyze(&config, &file, &options).await
        }
        Commands::Check { file } => commands::cmd_check(&file),
        Commands::Serve {
            port,
            host,
            static_dir,
            allowed_origins,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_serve(&config, &host, port, static_dir.as_deref(), allowed_origins).await
        }
        Commands::Config => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_config(&config, cli.config.as_deref())
        }
        Commands::Prompts { action } => match action {
            None | Some(PromptsAction::List) => commands::cmd_prompts_list(),
            Some(PromptsAction::Show { id }) => commands::cmd_prompts_show(&id),
            Some(PromptsAction::Path) => commands::cmd_prompts_path(),
        },
    }
}
