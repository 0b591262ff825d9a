//! Shared utilities and the `config` command

use std::path::Path;

use anyhow::{Context, Result};
use auditlens_core::config::{default_config_path, BackendKind, Config};

/// Load configuration from file (explicit or default) and environment
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path).with_context(|| match path {
        Some(p) => format!("Failed to load config from {}", p.display()),
        None => "Failed to load configuration".to_string(),
    })
}

pub fn cmd_config(config: &Config, path: Option<&Path>) -> Result<()> {
    let source = match path {
        Some(p) => p.display().to_string(),
        None => match default_config_path().filter(|p| p.exists()) {
            Some(p) => p.display().to_string(),
            None => "(defaults + environment)".to_string(),
        },
    };

    println!("# Source: {}", source);
    println!(
        "{}",
        toml::to_string_pretty(&config.redacted()).context("Failed to render configuration")?
    );

    if !config.persistence_enabled() {
        println!("# ℹ️  Database not configured: set SUPABASE_URL to persist uploads");
    }
    if config.analysis.backend == BackendKind::Gemini && config.analysis.api_key.is_none() {
        println!("# ⚠️  GEMINI_API_KEY not set: analysis will fail");
    }

    Ok(())
}
