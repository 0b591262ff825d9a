//! Server command implementation

use std::path::Path;

use anyhow::{Context, Result};
use auditlens_core::{ai::AnalysisBackend, config::Config, pipeline::Orchestrator};
use auditlens_server::ServerConfig;

pub async fn cmd_serve(
    config: &Config,
    host: &str,
    port: u16,
    static_dir: Option<&Path>,
    allowed_origins: Vec<String>,
) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config);

    println!("🚀 Starting AuditLens web server...");
    println!("   Listening: http://{}:{}", host, port);
    println!(
        "   Analysis: {} ({})",
        orchestrator.analysis().model(),
        orchestrator.analysis().host()
    );
    match orchestrator.persistence().endpoint() {
        Some(endpoint) => println!("   Database: {}", endpoint),
        None => println!("   Database: not configured (uploads are not saved)"),
    }
    println!(
        "   On database failure: {}",
        config.on_persistence_failure
    );
    if let Some(dir) = static_dir {
        println!("   Static files: {}", dir.display());
    }
    if !allowed_origins.is_empty() {
        println!("   CORS origins: {}", allowed_origins.join(", "));
    }

    let static_dir = static_dir
        .map(|d| {
            d.to_str()
                .map(|s| s.to_string())
                .with_context(|| format!("Static dir is not valid UTF-8: {}", d.display()))
        })
        .transpose()?;

    auditlens_server::serve(
        orchestrator,
        host,
        port,
        static_dir.as_deref(),
        ServerConfig { allowed_origins },
    )
    .await
}
