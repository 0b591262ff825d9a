//! Analyze and check command implementations

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use auditlens_core::{
    ai::{analysis_sample, MAX_ANALYSIS_ROWS},
    config::Config,
    ingest::parse_transactions_file,
    models::{Phase, REQUIRED_COLUMNS},
    persist::batch_count,
    pipeline::{Orchestrator, SessionStatus},
    view::{Dashboard, MAX_DISPLAY_ROWS},
};

use super::truncate;

/// Flags for `auditlens analyze`
#[derive(Debug, Default)]
pub struct AnalyzeOptions<'a> {
    pub json: bool,
    pub no_persist: bool,
    pub on_persist_failure: Option<&'a str>,
    pub model: Option<&'a str>,
}

/// Result of one CLI pipeline run
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub phase: Phase,
    pub status: SessionStatus,
    pub dashboard: Option<Dashboard>,
}

/// Apply command-line overrides on top of the loaded configuration
pub fn effective_config(config: &Config, options: &AnalyzeOptions<'_>) -> Result<Config> {
    let mut config = config.clone();
    if let Some(policy) = options.on_persist_failure {
        config.on_persistence_failure = policy.parse().map_err(anyhow::Error::msg)?;
    }
    if options.no_persist {
        config.database.url = None;
    }
    if let Some(model) = options.model {
        config.analysis.model = model.to_string();
    }
    Ok(config)
}

/// Ingest, save, and analyze `file`, returning the settled session
pub async fn run_analysis(
    config: &Config,
    file: &Path,
    options: &AnalyzeOptions<'_>,
) -> Result<AnalysisOutcome> {
    let config = effective_config(config, options)?;
    let quiet = options.json;

    let orchestrator = Orchestrator::from_config(&config).with_observer(move |phase| {
        if !quiet && phase.is_busy() {
            println!("⏳ {}", phase.status_text());
            println!("   {}", phase.status_detail());
        }
    });

    let csv_file =
        File::open(file).with_context(|| format!("Failed to open file: {}", file.display()))?;
    let rows = orchestrator
        .upload(BufReader::new(csv_file))
        .with_context(|| format!("Failed to ingest {}", file.display()))?;

    if !quiet {
        println!("📥 Loaded {} rows from {}", rows, file.display());
        if !config.persistence_enabled() {
            println!("   Database: not configured, skipping save");
        }
    }

    let phase = orchestrator.process().await;
    Ok(AnalysisOutcome {
        phase,
        status: orchestrator.status(),
        dashboard: orchestrator.dashboard(),
    })
}

pub async fn cmd_analyze(config: &Config, file: &Path, options: &AnalyzeOptions<'_>) -> Result<()> {
    let outcome = run_analysis(config, file, options).await?;

    match (outcome.phase, outcome.dashboard) {
        (Phase::Success, Some(dashboard)) => {
            if options.json {
                println!("{}", serde_json::to_string_pretty(&dashboard)?);
            } else {
                print_dashboard(&dashboard);
            }
            Ok(())
        }
        (Phase::Failed, _) => bail!(
            "Analysis failed: {}",
            outcome.status.error.unwrap_or_default()
        ),
        (phase, _) => bail!("Pipeline stopped in unexpected phase: {}", phase),
    }
}

fn print_dashboard(dashboard: &Dashboard) {
    println!();
    println!("✅ Analysis complete");
    println!();
    println!("Summary:");
    println!("  {}", dashboard.summary);
    println!();
    println!(
        "Rows: {} uploaded, {} plotted, {} flagged",
        dashboard.total_rows,
        dashboard.scatter.len(),
        dashboard.table.len()
    );

    if !dashboard.unmatched_ids.is_empty() {
        println!(
            "⚠️  {} anomaly id(s) matched no plotted row: {:?}",
            dashboard.unmatched_ids.len(),
            dashboard.unmatched_ids
        );
    }

    if dashboard.table.is_empty() {
        println!();
        println!("No anomalies found.");
        return;
    }

    println!();
    println!(
        "{:>3}  {:<12} {:<8} {:>16}  {:<8}  {}",
        "#", "ACTCODE", "MONTHLY", "AMOUNT", "SEVERITY", "REASON"
    );
    println!("{}", "-".repeat(100));
    for row in &dashboard.table {
        let badge = match row.severity.as_str() {
            "High" => "🔴",
            "Medium" => "🟡",
            _ => "🔵",
        };
        println!(
            "{:>3}  {:<12} {:<8} {:>16}  {} {:<6}  {}",
            row.rank,
            truncate(&row.act_code, 12),
            row.monthly,
            row.amount_display,
            badge,
            row.severity.as_str(),
            truncate(&row.reason, 60)
        );
    }
}

/// Validate a file and report what a run would do with it
pub fn cmd_check(file: &Path) -> Result<()> {
    println!("🔍 Checking {}...", file.display());

    let ingested = parse_transactions_file(file)
        .with_context(|| format!("{} is not a valid transaction file", file.display()))?;
    let rows = &ingested.rows;

    let extra: Vec<&str> = ingested
        .headers
        .iter()
        .map(|h| h.as_str())
        .filter(|h| !REQUIRED_COLUMNS.contains(h))
        .collect();

    println!("✅ {} rows, required columns present", rows.len());
    if !extra.is_empty() {
        println!("   Extra columns: {}", extra.join(", "));
    }

    let total: f64 = rows.iter().map(|r| r.amount).sum();
    let min = rows.iter().map(|r| r.amount).fold(f64::INFINITY, f64::min);
    let max = rows.iter().map(|r| r.amount).fold(f64::NEG_INFINITY, f64::max);
    println!("   Amount: total {:.2}, min {:.2}, max {:.2}", total, min, max);

    println!();
    println!("A run would:");
    println!(
        "  • save {} rows in {} batch(es)",
        rows.len(),
        batch_count(rows.len())
    );
    println!(
        "  • send {} rows to the model{}",
        analysis_sample(rows).len(),
        if rows.len() > MAX_ANALYSIS_ROWS {
            " (truncated)"
        } else {
            ""
        }
    );
    println!("  • plot {} rows", rows.len().min(MAX_DISPLAY_ROWS));

    Ok(())
}
