//! Prompt library commands

use anyhow::{Context, Result};
use auditlens_core::prompts::{default_prompts_dir, PromptId, PromptLibrary};

pub fn cmd_prompts_list() -> Result<()> {
    list_prompts(&mut PromptLibrary::new())
}

/// List prompts from `library` with their override status
pub fn list_prompts(library: &mut PromptLibrary) -> Result<()> {
    println!("Available Prompts:\n");
    println!("{:<25} {:>7}  {}", "ID", "VERSION", "OVERRIDE");
    println!("{}", "-".repeat(50));

    for id in PromptId::all() {
        let prompt = library
            .get(*id)
            .with_context(|| format!("Failed to load prompt {}", id.as_str()))?;
        let override_status = if prompt.is_override {
            "✓ Custom"
        } else {
            "Default"
        };
        println!(
            "{:<25} {:>7}  {}",
            id.as_str(),
            prompt.metadata.version,
            override_status
        );
    }

    println!();
    cmd_prompts_path()?;
    println!();
    println!("To customize a prompt:");
    println!("  1. auditlens prompts show detect_anomalies > <override dir>/detect_anomalies.md");
    println!("  2. Edit the file, keeping the frontmatter and {{{{placeholders}}}}");
    println!("  3. Restart the server to use the new prompt");

    Ok(())
}

/// Print a prompt, including frontmatter, so it can be saved as an override
pub fn cmd_prompts_show(prompt_id: &str) -> Result<()> {
    show_prompt(&mut PromptLibrary::new(), prompt_id)
}

pub fn show_prompt(library: &mut PromptLibrary, prompt_id: &str) -> Result<()> {
    let id: PromptId = prompt_id.parse().map_err(anyhow::Error::msg)?;
    let prompt = library
        .get(id)
        .with_context(|| format!("Failed to load prompt {}", prompt_id))?;

    println!("---");
    println!("id: {}", prompt.metadata.id);
    println!("version: {}", prompt.metadata.version);
    println!("---");
    println!();
    println!("{}", prompt.content);

    if let Some(path) = &prompt.override_path {
        eprintln!();
        eprintln!("(override: {})", path.display());
    }

    Ok(())
}

pub fn cmd_prompts_path() -> Result<()> {
    println!(
        "Override directory: {}",
        default_prompts_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not available)".to_string())
    );
    Ok(())
}
