//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Shared utilities (config loading) and `config` command
//! - `analyze` - Full save + analyze run, and `check` validation
//! - `prompts` - Prompt library inspection
//! - `serve` - Web server command

pub mod analyze;
pub mod core;
pub mod prompts;
pub mod serve;

// Re-export command functions for main.rs
pub use analyze::*;
pub use core::*;
pub use prompts::*;
pub use serve::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
