//! Prompt library for the analysis backends
//!
//! Prompts are loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/auditlens/prompts/)
//! 2. Fall back to embedded defaults (compiled into binary)

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default prompts (compiled into binary)
mod defaults {
    pub const DETECT_ANOMALIES: &str = include_str!("../../../prompts/detect_anomalies.md");
}

/// Known prompt IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Outlier detection over a transaction sample
    DetectAnomalies,
}

impl PromptId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DetectAnomalies => "detect_anomalies",
        }
    }

    pub fn all() -> &'static [PromptId] {
        &[Self::DetectAnomalies]
    }

    fn default_content(&self) -> &'static str {
        match self {
            Self::DetectAnomalies => defaults::DETECT_ANOMALIES,
        }
    }
}

impl std::str::FromStr for PromptId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("Unknown prompt ID: {}", s))
    }
}

/// Prompt frontmatter metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    /// Bumped whenever the wording changes
    pub version: u32,
}

/// A loaded prompt with metadata and content
#[derive(Debug, Clone)]
pub struct Prompt {
    pub metadata: PromptMetadata,
    pub content: String,
    pub is_override: bool,
    pub override_path: Option<PathBuf>,
}

impl Prompt {
    /// Render the prompt with `{{var}}` placeholders replaced
    ///
    /// Substitution is a single pass over the template, so placeholder-like
    /// text inside a value is never expanded. Unknown placeholders are kept.
    pub fn render(&self, vars: &HashMap<&str, &str>) -> String {
        placeholder_pattern()
            .replace_all(&self.content, |caps: &Captures| match vars.get(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("valid regex"))
}

/// Prompt library for loading and caching prompts
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
    cache: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Create a new prompt library with default paths
    pub fn new() -> Self {
        Self {
            override_dir: default_prompts_dir(),
            cache: HashMap::new(),
        }
    }

    /// Create a prompt library with a custom override directory
    pub fn with_override_dir(path: PathBuf) -> Self {
        Self {
            override_dir: Some(path),
            cache: HashMap::new(),
        }
    }

    /// Create a prompt library with no override directory (embedded only)
    pub fn embedded_only() -> Self {
        Self {
            override_dir: None,
            cache: HashMap::new(),
        }
    }

    /// Get a prompt by ID, loading from override or default
    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        if !self.cache.contains_key(&id) {
            let prompt = self.load(id)?;
            self.cache.insert(id, prompt);
        }
        self.cache
            .get(&id)
            .ok_or_else(|| Error::InvalidData(format!("Prompt {} not cached", id.as_str())))
    }

    fn load(&self, id: PromptId) -> Result<Prompt> {
        if let Some(ref override_dir) = self.override_dir {
            let override_path = override_dir.join(format!("{}.md", id.as_str()));
            if override_path.exists() {
                let content = fs::read_to_string(&override_path).map_err(|e| {
                    Error::InvalidData(format!("Failed to read prompt override: {}", e))
                })?;
                let (metadata, body) = parse_prompt(&content)?;
                return Ok(Prompt {
                    metadata,
                    content: body,
                    is_override: true,
                    override_path: Some(override_path),
                });
            }
        }

        let (metadata, body) = parse_prompt(id.default_content())?;
        Ok(Prompt {
            metadata,
            content: body,
            is_override: false,
            override_path: None,
        })
    }

    /// Clear the cache (useful after editing override files)
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("auditlens").join("prompts"))
}

/// Parse a prompt file into metadata and body
fn parse_prompt(content: &str) -> Result<(PromptMetadata, String)> {
    let content = content.trim();

    if !content.starts_with("---") {
        return Err(Error::InvalidData(
            "Prompt must start with YAML frontmatter (---)".into(),
        ));
    }

    let rest = &content[3..];
    let end = rest.find("---").ok_or_else(|| {
        Error::InvalidData("Prompt frontmatter not closed (missing second ---)".into())
    })?;

    let frontmatter = rest[..end].trim();
    let body = rest[end + 3..].trim();

    let metadata: PromptMetadata = serde_yaml::from_str(frontmatter)?;
    Ok((metadata, body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prompt() {
        let content = "---\nid: test_prompt\nversion: 2\n---\n\nHello {{name}}.";
        let (metadata, body) = parse_prompt(content).unwrap();
        assert_eq!(metadata.id, "test_prompt");
        assert_eq!(metadata.version, 2);
        assert_eq!(body, "Hello {{name}}.");
    }

    #[test]
    fn test_prompt_id_from_str() {
        assert_eq!(
            "detect_anomalies".parse::<PromptId>().unwrap(),
            PromptId::DetectAnomalies
        );
        assert!("classify_merchant".parse::<PromptId>().is_err());
    }

    #[test]
    fn test_parse_prompt_requires_frontmatter() {
        assert!(parse_prompt("no frontmatter").is_err());
        assert!(parse_prompt("---\nid: x\nversion: 1\n").is_err());
    }

    #[test]
    fn test_prompt_render() {
        let (metadata, content) =
            parse_prompt("---\nid: t\nversion: 1\n---\n{{a}} and {{b}} and {{a}}").unwrap();
        let prompt = Prompt {
            metadata,
            content,
            is_override: false,
            override_path: None,
        };
        let mut vars = HashMap::new();
        vars.insert("a", "x");
        vars.insert("b", "y");
        assert_eq!(prompt.render(&vars), "x and y and x");
    }

    #[test]
    fn test_prompt_render_does_not_expand_values() {
        let (metadata, content) =
            parse_prompt("---\nid: t\nversion: 1\n---\n{{data}} in {{lang}} {{other}}").unwrap();
        let prompt = Prompt {
            metadata,
            content,
            is_override: false,
            override_path: None,
        };
        let mut vars = HashMap::new();
        vars.insert("data", "note={{lang}}");
        vars.insert("lang", "Thai");
        assert_eq!(prompt.render(&vars), "note={{lang}} in Thai {{other}}");
    }

    #[test]
    fn test_embedded_detect_anomalies() {
        let mut lib = PromptLibrary::embedded_only();
        let prompt = lib.get(PromptId::DetectAnomalies).unwrap();
        assert_eq!(prompt.metadata.id, "detect_anomalies");
        assert!(!prompt.is_override);
        for var in ["{{dataset}}", "{{language}}", "{{row_count}}", "{{max_anomalies}}"] {
            assert!(prompt.content.contains(var), "missing {}", var);
        }
    }

    #[test]
    fn test_override_dir_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("detect_anomalies.md"),
            "---\nid: detect_anomalies\nversion: 9\n---\nCustom {{dataset}}",
        )
        .unwrap();

        let mut lib = PromptLibrary::with_override_dir(dir.path().to_path_buf());
        let prompt = lib.get(PromptId::DetectAnomalies).unwrap();
        assert!(prompt.is_override);
        assert_eq!(prompt.metadata.version, 9);
        assert_eq!(prompt.content, "Custom {{dataset}}");
    }
}
