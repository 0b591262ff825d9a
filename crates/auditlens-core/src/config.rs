//! Runtime configuration
//!
//! Configuration is assembled once (defaults, then an optional TOML file, then
//! environment variables) and handed to the persistence and analysis clients
//! explicitly. Nothing below reads the environment after construction.
//!
//! Environment variables:
//! - `SUPABASE_URL`: hosted database base URL (unset disables persistence)
//! - `SUPABASE_KEY`: database API key
//! - `SUPABASE_TABLE`: target table (default: transactions)
//! - `GEMINI_API_KEY`: LLM credential (unset fails analysis at call time)
//! - `GEMINI_MODEL`: model name (default: gemini-2.5-flash)
//! - `GEMINI_BASE_URL`: API base (default: Google's v1beta endpoint)
//! - `AI_BACKEND`: gemini (default) or mock
//! - `AUDITLENS_LANGUAGE`: language for reasons and summary (default: Thai)
//! - `AUDITLENS_ON_PERSIST_FAILURE`: continue (default) or abort

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TABLE: &str = "transactions";
pub const DEFAULT_LANGUAGE: &str = "Thai";

/// What the orchestrator does when the persistence step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceFailurePolicy {
    /// Log the failure and go on to analysis
    #[default]
    Continue,
    /// Fail the run with the persistence error
    Abort,
}

impl PersistenceFailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Abort => "abort",
        }
    }
}

impl std::str::FromStr for PersistenceFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "abort" => Ok(Self::Abort),
            _ => Err(format!("Unknown persistence failure policy: {}", s)),
        }
    }
}

impl std::fmt::Display for PersistenceFailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which analysis backend to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Gemini,
    Mock,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "mock" => Ok(Self::Mock),
            _ => Err(format!("Unknown AI backend: {}", s)),
        }
    }
}

/// Hosted database settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Base URL of the hosted database; `None` disables persistence
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub table: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

/// LLM endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub backend: BackendKind,
    /// API credential; `None` makes every analysis call fail
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    /// Language the model writes `reason` and `summary` in
    pub language: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Gemini,
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub on_persistence_failure: PersistenceFailurePolicy,
    pub database: DatabaseConfig,
    pub analysis: AnalysisConfig,
}

impl Config {
    /// Load configuration: defaults, then `path` (or the default config file
    /// if it exists), then environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(p) => {
                    debug!(path = %p.display(), "Using default config file");
                    Self::from_file(&p)?
                }
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidData(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Overlay values from an environment lookup; blank values count as unset
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("SUPABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(key) = get("SUPABASE_KEY") {
            self.database.api_key = Some(key);
        }
        if let Some(table) = get("SUPABASE_TABLE") {
            self.database.table = table;
        }
        if let Some(key) = get("GEMINI_API_KEY") {
            self.analysis.api_key = Some(key);
        }
        if let Some(model) = get("GEMINI_MODEL") {
            self.analysis.model = model;
        }
        if let Some(base) = get("GEMINI_BASE_URL") {
            self.analysis.base_url = base;
        }
        if let Some(language) = get("AUDITLENS_LANGUAGE") {
            self.analysis.language = language;
        }
        if let Some(backend) = get("AI_BACKEND") {
            match backend.parse() {
                Ok(kind) => self.analysis.backend = kind,
                Err(e) => warn!("{}, keeping {:?}", e, self.analysis.backend),
            }
        }
        if let Some(policy) = get("AUDITLENS_ON_PERSIST_FAILURE") {
            match policy.parse() {
                Ok(p) => self.on_persistence_failure = p,
                Err(e) => warn!("{}, keeping {}", e, self.on_persistence_failure),
            }
        }
    }

    /// Whether a database endpoint is configured
    pub fn persistence_enabled(&self) -> bool {
        self.database.url.is_some()
    }

    /// Render for display with secrets masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.database.api_key = copy.database.api_key.as_deref().map(redact);
        copy.analysis.api_key = copy.analysis.api_key.as_deref().map(redact);
        copy
    }
}

fn redact(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{}…", visible)
}

/// Default config file location (~/.config/auditlens/config.toml)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("auditlens").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.persistence_enabled());
        assert_eq!(config.database.table, "transactions");
        assert_eq!(config.analysis.model, "gemini-2.5-flash");
        assert_eq!(config.analysis.language, "Thai");
        assert_eq!(config.on_persistence_failure, PersistenceFailurePolicy::Continue);
    }

    #[test]
    fn test_apply_env() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("SUPABASE_URL", "https://db.example.co"),
            ("SUPABASE_KEY", "anon"),
            ("GEMINI_API_KEY", "secret"),
            ("AUDITLENS_ON_PERSIST_FAILURE", "abort"),
            ("AI_BACKEND", "mock"),
        ]));
        assert!(config.persistence_enabled());
        assert_eq!(config.database.api_key.as_deref(), Some("anon"));
        assert_eq!(config.analysis.api_key.as_deref(), Some("secret"));
        assert_eq!(config.on_persistence_failure, PersistenceFailurePolicy::Abort);
        assert_eq!(config.analysis.backend, BackendKind::Mock);
    }

    #[test]
    fn test_blank_env_counts_as_unset() {
        let mut config = Config::default();
        config.apply_env(env(&[("SUPABASE_URL", "  "), ("GEMINI_API_KEY", "")]));
        assert!(!config.persistence_enabled());
        assert!(config.analysis.api_key.is_none());
    }

    #[test]
    fn test_invalid_policy_keeps_previous() {
        let mut config = Config::default();
        config.apply_env(env(&[("AUDITLENS_ON_PERSIST_FAILURE", "sometimes")]));
        assert_eq!(config.on_persistence_failure, PersistenceFailurePolicy::Continue);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
on_persistence_failure = "abort"

[database]
url = "https://db.example.co"

[analysis]
model = "gemini-2.0-flash"
language = "English"
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.database.url.as_deref(), Some("https://db.example.co"));
        assert_eq!(config.database.table, "transactions");
        assert_eq!(config.analysis.model, "gemini-2.0-flash");
        assert_eq!(config.analysis.language, "English");
        assert_eq!(config.on_persistence_failure, PersistenceFailurePolicy::Abort);
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file(Path::new("/nonexistent/auditlens.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_redacted() {
        let mut config = Config::default();
        config.analysis.api_key = Some("AIzaSyExample".into());
        let shown = config.redacted();
        assert_eq!(shown.analysis.api_key.as_deref(), Some("AIza…"));
        assert!(shown.database.api_key.is_none());
    }
}
