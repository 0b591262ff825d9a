//! Error types for AuditLens

use thiserror::Error;

use crate::models::Phase;

#[derive(Error, Debug)]
pub enum Error {
    #[error("The CSV file is empty.")]
    EmptyDataset,

    #[error("Missing required columns: {}", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    #[error("CSV Parsing Error: {0}")]
    Tokenize(String),

    #[error("Database Error: {0}")]
    Persistence(String),

    #[error("{0}")]
    Configuration(String),

    #[error("Empty response from Gemini.")]
    EmptyResponse,

    #[error("{0}")]
    Analysis(String),

    #[error("Pipeline is {0}; wait for it to finish or reset before uploading again")]
    PipelineBusy(Phase),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Prompt frontmatter error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Where an error belongs in the user-facing taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Recovered locally: shown inline, pipeline stays idle
    Ingestion,
    /// Best-effort storage failures
    Persistence,
    /// Fatal to the current run
    Analysis,
    Internal,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EmptyDataset | Self::MissingColumns { .. } | Self::Tokenize(_) => {
                ErrorCategory::Ingestion
            }
            Self::Persistence(_) => ErrorCategory::Persistence,
            Self::Configuration(_) | Self::EmptyResponse | Self::Analysis(_) => {
                ErrorCategory::Analysis
            }
            _ => ErrorCategory::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message() {
        let err = Error::MissingColumns {
            missing: vec!["monthly".into(), "amount".into()],
        };
        assert_eq!(err.to_string(), "Missing required columns: monthly, amount");
        assert_eq!(err.category(), ErrorCategory::Ingestion);
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::Persistence("boom".into()).category(),
            ErrorCategory::Persistence
        );
        assert_eq!(Error::EmptyResponse.category(), ErrorCategory::Analysis);
        assert_eq!(
            Error::PipelineBusy(Phase::Saving).category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_persistence_message_prefix() {
        let err = Error::Persistence("duplicate key".into());
        assert_eq!(err.to_string(), "Database Error: duplicate key");
    }
}
