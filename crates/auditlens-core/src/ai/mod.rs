//! Pluggable anomaly analysis backends
//!
//! # Architecture
//!
//! - `AnalysisBackend` trait: the interface every backend implements
//! - `AnalysisClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `GeminiBackend`, `MockBackend`
//!
//! Every backend sees at most [`MAX_ANALYSIS_ROWS`] rows; the rest are
//! dropped silently. Returned ids index into that sample.

mod gemini;
mod mock;
pub mod parsing;

pub use gemini::{anomaly_schema, GeminiBackend, TEMPERATURE};
pub use mock::MockBackend;

use async_trait::async_trait;

use crate::config::{AnalysisConfig, BackendKind};
use crate::error::Result;
use crate::models::{AnalysisResult, Row};

/// Rows submitted for analysis
pub const MAX_ANALYSIS_ROWS: usize = 1500;

/// Findings the model is asked to cap itself at (not enforced locally)
pub const MAX_ANOMALIES: usize = 10;

/// The prefix of `rows` a backend actually analyzes
pub fn analysis_sample(rows: &[Row]) -> &[Row] {
    &rows[..rows.len().min(MAX_ANALYSIS_ROWS)]
}

/// Trait defining the interface for all analysis backends
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Flag anomalous rows and summarize the data set
    async fn detect_anomalies(&self, rows: &[Row]) -> Result<AnalysisResult>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete analysis client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AnalysisClient {
    Gemini(GeminiBackend),
    Mock(MockBackend),
}

impl AnalysisClient {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        match config.backend {
            BackendKind::Gemini => AnalysisClient::Gemini(GeminiBackend::from_config(config)),
            BackendKind::Mock => AnalysisClient::Mock(MockBackend::new()),
        }
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AnalysisClient::Mock(MockBackend::new())
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            AnalysisClient::Gemini(b) => AnalysisClient::Gemini(b.with_model(model)),
            AnalysisClient::Mock(b) => AnalysisClient::Mock(b.with_model(model)),
        }
    }
}

impl From<MockBackend> for AnalysisClient {
    fn from(backend: MockBackend) -> Self {
        AnalysisClient::Mock(backend)
    }
}

impl From<GeminiBackend> for AnalysisClient {
    fn from(backend: GeminiBackend) -> Self {
        AnalysisClient::Gemini(backend)
    }
}

#[async_trait]
impl AnalysisBackend for AnalysisClient {
    async fn detect_anomalies(&self, rows: &[Row]) -> Result<AnalysisResult> {
        match self {
            AnalysisClient::Gemini(b) => b.detect_anomalies(rows).await,
            AnalysisClient::Mock(b) => b.detect_anomalies(rows).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AnalysisClient::Gemini(b) => b.health_check().await,
            AnalysisClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AnalysisClient::Gemini(b) => b.model(),
            AnalysisClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AnalysisClient::Gemini(b) => b.host(),
            AnalysisClient::Mock(b) => b.host(),
        }
    }
}
