//! AuditLens Core Library
//!
//! Shared functionality for the AuditLens transaction anomaly dashboard:
//! - CSV ingestion and required-column validation
//! - Batched persistence to a hosted REST database
//! - Pluggable LLM analysis backends (Gemini, offline mock)
//! - Prompt library for customizable analysis prompts
//! - Upload pipeline state machine
//! - Dashboard view model reconciling anomalies with uploaded rows

pub mod ai;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod persist;
pub mod pipeline;
pub mod prompts;
pub mod view;

/// Test utilities including mock Gemini and database servers
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AnalysisBackend, AnalysisClient, GeminiBackend, MockBackend};
pub use config::{BackendKind, Config, PersistenceFailurePolicy};
pub use error::{Error, ErrorCategory, Result};
pub use ingest::{parse_transactions, parse_transactions_file, Ingested};
pub use models::{AnalysisResult, AnomalyRecord, CellValue, Phase, Row, Severity, StorageRecord};
pub use persist::{MemoryStore, PersistReport, PersistenceClient, SupabaseStore};
pub use pipeline::{Orchestrator, Session, SessionStatus};
pub use prompts::{Prompt, PromptId, PromptLibrary};
pub use view::{build_dashboard, Dashboard};
