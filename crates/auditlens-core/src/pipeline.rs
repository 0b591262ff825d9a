//! Upload pipeline state machine
//!
//! Sequences ingestion, persistence, and analysis for one uploaded file and
//! exposes the current phase to whatever renders it.
//!
//! # Phases
//!
//! ```text
//!   Idle ──upload──▶ Saving ──(ok | failure, continue)──▶ Analyzing ──ok──▶ Success
//!    ▲   ◀─ingest error─┘  └─(failure, abort)─┐              └──err──▶ Failed
//!    │                                        ▼                            │
//!    └──────────────────────── reset ◀─────── Failed / Success ◀───────────┘
//! ```
//!
//! Only one run may be in flight. Neither the database write nor the model
//! call can be cancelled, so reset is refused until the run settles.
//!
//! # Example
//!
//! ```rust,ignore
//! use auditlens_core::pipeline::Orchestrator;
//!
//! let orchestrator = Orchestrator::from_config(&config);
//! orchestrator.upload(file)?;
//! let phase = orchestrator.process().await;
//! if let Some(dashboard) = orchestrator.dashboard() {
//!     println!("{}", dashboard.summary);
//! }
//! ```

use std::io::Read;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::ai::{AnalysisBackend, AnalysisClient};
use crate::config::{Config, PersistenceFailurePolicy};
use crate::error::{Error, Result};
use crate::ingest::parse_transactions;
use crate::models::{AnalysisResult, Phase, Row};
use crate::persist::{PersistReport, PersistenceClient};
use crate::view::{build_dashboard, Dashboard};

/// Callback invoked after every phase change
pub type PhaseObserver = Arc<dyn Fn(Phase) + Send + Sync>;

/// Mutable state for the current upload
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub phase: Phase,
    pub rows: Arc<Vec<Row>>,
    pub result: Option<AnalysisResult>,
    /// Last user-facing error: ingestion problems while idle, the fatal
    /// error after a failed run
    pub error: Option<String>,
    /// Outcome of the last persistence attempt, if one ran
    pub persisted: Option<PersistReport>,
}

/// Serializable snapshot of a session, without the row data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub phase: Phase,
    pub status_text: &'static str,
    pub status_detail: &'static str,
    pub error: Option<String>,
    pub row_count: usize,
    pub anomaly_count: Option<usize>,
    pub saved_records: Option<usize>,
}

impl From<&Session> for SessionStatus {
    fn from(session: &Session) -> Self {
        Self {
            phase: session.phase,
            status_text: session.phase.status_text(),
            status_detail: session.phase.status_detail(),
            error: session.error.clone(),
            row_count: session.rows.len(),
            anomaly_count: session.result.as_ref().map(|r| r.anomalies.len()),
            saved_records: match session.persisted {
                Some(PersistReport::Saved { records, .. }) => Some(records),
                _ => None,
            },
        }
    }
}

/// Drives one upload at a time through save and analysis
#[derive(Clone)]
pub struct Orchestrator {
    persistence: PersistenceClient,
    analysis: AnalysisClient,
    policy: PersistenceFailurePolicy,
    session: Arc<RwLock<Session>>,
    observer: Option<PhaseObserver>,
}

impl Orchestrator {
    pub fn new(persistence: PersistenceClient, analysis: AnalysisClient) -> Self {
        Self {
            persistence,
            analysis,
            policy: PersistenceFailurePolicy::default(),
            session: Arc::new(RwLock::new(Session::default())),
            observer: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            PersistenceClient::from_config(&config.database),
            AnalysisClient::from_config(&config.analysis),
        )
        .with_policy(config.on_persistence_failure)
    }

    /// What to do when the database write fails
    pub fn with_policy(mut self, policy: PersistenceFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(Phase) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn analysis(&self) -> &AnalysisClient {
        &self.analysis
    }

    pub fn persistence(&self) -> &PersistenceClient {
        &self.persistence
    }

    pub fn policy(&self) -> PersistenceFailurePolicy {
        self.policy
    }

    pub fn phase(&self) -> Phase {
        self.read().phase
    }

    /// Snapshot of the current session
    pub fn session(&self) -> Session {
        self.read().clone()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus::from(&*self.read())
    }

    /// The success view, once a run has finished successfully
    pub fn dashboard(&self) -> Option<Dashboard> {
        let session = self.read();
        match (&session.phase, &session.result) {
            (Phase::Success, Some(result)) => Some(build_dashboard(&session.rows, result)),
            _ => None,
        }
    }

    /// Parse an uploaded file and claim the pipeline for it
    ///
    /// Ingestion errors are recorded on the session for inline display and
    /// leave the phase at `Idle`. Returns the number of rows accepted.
    pub fn upload<R: Read>(&self, reader: R) -> Result<usize> {
        let current = self.phase();
        if current != Phase::Idle {
            return Err(Error::PipelineBusy(current));
        }

        let ingested = match parse_transactions(reader) {
            Ok(ingested) => ingested,
            Err(e) => {
                warn!("Rejected upload: {}", e);
                self.write().error = Some(e.to_string());
                return Err(e);
            }
        };

        let count = ingested.rows.len();
        self.start(ingested.rows)?;
        Ok(count)
    }

    /// Claim the pipeline for already-parsed rows (Idle → Saving)
    pub fn start(&self, rows: Vec<Row>) -> Result<()> {
        {
            let mut session = self.write();
            if session.phase != Phase::Idle {
                return Err(Error::PipelineBusy(session.phase));
            }
            info!(rows = rows.len(), "Starting pipeline run");
            *session = Session {
                phase: Phase::Saving,
                rows: Arc::new(rows),
                ..Session::default()
            };
        }
        self.notify(Phase::Saving);
        Ok(())
    }

    /// Run save and analysis for a claimed upload
    ///
    /// Returns the settled phase. Calling this when no run is waiting in
    /// `Saving` is a no-op that returns the current phase.
    pub async fn process(&self) -> Phase {
        let rows = {
            let session = self.read();
            if session.phase != Phase::Saving {
                debug!(phase = %session.phase, "Nothing to process");
                return session.phase;
            }
            Arc::clone(&session.rows)
        };

        match self.persistence.save_transactions(&rows).await {
            Ok(report) => {
                self.write().persisted = Some(report);
            }
            Err(e) => match self.policy {
                PersistenceFailurePolicy::Continue => {
                    error!("DB save failed, continuing with analysis: {}", e);
                }
                PersistenceFailurePolicy::Abort => {
                    error!("DB save failed, aborting run: {}", e);
                    return self.settle(Phase::Failed, None, Some(e.to_string()));
                }
            },
        }

        self.transition(Phase::Analyzing);

        match self.analysis.detect_anomalies(&rows).await {
            Ok(result) => {
                info!(
                    anomalies = result.anomalies.len(),
                    model = self.analysis.model(),
                    "Analysis complete"
                );
                self.settle(Phase::Success, Some(result), None)
            }
            Err(e) => {
                error!("Analysis failed: {}", e);
                self.settle(Phase::Failed, None, Some(e.to_string()))
            }
        }
    }

    /// Claim and process in one call
    pub async fn run(&self, rows: Vec<Row>) -> Result<Phase> {
        self.start(rows)?;
        Ok(self.process().await)
    }

    /// Discard the current upload and return to `Idle`
    pub fn reset(&self) -> Result<()> {
        {
            let mut session = self.write();
            if session.phase.is_busy() {
                return Err(Error::PipelineBusy(session.phase));
            }
            *session = Session::default();
        }
        debug!("Session reset");
        self.notify(Phase::Idle);
        Ok(())
    }

    fn transition(&self, phase: Phase) {
        self.write().phase = phase;
        self.notify(phase);
    }

    fn settle(&self, phase: Phase, result: Option<AnalysisResult>, error: Option<String>) -> Phase {
        {
            let mut session = self.write();
            session.phase = phase;
            session.result = result;
            session.error = error;
        }
        self.notify(phase);
        phase
    }

    fn notify(&self, phase: Phase) {
        if let Some(observer) = &self.observer {
            observer(phase);
        }
    }

    // Lock poisoning only follows a panic inside these short critical
    // sections; the session data is still consistent, so keep serving it.
    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(|e| e.into_inner())
    }
}
