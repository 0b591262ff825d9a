//! Mock backend for testing
//!
//! Without configuration it runs a small z-score pass over the sample so demos
//! work offline. Tests can pin a canned result or a failure instead.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{AnalysisResult, AnomalyRecord, Row, Severity};

use super::{analysis_sample, AnalysisBackend, MAX_ANOMALIES};

/// Minimum |z| for the built-in detector to flag a row
const Z_THRESHOLD: f64 = 2.0;

#[derive(Clone, Debug)]
enum MockResponse {
    ZScore,
    Fixed(AnalysisResult),
    Fail(String),
    Empty,
}

/// Mock AI backend for testing
#[derive(Clone, Debug)]
pub struct MockBackend {
    response: MockResponse,
    /// Whether health_check should return true
    pub healthy: bool,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Built-in z-score detector, healthy
    pub fn new() -> Self {
        Self {
            response: MockResponse::ZScore,
            healthy: true,
        }
    }

    /// Always return `result`
    pub fn with_result(result: AnalysisResult) -> Self {
        Self {
            response: MockResponse::Fixed(result),
            healthy: true,
        }
    }

    /// Always fail with an analysis error carrying `message`
    pub fn failing(message: &str) -> Self {
        Self {
            response: MockResponse::Fail(message.to_string()),
            healthy: false,
        }
    }

    /// Always behave like an endpoint that returned no text
    pub fn empty() -> Self {
        Self {
            response: MockResponse::Empty,
            healthy: true,
        }
    }

    /// Create a new instance with a different model (no-op for mock)
    pub fn with_model(&self, _model: &str) -> Self {
        self.clone()
    }
}

#[async_trait]
impl AnalysisBackend for MockBackend {
    async fn detect_anomalies(&self, rows: &[Row]) -> Result<AnalysisResult> {
        match &self.response {
            MockResponse::Fixed(result) => Ok(result.clone()),
            MockResponse::Fail(message) => Err(Error::Analysis(message.clone())),
            MockResponse::Empty => Err(Error::EmptyResponse),
            MockResponse::ZScore => Ok(zscore_analysis(analysis_sample(rows))),
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

/// Flag rows whose amount sits at least [`Z_THRESHOLD`] deviations from the mean
fn zscore_analysis(sample: &[Row]) -> AnalysisResult {
    let n = sample.len() as f64;
    let mean = if sample.is_empty() {
        0.0
    } else {
        sample.iter().map(|r| r.amount).sum::<f64>() / n
    };
    let std_dev = if sample.is_empty() {
        0.0
    } else {
        (sample.iter().map(|r| (r.amount - mean).powi(2)).sum::<f64>() / n).sqrt()
    };

    let mut scored: Vec<(usize, f64)> = if std_dev > 0.0 {
        sample
            .iter()
            .enumerate()
            .map(|(i, r)| (i, (r.amount - mean) / std_dev))
            .filter(|(_, z)| z.abs() >= Z_THRESHOLD)
            .collect()
    } else {
        Vec::new()
    };
    scored.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
    scored.truncate(MAX_ANOMALIES);

    let anomalies: Vec<AnomalyRecord> = scored
        .into_iter()
        .map(|(i, z)| {
            let row = &sample[i];
            let severity = if z.abs() >= 3.0 {
                Severity::High
            } else if z.abs() >= 2.5 {
                Severity::Medium
            } else {
                Severity::Low
            };
            AnomalyRecord {
                id: i as i64,
                act_code: row.act_code.clone(),
                monthly: row.monthly.clone(),
                amount: row.amount,
                reason: format!(
                    "Amount is {:.1} standard deviations from the mean ({:.2})",
                    z, mean
                ),
                severity,
            }
        })
        .collect();

    AnalysisResult {
        summary: format!(
            "Mock analysis of {} rows: {} anomalies flagged.",
            sample.len(),
            anomalies.len()
        ),
        anomalies,
    }
}
