//! Domain models for AuditLens

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Columns every uploaded file must carry, in canonical order
pub const REQUIRED_COLUMNS: [&str; 4] = ["BA", "monthly", "actCode", "amount"];

/// A CSV cell value, typed opportunistically at ingest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Type a raw cell: empty → null, true/false → bool, numeric → number, else text
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Null;
        }
        match trimmed {
            "true" | "TRUE" | "True" => return Self::Bool(true),
            "false" | "FALSE" | "False" => return Self::Bool(false),
            _ => {}
        }
        match parse_number(trimmed) {
            Some(n) => Self::Number(n),
            None => Self::Text(raw.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Parse a plain decimal literal (no `inf`, `NaN`, or thousands separators)
pub(crate) fn parse_number(s: &str) -> Option<f64> {
    let looks_numeric = s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        && s.chars().any(|c| c.is_ascii_digit());
    if !looks_numeric {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// One uploaded transaction
///
/// Position in the uploaded sequence is the row's only identifier. Columns
/// beyond the required four are kept in `extra` and travel with the row into
/// the analysis payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Business area code
    #[serde(rename = "BA")]
    pub ba: String,
    /// Period in YYYYMM form
    pub monthly: String,
    /// Account code
    #[serde(rename = "actCode")]
    pub act_code: String,
    pub amount: f64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, CellValue>,
}

impl Row {
    pub fn new(ba: &str, monthly: &str, act_code: &str, amount: f64) -> Self {
        Self {
            ba: ba.to_string(),
            monthly: monthly.to_string(),
            act_code: act_code.to_string(),
            amount,
            extra: BTreeMap::new(),
        }
    }
}

/// Row shape in the hosted `transactions` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRecord {
    pub ba: String,
    pub monthly: String,
    pub act_code: String,
    pub amount: f64,
}

impl From<&Row> for StorageRecord {
    fn from(row: &Row) -> Self {
        Self {
            ba: row.ba.clone(),
            monthly: row.monthly.clone(),
            act_code: row.act_code.clone(),
            amount: row.amount,
        }
    }
}

/// Anomaly severity as assigned by the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    pub fn all() -> &'static [Severity] {
        &[Self::High, Self::Medium, Self::Low]
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A model-flagged row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    /// 0-based index into the submitted sample
    pub id: i64,
    #[serde(rename = "actCode")]
    pub act_code: String,
    pub monthly: String,
    pub amount: f64,
    /// Natural-language justification
    pub reason: String,
    pub severity: Severity,
}

/// Parsed model output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub anomalies: Vec<AnomalyRecord>,
}

/// Orchestrator phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Saving,
    Analyzing,
    Success,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Saving => "saving",
            Self::Analyzing => "analyzing",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Whether a pipeline run is in flight
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Saving | Self::Analyzing)
    }

    /// Headline shown while the phase is active
    pub fn status_text(&self) -> &'static str {
        match self {
            Self::Saving => "Saving transactions to the database...",
            Self::Analyzing => "Analyzing data with AI...",
            _ => "",
        }
    }

    /// Secondary line shown under the headline
    pub fn status_detail(&self) -> &'static str {
        match self {
            Self::Saving => "Securely storing transaction records...",
            Self::Analyzing => "Detecting outliers and generating explanations.",
            _ => "",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_value_parse() {
        assert_eq!(CellValue::parse(""), CellValue::Null);
        assert_eq!(CellValue::parse("  "), CellValue::Null);
        assert_eq!(CellValue::parse("TRUE"), CellValue::Bool(true));
        assert_eq!(CellValue::parse("12.5"), CellValue::Number(12.5));
        assert_eq!(CellValue::parse("-3e2"), CellValue::Number(-300.0));
        assert_eq!(CellValue::parse("NaN"), CellValue::Text("NaN".into()));
        assert_eq!(CellValue::parse("inf"), CellValue::Text("inf".into()));
        assert_eq!(CellValue::parse("1,000"), CellValue::Text("1,000".into()));
        assert_eq!(CellValue::parse("North"), CellValue::Text("North".into()));
    }

    #[test]
    fn test_row_serializes_with_source_column_names() {
        let mut row = Row::new("01", "202401", "X1", 100.0);
        row.extra.insert("note".into(), CellValue::Text("ok".into()));
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["BA"], "01");
        assert_eq!(json["actCode"], "X1");
        assert_eq!(json["amount"], 100.0);
        assert_eq!(json["note"], "ok");
    }

    #[test]
    fn test_storage_record_renames_fields() {
        let row = Row::new("01", "202401", "X1", 100.0);
        let json = serde_json::to_value(StorageRecord::from(&row)).unwrap();
        assert_eq!(json["ba"], "01");
        assert_eq!(json["act_code"], "X1");
        assert!(json.get("actCode").is_none());
    }

    #[test]
    fn test_severity_roundtrip() {
        for s in Severity::all() {
            assert_eq!(s.as_str().parse::<Severity>().unwrap(), *s);
        }
        assert!("critical".parse::<Severity>().is_err());
    }

    #[test]
    fn test_anomaly_record_rejects_unknown_severity() {
        let json = r#"{"id":1,"actCode":"X1","monthly":"202401","amount":5,"reason":"r","severity":"Critical"}"#;
        assert!(serde_json::from_str::<AnomalyRecord>(json).is_err());
    }

    #[test]
    fn test_phase_busy() {
        assert!(Phase::Saving.is_busy());
        assert!(Phase::Analyzing.is_busy());
        assert!(!Phase::Idle.is_busy());
        assert!(!Phase::Failed.is_busy());
        assert_eq!(Phase::default(), Phase::Idle);
    }
}
