//! Dashboard view model
//!
//! Reconciles model-returned anomaly ids against uploaded rows by position.
//! Ids are trusted as indices into the uploaded sequence; they are neither
//! clamped nor validated, and ids that do not land on a displayed row are
//! reported in `Dashboard::unmatched_ids` instead.

use std::collections::HashSet;

use serde::Serialize;
use tracing::warn;

use crate::models::{AnalysisResult, AnomalyRecord, Row, Severity};

/// Rows plotted on the scatter chart
pub const MAX_DISPLAY_ROWS: usize = 2000;

/// One scatter point (x = period, y = amount)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    /// Position in the uploaded sequence
    pub index: usize,
    pub monthly: String,
    pub amount: f64,
    #[serde(rename = "actCode")]
    pub act_code: String,
    #[serde(rename = "isAnomaly")]
    pub is_anomaly: bool,
}

/// Points split into the two plotted series
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScatterView {
    pub normal: Vec<ChartPoint>,
    pub anomalies: Vec<ChartPoint>,
}

impl ScatterView {
    pub fn len(&self) -> usize {
        self.normal.len() + self.anomalies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indices of highlighted points
    pub fn anomaly_indices(&self) -> Vec<usize> {
        self.anomalies.iter().map(|p| p.index).collect()
    }
}

/// Badge color for a severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeColor {
    Red,
    Yellow,
    Blue,
}

impl From<Severity> for BadgeColor {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::High => Self::Red,
            Severity::Medium => Self::Yellow,
            Severity::Low => Self::Blue,
        }
    }
}

/// One line of the ranked anomaly table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    /// 1-based, in model order
    pub rank: usize,
    pub id: i64,
    #[serde(rename = "actCode")]
    pub act_code: String,
    pub monthly: String,
    pub amount: f64,
    /// Amount formatted with thousands separators
    pub amount_display: String,
    pub severity: Severity,
    pub badge: BadgeColor,
    pub reason: String,
}

/// Everything the success view renders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub summary: String,
    pub scatter: ScatterView,
    pub table: Vec<TableRow>,
    /// Returned ids that matched no displayed row
    pub unmatched_ids: Vec<i64>,
    pub total_rows: usize,
}

/// Set of anomalous positions, for O(1) membership tests
pub fn anomaly_index_set(anomalies: &[AnomalyRecord]) -> HashSet<i64> {
    anomalies.iter().map(|a| a.id).collect()
}

/// Map the first [`MAX_DISPLAY_ROWS`] rows to points and split them
pub fn build_scatter(rows: &[Row], anomalies: &[AnomalyRecord]) -> ScatterView {
    let flagged = anomaly_index_set(anomalies);
    let mut view = ScatterView::default();

    for (index, row) in rows.iter().take(MAX_DISPLAY_ROWS).enumerate() {
        let point = ChartPoint {
            index,
            monthly: row.monthly.clone(),
            amount: row.amount,
            act_code: row.act_code.clone(),
            is_anomaly: flagged.contains(&(index as i64)),
        };
        if point.is_anomaly {
            view.anomalies.push(point);
        } else {
            view.normal.push(point);
        }
    }
    view
}

/// Rank anomalies in the order the model returned them
pub fn build_table(anomalies: &[AnomalyRecord]) -> Vec<TableRow> {
    anomalies
        .iter()
        .enumerate()
        .map(|(i, a)| TableRow {
            rank: i + 1,
            id: a.id,
            act_code: a.act_code.clone(),
            monthly: a.monthly.clone(),
            amount: a.amount,
            amount_display: format_amount(a.amount),
            severity: a.severity,
            badge: a.severity.into(),
            reason: a.reason.clone(),
        })
        .collect()
}

/// Build the full success view
pub fn build_dashboard(rows: &[Row], result: &AnalysisResult) -> Dashboard {
    let scatter = build_scatter(rows, &result.anomalies);
    let displayed = scatter.len() as i64;

    let mut unmatched_ids: Vec<i64> = result
        .anomalies
        .iter()
        .map(|a| a.id)
        .filter(|id| *id < 0 || *id >= displayed)
        .collect();
    unmatched_ids.sort_unstable();
    unmatched_ids.dedup();
    if !unmatched_ids.is_empty() {
        warn!(
            ids = ?unmatched_ids,
            displayed,
            "Anomaly ids outside the displayed rows"
        );
    }

    Dashboard {
        summary: result.summary.clone(),
        scatter,
        table: build_table(&result.anomalies),
        unmatched_ids,
        total_rows: rows.len(),
    }
}

/// Format with thousands separators, dropping a zero fraction
pub fn format_amount(amount: f64) -> String {
    let negative = amount < 0.0;
    let abs = amount.abs();
    let rounded = (abs * 100.0).round() / 100.0;
    let whole = rounded.trunc() as u64;
    let frac = ((rounded - rounded.trunc()) * 100.0).round() as u64;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let mut out = String::new();
    if negative && (whole > 0 || frac > 0) {
        out.push('-');
    }
    out.push_str(&grouped);
    if frac > 0 {
        let frac_str = format!("{:02}", frac);
        out.push('.');
        out.push_str(frac_str.trim_end_matches('0'));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anomaly(id: i64, severity: Severity) -> AnomalyRecord {
        AnomalyRecord {
            id,
            act_code: "X1".into(),
            monthly: "202401".into(),
            amount: 100000.0,
            reason: "สูงผิดปกติ".into(),
            severity,
        }
    }

    fn rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| Row::new("01", "202401", "X1", i as f64))
            .collect()
    }

    #[test]
    fn test_round_trip_scenario() {
        let rows = vec![
            Row::new("01", "202401", "X1", 100.0),
            Row::new("01", "202401", "X1", 100000.0),
        ];
        let result = AnalysisResult {
            summary: "...".into(),
            anomalies: vec![anomaly(1, Severity::High)],
        };
        let dashboard = build_dashboard(&rows, &result);

        assert_eq!(dashboard.scatter.anomaly_indices(), vec![1]);
        assert_eq!(dashboard.scatter.normal.len(), 1);
        assert_eq!(dashboard.scatter.normal[0].index, 0);
        assert_eq!(dashboard.table.len(), 1);
        assert_eq!(dashboard.table[0].severity.as_str(), "High");
        assert_eq!(dashboard.table[0].badge, BadgeColor::Red);
        assert!(dashboard.unmatched_ids.is_empty());
    }

    #[test]
    fn test_anomalies_never_in_normal_group() {
        let rows = rows(50);
        let ids = [0, 7, 13, 49];
        let anomalies: Vec<_> = ids.iter().map(|&i| anomaly(i, Severity::Low)).collect();
        let view = build_scatter(&rows, &anomalies);

        assert_eq!(view.anomaly_indices(), vec![0, 7, 13, 49]);
        for point in &view.normal {
            assert!(!ids.contains(&(point.index as i64)));
        }
        assert_eq!(view.len(), 50);
    }

    #[test]
    fn test_display_cap() {
        let rows = rows(2500);
        let view = build_scatter(&rows, &[anomaly(2100, Severity::High)]);
        assert_eq!(view.len(), MAX_DISPLAY_ROWS);
        assert!(view.anomalies.is_empty());
    }

    #[test]
    fn test_out_of_range_ids_do_not_break_rendering() {
        let rows = rows(3);
        let result = AnalysisResult {
            summary: "s".into(),
            anomalies: vec![
                anomaly(2, Severity::Medium),
                anomaly(99, Severity::High),
                anomaly(-1, Severity::Low),
                anomaly(99, Severity::Low),
            ],
        };
        let dashboard = build_dashboard(&rows, &result);
        assert_eq!(dashboard.scatter.anomaly_indices(), vec![2]);
        assert_eq!(dashboard.unmatched_ids, vec![-1, 99]);
        // Table still lists everything the model returned
        assert_eq!(dashboard.table.len(), 4);
    }

    #[test]
    fn test_table_ranks_in_model_order() {
        let table = build_table(&[anomaly(5, Severity::Low), anomaly(2, Severity::Medium)]);
        assert_eq!(table[0].rank, 1);
        assert_eq!(table[0].id, 5);
        assert_eq!(table[1].badge, BadgeColor::Yellow);
        assert_eq!(table[1].amount_display, "100,000");
    }

    #[test]
    fn test_empty_result() {
        let result = AnalysisResult {
            summary: "clean".into(),
            anomalies: vec![],
        };
        let dashboard = build_dashboard(&rows(4), &result);
        assert!(dashboard.table.is_empty());
        assert!(dashboard.scatter.anomalies.is_empty());
        assert_eq!(dashboard.total_rows, 4);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0.0), "0");
        assert_eq!(format_amount(999.0), "999");
        assert_eq!(format_amount(1000.0), "1,000");
        assert_eq!(format_amount(1234567.5), "1,234,567.5");
        assert_eq!(format_amount(-2500.25), "-2,500.25");
        assert_eq!(format_amount(0.004), "0");
    }
}
