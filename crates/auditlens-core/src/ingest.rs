//! CSV ingestion for uploaded transaction files
//!
//! Files carry a header row with at least `BA`, `monthly`, `actCode` and
//! `amount` (exact, case-sensitive). Extra columns are typed and retained.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{parse_number, CellValue, Row, REQUIRED_COLUMNS};

/// Successfully ingested file
#[derive(Debug, Clone)]
pub struct Ingested {
    /// Header names as they appeared in the file
    pub headers: Vec<String>,
    /// Data rows in upload order
    pub rows: Vec<Row>,
}

/// Parse an uploaded CSV into rows
///
/// Checks run in a fixed order: tokenizer errors first, then an empty data
/// set, then missing required columns.
pub fn parse_transactions<R: Read>(reader: R) -> Result<Ingested> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| Error::Tokenize(e.to_string()))?
        .clone();

    // Only literally empty lines are skipped; a line of empty fields is a record
    let records = rdr
        .records()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tokenize(e.to_string()))?;

    if records.is_empty() {
        return Err(Error::EmptyDataset);
    }

    let header_names: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let missing = missing_columns(&header_names);
    if !missing.is_empty() {
        return Err(Error::MissingColumns { missing });
    }

    let columns = ColumnIndex::new(&headers);
    let mut rows = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        // Row numbers in messages are 1-based and exclude the header
        rows.push(columns.to_row(&headers, record, i + 1)?);
    }

    debug!(rows = rows.len(), columns = header_names.len(), "Parsed transaction CSV");
    Ok(Ingested {
        headers: header_names,
        rows,
    })
}

/// Open and parse a CSV file from disk
pub fn parse_transactions_file(path: &Path) -> Result<Ingested> {
    let file = File::open(path)?;
    parse_transactions(file)
}

/// Required columns absent from `headers`, in canonical order
pub fn missing_columns(headers: &[String]) -> Vec<String> {
    REQUIRED_COLUMNS
        .iter()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .map(|col| col.to_string())
        .collect()
}

/// Positions of the required columns within a header record
struct ColumnIndex {
    ba: usize,
    monthly: usize,
    act_code: usize,
    amount: usize,
}

impl ColumnIndex {
    /// Caller must have verified that every required column is present
    fn new(headers: &StringRecord) -> Self {
        let pos = |name: &str| headers.iter().position(|h| h == name).unwrap_or(0);
        Self {
            ba: pos("BA"),
            monthly: pos("monthly"),
            act_code: pos("actCode"),
            amount: pos("amount"),
        }
    }

    fn is_required(&self, i: usize) -> bool {
        i == self.ba || i == self.monthly || i == self.act_code || i == self.amount
    }

    fn to_row(&self, headers: &StringRecord, record: &StringRecord, line: usize) -> Result<Row> {
        let field = |i: usize| record.get(i).unwrap_or("").to_string();

        let raw_amount = field(self.amount);
        let amount = parse_number(raw_amount.trim()).ok_or_else(|| {
            Error::Tokenize(format!(
                "row {}: amount '{}' is not numeric",
                line, raw_amount
            ))
        })?;

        let mut extra = BTreeMap::new();
        for (i, header) in headers.iter().enumerate() {
            if self.is_required(i) {
                continue;
            }
            extra.insert(header.to_string(), CellValue::parse(&field(i)));
        }

        Ok(Row {
            ba: field(self.ba),
            monthly: field(self.monthly),
            act_code: field(self.act_code),
            amount,
            extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let csv = "BA,monthly,actCode,amount\n01,202401,X1,100\n01,202401,X1,100000\n";
        let ingested = parse_transactions(csv.as_bytes()).unwrap();
        assert_eq!(ingested.rows.len(), 2);
        assert_eq!(ingested.headers, vec!["BA", "monthly", "actCode", "amount"]);
        assert_eq!(ingested.rows[0], Row::new("01", "202401", "X1", 100.0));
        assert_eq!(ingested.rows[1].amount, 100000.0);
    }

    #[test]
    fn test_required_columns_stay_text() {
        let csv = "BA,monthly,actCode,amount\n007,202401,0042,1.5\n";
        let ingested = parse_transactions(csv.as_bytes()).unwrap();
        assert_eq!(ingested.rows[0].ba, "007");
        assert_eq!(ingested.rows[0].act_code, "0042");
    }

    #[test]
    fn test_extra_columns_are_typed_and_kept() {
        let csv = "region,BA,monthly,actCode,amount,flag\nNorth,01,202401,X1,10,true\n";
        let ingested = parse_transactions(csv.as_bytes()).unwrap();
        let row = &ingested.rows[0];
        assert_eq!(row.extra.get("region"), Some(&CellValue::Text("North".into())));
        assert_eq!(row.extra.get("flag"), Some(&CellValue::Bool(true)));
        assert_eq!(row.amount, 10.0);
    }

    #[test]
    fn test_header_only_is_empty() {
        let csv = "BA,monthly,actCode,amount\n";
        let err = parse_transactions(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::EmptyDataset));
        assert_eq!(err.to_string(), "The CSV file is empty.");
    }

    #[test]
    fn test_zero_byte_file_is_empty() {
        let err = parse_transactions("".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::EmptyDataset));
    }

    #[test]
    fn test_blank_lines_skipped() {
        let csv = "BA,monthly,actCode,amount\n\n01,202401,X1,5\n\n";
        let ingested = parse_transactions(csv.as_bytes()).unwrap();
        assert_eq!(ingested.rows.len(), 1);
    }

    #[test]
    fn test_row_of_empty_fields_is_kept_and_rejected() {
        let csv = "BA,monthly,actCode,amount\n01,202401,X1,5\n,,,\n";
        let err = parse_transactions(csv.as_bytes()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "CSV Parsing Error: row 2: amount '' is not numeric"
        );
    }

    #[test]
    fn test_empty_check_precedes_column_check() {
        let csv = "foo,bar\n";
        let err = parse_transactions(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::EmptyDataset));
    }

    #[test]
    fn test_missing_columns_in_required_order() {
        let csv = "amount,BA,note\n5,01,x\n";
        let err = parse_transactions(csv.as_bytes()).unwrap_err();
        match err {
            Error::MissingColumns { missing } => {
                assert_eq!(missing, vec!["monthly", "actCode"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_column_names_are_case_sensitive() {
        let csv = "ba,Monthly,actcode,Amount\n01,202401,X1,5\n";
        let err = parse_transactions(csv.as_bytes()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required columns: BA, monthly, actCode, amount"
        );
    }

    #[test]
    fn test_ragged_row_is_tokenize_error() {
        let csv = "BA,monthly,actCode,amount\n01,202401,X1,5\n01,202401\n";
        let err = parse_transactions(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Tokenize(_)));
        assert!(err.to_string().starts_with("CSV Parsing Error:"));
    }

    #[test]
    fn test_non_numeric_amount_is_tokenize_error() {
        let csv = "BA,monthly,actCode,amount\n01,202401,X1,5\n01,202401,X1,abc\n";
        let err = parse_transactions(csv.as_bytes()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "CSV Parsing Error: row 2: amount 'abc' is not numeric"
        );
    }

    #[test]
    fn test_missing_columns_helper() {
        let headers = vec!["BA".to_string(), "amount".to_string()];
        assert_eq!(missing_columns(&headers), vec!["monthly", "actCode"]);
    }
}
