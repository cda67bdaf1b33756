//! Observation CSV ingest.
//!
//! The first column whose header is `hjd` or `phase` (case-insensitive) is
//! the independent variable; every other numeric column becomes a dependent
//! column. Rows with an unparsable independent value are skipped and
//! reported; unparsable dependent cells become NaN.

use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::curves::{ResultTable, HJD, PHASE};
use crate::error::AppError;

/// A row skipped during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct IngestedObservations {
    pub table: ResultTable,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

pub fn load_observations(path: &Path) -> Result<IngestedObservations, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    read_observations(file)
}

pub fn read_observations(reader: impl std::io::Read) -> Result<IngestedObservations, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let (indep_idx, indep) = find_independent(&headers)?;
    let columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != indep_idx)
        .map(|(i, name)| (i, name.to_ascii_lowercase()))
        .collect();

    let mut table = ResultTable::new(indep, columns.iter().map(|(_, name)| name.as_str()));
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // header is line 1
        let line = idx + 2;
        rows_read += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };
        let Some(x) = parse_cell(&record, indep_idx) else {
            row_errors.push(RowError {
                line,
                message: format!("missing or invalid '{}'", table.indep()),
            });
            continue;
        };
        let values = columns
            .iter()
            .map(|(i, _)| parse_cell(&record, *i).unwrap_or(f64::NAN))
            .collect();
        table.push(x, values);
    }

    Ok(IngestedObservations {
        table,
        row_errors,
        rows_read,
    })
}

fn find_independent(headers: &StringRecord) -> Result<(usize, &'static str), AppError> {
    headers
        .iter()
        .enumerate()
        .find_map(|(i, h)| match h.to_ascii_lowercase().as_str() {
            "hjd" => Some((i, HJD)),
            "phase" | "ph" => Some((i, PHASE)),
            _ => None,
        })
        .ok_or_else(|| AppError::new(2, "CSV needs an 'hjd' or 'phase' column."))
}

fn parse_cell(record: &StringRecord, idx: usize) -> Option<f64> {
    record
        .get(idx)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_hjd_observations() {
        let csv = "HJD,mag,err\n2450000.1,10.5,0.01\nbad,10.6,0.01\n2450000.3, 10.7 ,\n";
        let data = read_observations(csv.as_bytes()).unwrap();
        assert_eq!(data.rows_read, 3);
        assert_eq!(data.table.indep(), HJD);
        assert_eq!(data.table.len(), 2);
        assert_eq!(data.table.value(1, "mag"), Some(10.7));
        assert!(data.table.value(1, "err").unwrap().is_nan());
        assert_eq!(data.row_errors.len(), 1);
        assert_eq!(data.row_errors[0].line, 3);
    }

    #[test]
    fn phase_column_is_accepted() {
        let csv = "rv1,phase\n-20.5,0.25\n";
        let data = read_observations(csv.as_bytes()).unwrap();
        assert_eq!(data.table.indep(), PHASE);
        assert_eq!(data.table.xs(), vec![0.25]);
        assert_eq!(data.table.value(0, "rv1"), Some(-20.5));
    }

    #[test]
    fn missing_independent_column_is_an_error() {
        let err = read_observations("mag\n1.0\n".as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
