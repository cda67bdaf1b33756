//! Export result tables to CSV.

use std::path::Path;

use crate::curves::ResultTable;
use crate::error::AppError;

/// Write `table` as CSV: the independent column first, then every
/// dependent column. NaN cells are left empty.
pub fn write_table_csv(path: &Path, table: &ResultTable) -> Result<(), AppError> {
    let writer = csv::Writer::from_path(path).map_err(|e| {
        AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display()))
    })?;
    write_table(writer, table)
}

pub fn write_table<W: std::io::Write>(
    mut writer: csv::Writer<W>,
    table: &ResultTable,
) -> Result<(), AppError> {
    let mut header = vec![table.indep().to_string()];
    header.extend(table.columns().iter().cloned());
    writer
        .write_record(&header)
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV header: {e}")))?;

    for row in table.rows() {
        let record: Vec<String> = std::iter::once(row.x)
            .chain(row.values.iter().copied())
            .map(|v| if v.is_nan() { String::new() } else { format!("{v:.10}") })
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))?;
    Ok(())
}
