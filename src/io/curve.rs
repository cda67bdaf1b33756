//! Read/write curve JSON files.
//!
//! A curve file is a snapshot of one generated curve: kind, state, the
//! segment partition used and the merged table, stamped with the time it
//! was written.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::curves::{CurveKind, GenerationController, ResultTable};
use crate::error::AppError;
use crate::segments::SegmentTable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub kind: CurveKind,
    pub state: String,
    pub table_revision: u64,
    pub segments: SegmentTable,
    pub table: ResultTable,
}

impl CurveFile {
    pub fn snapshot(controller: &GenerationController) -> Self {
        Self {
            tool: "wdc".to_string(),
            generated_at: Utc::now(),
            kind: controller.kind(),
            state: controller.state().to_string(),
            table_revision: controller.table_revision(),
            segments: controller.segments(),
            table: controller.table().as_ref().clone(),
        }
    }
}

/// Write a curve JSON file.
pub fn write_curve_json(path: &Path, curve: &CurveFile) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::new(2, format!("Failed to create curve JSON '{}': {e}", path.display()))
    })?;
    serde_json::to_writer_pretty(file, curve)
        .map_err(|e| AppError::new(2, format!("Failed to write curve JSON: {e}")))?;
    Ok(())
}

/// Read a curve JSON file.
pub fn read_curve_json(path: &Path) -> Result<CurveFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open curve JSON '{}': {e}", path.display())))?;
    let curve: CurveFile = serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid curve JSON: {e}")))?;
    Ok(curve)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curves::PHASE;

    #[test]
    fn curve_file_survives_json() {
        let mut table = ResultTable::new(PHASE, ["mag"]);
        table.push(0.0, vec![0.3]);
        table.push(0.5, vec![0.1]);
        let file = CurveFile {
            tool: "wdc".into(),
            generated_at: Utc::now(),
            kind: CurveKind::Light,
            state: "ready".into(),
            table_revision: 3,
            segments: SegmentTable::uniform(2, Default::default()).unwrap(),
            table,
        };

        let dir = std::env::temp_dir().join(format!("wdc-curve-{}.json", std::process::id()));
        write_curve_json(&dir, &file).unwrap();
        let back = read_curve_json(&dir).unwrap();
        let _ = std::fs::remove_file(&dir);

        assert_eq!(back.kind, CurveKind::Light);
        assert_eq!(back.table, file.table);
        assert_eq!(back.segments.boundaries(), file.segments.boundaries());
        assert_eq!(back.generated_at, file.generated_at);
    }

    #[test]
    fn missing_cells_are_written_as_null() {
        let mut table = ResultTable::new(PHASE, ["V1", "V2"]);
        table.push(0.25, vec![-40.0]);
        let json = serde_json::to_string(&table).unwrap();
        assert!(json.contains("null"));

        let back: ResultTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value(0, "V1"), Some(-40.0));
        assert!(back.value(0, "V2").unwrap().is_nan());
    }
}
