//! Merging of per-segment result tables.

use std::collections::HashSet;

use crate::curves::table::{ResultTable, PHASE};

/// Combine per-segment tables into one curve.
///
/// Rows are concatenated in input order, a row whose independent value
/// repeats an earlier one is dropped (segments share their boundary points),
/// and the result is sorted ascending. Dependent columns are aligned by name;
/// values a table does not provide are NaN.
pub fn merge_tables(tables: &[ResultTable]) -> ResultTable {
    let Some(first) = tables.first() else {
        return ResultTable::empty(PHASE);
    };

    let mut columns: Vec<String> = Vec::new();
    for table in tables {
        for name in table.columns() {
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }
    }

    let mut merged = ResultTable::new(first.indep(), columns.iter().map(String::as_str));
    let mut seen: HashSet<u64> = HashSet::new();
    for table in tables {
        let mapping: Vec<Option<usize>> = columns.iter().map(|c| table.column_index(c)).collect();
        for row in table.rows() {
            if !seen.insert(canonical_bits(row.x)) {
                continue;
            }
            let values = mapping
                .iter()
                .map(|idx| idx.map_or(f64::NAN, |i| row.values[i]))
                .collect();
            merged.push(row.x, values);
        }
    }
    merged.sort_by_indep();
    merged
}

/// Bit pattern used for duplicate detection; `-0.0` and `0.0` collide.
fn canonical_bits(x: f64) -> u64 {
    if x == 0.0 { 0.0f64.to_bits() } else { x.to_bits() }
}
