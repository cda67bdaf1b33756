//! Formatted terminal output.
//!
//! Formatting lives here so the engine stays free of presentation details.

use std::time::Duration;

use crate::curves::{GenerationController, ResultTable};
use crate::params::PHIN;
use crate::segments::SegmentTable;

/// Observed minus synthesized values of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualStats {
    pub column: String,
    pub n: usize,
    pub mean: f64,
    pub rms: f64,
}

/// Residual statistics of `column`, pairing rows by position.
///
/// Rows where either side is NaN are skipped. `None` when the column is
/// missing on either side or no row pairs up.
pub fn compute_residuals(
    observed: &ResultTable,
    synthetic: &ResultTable,
    column: &str,
) -> Option<ResidualStats> {
    let obs = observed.column(column)?;
    let syn = synthetic.column(column)?;
    let diffs: Vec<f64> = obs
        .iter()
        .zip(&syn)
        .map(|(o, s)| o - s)
        .filter(|d| d.is_finite())
        .collect();
    if diffs.is_empty() {
        return None;
    }
    let n = diffs.len() as f64;
    Some(ResidualStats {
        column: column.to_string(),
        n: diffs.len(),
        mean: diffs.iter().sum::<f64>() / n,
        rms: (diffs.iter().map(|d| d * d).sum::<f64>() / n).sqrt(),
    })
}

/// Header block describing a finished (or abandoned) generation.
pub fn format_run_summary(controller: &GenerationController, elapsed: Duration) -> String {
    let table = controller.table();
    let segments = controller.segments();
    let mut out = String::new();

    out.push_str("=== wdc - segmented curve synthesis ===\n");
    out.push_str(&format!("Curve: {}\n", controller.kind()));
    out.push_str(&format!("State: {}\n", controller.state()));
    out.push_str(&format!(
        "Segments: {} (revision {})\n",
        segments.count(),
        segments.revision()
    ));
    out.push_str(&format!(
        "Rows: {} (table revision {})\n",
        table.len(),
        controller.table_revision()
    ));
    let xs = table.xs();
    if let (Some(first), Some(last)) = (xs.first(), xs.last()) {
        out.push_str(&format!("Phase range: {first:.4} .. {last:.4}\n"));
    }
    out.push_str(&format!(
        "Normalization coefficient: {:.6}\n",
        controller.normalization_coefficient()
    ));
    out.push_str(&format!("Elapsed: {:.3}s\n", elapsed.as_secs_f64()));
    out
}

/// One line per segment: index, range and phase step.
pub fn format_segments(segments: &SegmentTable) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:>3}  {:>10}  {:>10}  {:>8}\n", "#", "from", "to", "PHIN"));
    for (i, segment) in segments.segments().iter().enumerate() {
        let step = segment
            .data
            .get(PHIN)
            .map(|v| format!("{:.5}", v.as_f64()))
            .unwrap_or_else(|| "-".to_string());
        let marker = if segment.is_empty() { " (empty)" } else { "" };
        out.push_str(&format!(
            "{i:>3}  {:>10.6}  {:>10.6}  {step:>8}{marker}\n",
            segment.left, segment.right
        ));
    }
    out
}

/// Up to `rows` rows spread evenly over the table.
pub fn format_table_preview(table: &ResultTable, rows: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:>10}", table.indep()));
    for column in table.columns() {
        out.push_str(&format!("  {column:>12}"));
    }
    out.push('\n');

    if table.is_empty() || rows == 0 {
        out.push_str("(no rows)\n");
        return out;
    }
    let shown = rows.min(table.len());
    for k in 0..shown {
        let idx = if shown == 1 {
            0
        } else {
            k * (table.len() - 1) / (shown - 1)
        };
        let row = &table.rows()[idx];
        out.push_str(&format!("{:>10.5}", row.x));
        for v in &row.values {
            out.push_str(&format!("  {v:>12.6}"));
        }
        out.push('\n');
    }
    out
}

pub fn format_residuals(stats: &[ResidualStats]) -> String {
    let mut out = String::new();
    out.push_str("Residuals (observed - synthetic):\n");
    if stats.is_empty() {
        out.push_str("  (none)\n");
    }
    for s in stats {
        out.push_str(&format!(
            "  {:<6} n={:<5} mean={:+.5} rms={:.5}\n",
            s.column, s.n, s.mean, s.rms
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::curves::PHASE;
    use crate::params::ParamValue;
    use crate::segments::SegmentData;

    #[test]
    fn residuals_skip_nan_rows() {
        let mut obs = ResultTable::new(PHASE, ["mag"]);
        let mut syn = ResultTable::new(PHASE, ["mag"]);
        for (o, s) in [(1.0, 0.5), (2.0, f64::NAN), (3.0, 3.5)] {
            obs.push(0.0, vec![o]);
            syn.push(0.0, vec![s]);
        }
        let stats = compute_residuals(&obs, &syn, "mag").unwrap();
        assert_eq!(stats.n, 2);
        assert_relative_eq!(stats.mean, 0.0);
        assert_relative_eq!(stats.rms, 0.5);
        assert!(compute_residuals(&obs, &syn, "V1").is_none());
    }

    #[test]
    fn segment_listing_marks_empty_segments() {
        let data = SegmentData::from([(PHIN.to_string(), ParamValue::Float(0.01))]);
        let mut segments = SegmentTable::uniform(2, data).unwrap();
        segments.split(1, Some(1.0)).unwrap();
        let text = format_segments(&segments);
        assert_eq!(text.lines().count(), 4);
        assert!(text.lines().last().unwrap().ends_with("(empty)"));
        assert!(text.contains("0.01000"));
    }

    #[test]
    fn preview_includes_first_and_last_rows() {
        let mut table = ResultTable::new(PHASE, ["mag"]);
        for i in 0..=10 {
            table.push(i as f64 / 10.0, vec![i as f64]);
        }
        let text = format_table_preview(&table, 3);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].trim_start().starts_with("0.00000"));
        assert!(lines[3].trim_start().starts_with("1.00000"));
    }
}
