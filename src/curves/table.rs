//! Result tables: rows keyed by an independent column.

use serde::{Deserialize, Serialize};

/// Name of the independent column of synthesized curves.
pub const PHASE: &str = "phase";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub x: f64,
    #[serde(with = "nan_as_null")]
    pub values: Vec<f64>,
}

/// Missing cells (NaN) are `null` in JSON.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let cells: Vec<Option<f64>> = values.iter().map(|v| (!v.is_nan()).then_some(*v)).collect();
        cells.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let cells = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(cells.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

/// Column-named table of `f64` rows.
///
/// `columns` names the dependent values of every row; the independent value
/// is kept separately in [`Row::x`] under the name `indep`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    indep: String,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Default for ResultTable {
    fn default() -> Self {
        Self::empty(PHASE)
    }
}

impl ResultTable {
    pub fn new(
        indep: impl Into<String>,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            indep: indep.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Table without dependent columns or rows.
    pub fn empty(indep: impl Into<String>) -> Self {
        Self::new(indep, Vec::<String>::new())
    }

    /// Append a row. Missing trailing values are padded with NaN, extra ones
    /// are dropped.
    pub fn push(&mut self, x: f64, mut values: Vec<f64>) {
        values.resize(self.columns.len(), f64::NAN);
        self.rows.push(Row { x, values });
    }

    pub fn indep(&self) -> &str {
        &self.indep
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn xs(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.x).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of a column; the independent column is addressable by name too.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        if name == self.indep {
            return Some(self.xs());
        }
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r.values[idx]).collect())
    }

    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        let idx = self.column_index(name)?;
        self.rows.get(row).map(|r| r.values[idx])
    }

    /// Replace the named column or append it when absent.
    ///
    /// `values` shorter than the table are padded with NaN.
    pub fn with_column(mut self, name: &str, values: &[f64]) -> Self {
        let idx = match self.column_index(name) {
            Some(idx) => idx,
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.values.push(f64::NAN);
                }
                self.columns.len() - 1
            }
        };
        for (i, row) in self.rows.iter_mut().enumerate() {
            row.values[idx] = values.get(i).copied().unwrap_or(f64::NAN);
        }
        self
    }

    /// Stable ascending sort by the independent value.
    pub fn sort_by_indep(&mut self) {
        self.rows.sort_by(|a, b| a.x.total_cmp(&b.x));
    }
}
