//! Observed data with its transformer pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::curves::cache::RevisionCache;
use crate::curves::merge::merge_tables;
use crate::curves::table::{ResultTable, PHASE};
use crate::curves::transform::{CurveTransformer, LightWeigher, Phaser, Resampler};
use crate::math::CubicSpline;

type Approximators = BTreeMap<String, Option<CubicSpline>>;

/// Raw observations plus phaser, resampler and weigher.
///
/// Every change of the raw table or of a transformer bumps the revision;
/// the transformed table and the spline approximators are recomputed lazily
/// once per revision.
#[derive(Debug, Clone)]
pub struct ObservedValues {
    raw: ResultTable,
    value_columns: Vec<String>,
    phaser: Phaser,
    resampler: Resampler,
    weigher: LightWeigher,
    revision: u64,
    transformed: RevisionCache<Arc<ResultTable>>,
    approximators: RevisionCache<Arc<Approximators>>,
}

impl ObservedValues {
    /// `value_columns` are the dependent columns approximated by
    /// [`values_at`](Self::values_at).
    pub fn new(raw: ResultTable, value_columns: &[&str]) -> Self {
        Self {
            raw,
            value_columns: value_columns.iter().map(|c| c.to_string()).collect(),
            phaser: Phaser::default(),
            resampler: Resampler::default(),
            weigher: LightWeigher::default(),
            revision: 0,
            transformed: RevisionCache::new(),
            approximators: RevisionCache::new(),
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn raw(&self) -> &ResultTable {
        &self.raw
    }

    pub fn set_raw(&mut self, raw: ResultTable) {
        self.raw = raw;
        self.revision += 1;
    }

    pub fn phaser(&self) -> &Phaser {
        &self.phaser
    }

    pub fn resampler(&self) -> &Resampler {
        &self.resampler
    }

    pub fn weigher(&self) -> &LightWeigher {
        &self.weigher
    }

    /// Modify the phaser; bumps the revision only when it changed.
    pub fn update_phaser(&mut self, update: impl FnOnce(&mut Phaser)) -> bool {
        let mut phaser = self.phaser.clone();
        update(&mut phaser);
        self.replace(phaser, |s| &mut s.phaser)
    }

    pub fn update_resampler(&mut self, update: impl FnOnce(&mut Resampler)) -> bool {
        let mut resampler = self.resampler.clone();
        update(&mut resampler);
        self.replace(resampler, |s| &mut s.resampler)
    }

    pub fn update_weigher(&mut self, update: impl FnOnce(&mut LightWeigher)) -> bool {
        let mut weigher = self.weigher.clone();
        update(&mut weigher);
        self.replace(weigher, |s| &mut s.weigher)
    }

    fn replace<T: PartialEq>(&mut self, value: T, field: impl FnOnce(&mut Self) -> &mut T) -> bool {
        let slot = field(self);
        if *slot == value {
            return false;
        }
        *slot = value;
        self.revision += 1;
        true
    }

    /// Raw data run through phaser, resampler and weigher.
    pub fn table(&mut self) -> Arc<ResultTable> {
        let (raw, phaser, resampler, weigher) =
            (&self.raw, &self.phaser, &self.resampler, &self.weigher);
        self.transformed.get_or_insert_with(self.revision, || {
            let stages: [&dyn CurveTransformer; 3] = [phaser, resampler, weigher];
            let table = stages
                .iter()
                .fold(raw.clone(), |table, stage| stage.transform(&table));
            Arc::new(table)
        })
    }

    fn approximators(&mut self) -> Arc<Approximators> {
        let table = self.table();
        let columns = &self.value_columns;
        self.approximators.get_or_insert_with(self.revision, || {
            let xs = table.xs();
            let map = columns
                .iter()
                .filter_map(|name| {
                    let ys = table.column(name)?;
                    Some((name.clone(), CubicSpline::natural(&xs, &ys)))
                })
                .collect();
            Arc::new(map)
        })
    }

    /// Approximated values at `phases`.
    ///
    /// Phases are taken modulo 1; points outside the observed span wrap
    /// around it. Columns with too few points to fit a spline are NaN.
    pub fn values_at(&mut self, phases: &[f64]) -> ResultTable {
        let approximators = self.approximators();
        let columns: Vec<&str> = approximators.keys().map(String::as_str).collect();
        let mut out = ResultTable::new(PHASE, columns);
        for &phase in phases {
            let values = approximators
                .values()
                .map(|spline| {
                    spline
                        .as_ref()
                        .map_or(f64::NAN, |s| s.eval_periodic(phase.rem_euclid(1.0)))
                })
                .collect();
            out.push(phase, values);
        }
        out
    }

    /// Actual rows supplemented with approximated values at `phases`,
    /// sorted by phase. Actual rows win where both exist.
    pub fn combined_values(&mut self, phases: &[f64]) -> ResultTable {
        let approximated = self.values_at(phases);
        let actual = self.table();
        merge_tables(&[actual.as_ref().clone(), approximated])
    }
}
