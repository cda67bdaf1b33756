//! Table transformers applied to observed data before comparison.
//!
//! Each transformer maps one [`ResultTable`] to a new one and leaves input
//! without the columns it needs unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::curves::table::{ResultTable, PHASE};

/// Name of the time column of observations.
pub const HJD: &str = "hjd";
pub const MAG: &str = "mag";

pub trait CurveTransformer: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;
    fn transform(&self, table: &ResultTable) -> ResultTable;
}

/// Folds heliocentric Julian dates into orbital phase.
///
/// `phase = ((hjd - hjd0) / period + delta) mod 1`. Without a usable period
/// the time span of the data is mapped onto `[0, 1)`. The `hjd` values are
/// kept as a dependent column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phaser {
    pub hjd0: f64,
    pub period: Option<f64>,
    pub delta: f64,
}

impl Default for Phaser {
    fn default() -> Self {
        Self {
            hjd0: 0.0,
            period: None,
            delta: 0.0,
        }
    }
}

impl Phaser {
    fn phases(&self, hjds: &[f64]) -> Vec<f64> {
        match self.period {
            Some(period) if period.is_finite() && period > 0.0 => hjds
                .iter()
                .map(|hjd| ((hjd - self.hjd0) / period + self.delta).rem_euclid(1.0))
                .collect(),
            _ => {
                let lo = hjds.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = hjds.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let range = hi - lo;
                hjds.iter()
                    .map(|hjd| {
                        if range > 0.0 {
                            ((hjd - lo) / range).rem_euclid(1.0)
                        } else {
                            0.0
                        }
                    })
                    .collect()
            }
        }
    }
}

impl CurveTransformer for Phaser {
    fn name(&self) -> &'static str {
        "phaser"
    }

    fn transform(&self, table: &ResultTable) -> ResultTable {
        if table.indep() != HJD {
            return table.clone();
        }
        let phases = self.phases(&table.xs());
        let mut columns = table.columns().to_vec();
        columns.push(HJD.to_string());

        let mut out = ResultTable::new(PHASE, columns);
        for (row, phase) in table.rows().iter().zip(phases) {
            let mut values = row.values.clone();
            values.push(row.x);
            out.push(phase, values);
        }
        out
    }
}

/// Averages the data into `k` equal bins of the independent variable.
///
/// Bins are half-open `[lo, hi)`, the last one also holds `vmax`. Each
/// non-empty bin yields one row: the mean of the independent value and of
/// every column. Inactive (or `k == 0`) resamplers pass data through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resampler {
    pub k: usize,
    pub active: bool,
    /// Lower bound; `None` takes the data minimum.
    pub vmin: Option<f64>,
    /// Upper bound; `None` takes the data maximum.
    pub vmax: Option<f64>,
}

impl Default for Resampler {
    fn default() -> Self {
        Self {
            k: 20,
            active: false,
            vmin: Some(0.0),
            vmax: Some(1.0),
        }
    }
}

impl CurveTransformer for Resampler {
    fn name(&self) -> &'static str {
        "resampler"
    }

    fn transform(&self, table: &ResultTable) -> ResultTable {
        if !self.active || self.k == 0 || table.is_empty() {
            return table.clone();
        }
        let xs = table.xs();
        let lo = self
            .vmin
            .unwrap_or_else(|| xs.iter().copied().fold(f64::INFINITY, f64::min));
        let hi = self
            .vmax
            .unwrap_or_else(|| xs.iter().copied().fold(f64::NEG_INFINITY, f64::max));
        let mut out = ResultTable::new(table.indep(), table.columns().to_vec());
        if !(lo.is_finite() && hi.is_finite() && hi > lo) {
            return out;
        }
        let width = (hi - lo) / self.k as f64;
        let ncols = table.columns().len();

        // (count, sum of x, sums of values)
        let mut bins: Vec<(usize, f64, Vec<f64>)> = vec![(0, 0.0, vec![0.0; ncols]); self.k];
        for row in table.rows() {
            if !(lo..=hi).contains(&row.x) {
                continue;
            }
            let idx = (((row.x - lo) / width) as usize).min(self.k - 1);
            let bin = &mut bins[idx];
            bin.0 += 1;
            bin.1 += row.x;
            for (sum, v) in bin.2.iter_mut().zip(&row.values) {
                *sum += v;
            }
        }
        for (count, sum_x, sums) in bins {
            if count == 0 {
                continue;
            }
            let n = count as f64;
            out.push(sum_x / n, sums.into_iter().map(|s| s / n).collect());
        }
        out
    }
}

/// Computes fit weights of light curve points.
///
/// ```text
/// normalized_light = ratio * 10^(-0.4 mag)
/// weight_flux      = 1 / normalized_light^(2 * noise_exponent)
/// weight_sigma     = 1e-4 / sigma^2
/// weight           = weight_flux * weight_sigma * intrinsic_weight
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightWeigher {
    pub intrinsic_weight: f64,
    pub sigma: f64,
    /// Noise scaling exponent in `[0, 1]`.
    pub noise_exponent: f64,
    pub normalization_ratio: f64,
}

impl Default for LightWeigher {
    fn default() -> Self {
        Self {
            intrinsic_weight: 1.0,
            sigma: 1.0,
            noise_exponent: 0.0,
            normalization_ratio: 1.0,
        }
    }
}

impl CurveTransformer for LightWeigher {
    fn name(&self) -> &'static str {
        "weigher"
    }

    fn transform(&self, table: &ResultTable) -> ResultTable {
        let Some(mags) = table.column(MAG) else {
            return table.clone();
        };
        let light: Vec<f64> = mags
            .iter()
            .map(|m| self.normalization_ratio * 10f64.powf(-0.4 * m))
            .collect();
        let flux: Vec<f64> = light
            .iter()
            .map(|l| 1.0 / l.powf(2.0 * self.noise_exponent))
            .collect();
        let sigma_weight = 1e-4 / (self.sigma * self.sigma);
        let weight: Vec<f64> = flux
            .iter()
            .map(|f| f * sigma_weight * self.intrinsic_weight)
            .collect();
        let sigma = vec![sigma_weight; light.len()];
        let intrinsic = vec![self.intrinsic_weight; light.len()];

        table
            .clone()
            .with_column("weight", &weight)
            .with_column("normalized_light", &light)
            .with_column("weight_intrinsic", &intrinsic)
            .with_column("weight_flux", &flux)
            .with_column("weight_sigma", &sigma)
    }
}
