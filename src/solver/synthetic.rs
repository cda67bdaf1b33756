//! Analytic stand-in for the external synthesis program.
//!
//! Produces a detached binary on a circular orbit: two spheres with an
//! ellipsoidal term, linear-overlap eclipses and third light. Good enough to
//! exercise the generation engine end to end; not a physical model.

use std::f64::consts::TAU;
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::curves::{ResultTable, PHASE};
use crate::error::SolverError;
use crate::params::{
    ParameterSet, MPAGE, NOISE, PERIOD, PHIN, PHN, PHSTOP, PHSTRT, PSHIFT, SEED, STDEV,
};
use crate::solver::{ResultKind, Solver, SolverOutput};

const SOLAR_RADIUS_KM: f64 = 695_660.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Fractional radii of the two components (units of the separation).
const R1: f64 = 0.25;
const R2: f64 = 0.20;

/// Most points one solver call will compute.
pub const MAX_GRID_POINTS: usize = 1_000_000;

pub const LIGHT_COLUMNS: [&str; 5] = ["L1", "L2", "Lcombined", "Lnorm", "mag"];
pub const VELOC_COLUMNS: [&str; 2] = ["V1", "V2"];

#[derive(Debug, Clone, Default)]
pub struct SyntheticSolver {
    /// Artificial run time per invocation.
    pub latency: Option<Duration>,
}

impl SyntheticSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
        }
    }
}

impl Solver for SyntheticSolver {
    fn solve(
        &self,
        params: &ParameterSet,
        timeout: Option<Duration>,
    ) -> Result<SolverOutput, SolverError> {
        if let Some(latency) = self.latency {
            match timeout {
                Some(limit) if latency > limit => {
                    thread::sleep(limit);
                    return Err(SolverError::Timeout(limit));
                }
                _ => thread::sleep(latency),
            }
        }

        let phases = phase_grid(
            float(params, PHSTRT)?,
            float(params, PHSTOP)?,
            float(params, PHIN)?,
        )?;
        let mpage = params
            .int(MPAGE)
            .map_err(|_| SolverError::MissingParameter(MPAGE.to_string()))?;
        let mut table = match mpage {
            1 => light_table(params, &phases)?,
            2 => veloc_table(params, &phases)?,
            other => return Err(SolverError::Failed(format!("unsupported MPAGE {other}"))),
        };

        if params.int(NOISE).unwrap_or(0) != 0 {
            let stdev = float(params, STDEV)?;
            if stdev > 0.0 {
                let seed = params.int(SEED).unwrap_or(0) as u64 ^ phases[0].to_bits();
                table = add_noise(table, stdev, seed)?;
            }
        }

        let kind = if mpage == 1 {
            ResultKind::Light
        } else {
            ResultKind::Veloc
        };
        Ok(SolverOutput::new().with(kind, table))
    }
}

fn float(params: &ParameterSet, name: &str) -> Result<f64, SolverError> {
    params
        .float(name)
        .map_err(|_| SolverError::MissingParameter(name.to_string()))
}

/// `start, start + step, ...` up to and including `stop`.
fn phase_grid(start: f64, stop: f64, step: f64) -> Result<Vec<f64>, SolverError> {
    if !(step.is_finite() && step > 0.0) {
        return Err(SolverError::Failed(format!("invalid phase step {step}")));
    }
    if !(start.is_finite() && stop.is_finite()) || stop < start {
        return Err(SolverError::Failed(format!(
            "invalid phase range [{start}, {stop}]"
        )));
    }
    let steps = ((stop - start) / step - 1e-9).ceil().max(0.0);
    if steps >= MAX_GRID_POINTS as f64 {
        return Err(SolverError::Failed(format!(
            "phase step {step} over [{start}, {stop}] exceeds {MAX_GRID_POINTS} points"
        )));
    }
    let n = steps as usize;
    let mut phases: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
    phases.push(stop);
    Ok(phases)
}

struct LightModel {
    hlum: f64,
    clum: f64,
    el3: f64,
    ellipsoidal: f64,
    cos_i: f64,
    sin_i: f64,
    dark1: f64,
    dark2: f64,
    shift: f64,
}

impl LightModel {
    fn from_params(params: &ParameterSet) -> Result<Self, SolverError> {
        let incl = float(params, "XINCL")?.to_radians();
        let (sin_i, cos_i) = incl.sin_cos();
        Ok(Self {
            hlum: float(params, "HLUM")?,
            clum: float(params, "CLUM")?,
            el3: float(params, "EL3")?,
            ellipsoidal: 0.05 * float(params, "RM")? * sin_i * sin_i,
            cos_i,
            sin_i,
            dark1: float(params, "XH")?,
            dark2: float(params, "XC")?,
            shift: float(params, PSHIFT)?,
        })
    }

    fn luminosities(&self, phase: f64) -> (f64, f64) {
        let theta = TAU * (phase + self.shift);
        let ellipsoidal = 1.0 - self.ellipsoidal * (2.0 * theta).cos();
        let mut l1 = self.hlum * ellipsoidal;
        let mut l2 = self.clum * ellipsoidal;

        let sin_t = theta.sin();
        let separation = (self.cos_i * self.cos_i + self.sin_i * self.sin_i * sin_t * sin_t).sqrt();
        let overlap = ((R1 + R2 - separation) / (2.0 * R2)).clamp(0.0, 1.0);
        if overlap > 0.0 {
            if theta.cos() > 0.0 {
                let depth = overlap * (R2 / R1).powi(2) * (1.0 - self.dark1 / 3.0);
                l1 *= 1.0 - depth;
            } else {
                l2 *= 1.0 - overlap * (1.0 - self.dark2 / 3.0);
            }
        }
        (l1, l2)
    }
}

fn light_table(params: &ParameterSet, phases: &[f64]) -> Result<ResultTable, SolverError> {
    let model = LightModel::from_params(params)?;
    let (n1, n2) = model.luminosities(float(params, PHN)?);
    let norm = n1 + n2 + model.el3;
    if !(norm.is_finite() && norm > 0.0) {
        return Err(SolverError::Failed(format!("normalization light {norm}")));
    }

    let mut table = ResultTable::new(PHASE, LIGHT_COLUMNS);
    for &phase in phases {
        let (l1, l2) = model.luminosities(phase);
        let combined = l1 + l2 + model.el3;
        let lnorm = combined / norm;
        table.push(phase, vec![l1, l2, combined, lnorm, -2.5 * lnorm.log10()]);
    }
    Ok(table)
}

fn veloc_table(params: &ParameterSet, phases: &[f64]) -> Result<ResultTable, SolverError> {
    let a = float(params, "A")?;
    let period = float(params, PERIOD)?;
    let q = float(params, "RM")?;
    let vga = float(params, "VGA")?;
    let shift = float(params, PSHIFT)?;
    if !(period.is_finite() && period > 0.0) {
        return Err(SolverError::Failed(format!("invalid period {period}")));
    }

    let orbital = TAU * a * SOLAR_RADIUS_KM / (period * SECONDS_PER_DAY);
    let projected = orbital * float(params, "XINCL")?.to_radians().sin();
    let k1 = projected * q / (1.0 + q);
    let k2 = projected / (1.0 + q);

    let mut table = ResultTable::new(PHASE, VELOC_COLUMNS);
    for &phase in phases {
        let s = (TAU * (phase + shift)).sin();
        table.push(phase, vec![vga - k1 * s, vga + k2 * s]);
    }
    Ok(table)
}

fn add_noise(table: ResultTable, stdev: f64, seed: u64) -> Result<ResultTable, SolverError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, stdev)
        .map_err(|e| SolverError::Failed(format!("noise distribution: {e}")))?;

    let targets: &[&str] = if table.column_index("mag").is_some() {
        &["mag"]
    } else {
        &VELOC_COLUMNS
    };
    let mut noisy = table;
    for &name in targets {
        let Some(values) = noisy.column(name) else {
            continue;
        };
        let values: Vec<f64> = values.iter().map(|v| v + normal.sample(&mut rng)).collect();
        noisy = noisy.with_column(name, &values);
    }
    Ok(noisy)
}
