//! Shared generation pipeline used by the CLI and the integration tests.
//!
//! engine setup -> curve construction -> segment edits -> generation -> residuals
//!
//! The CLI only adds argument handling and printing on top.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::curves::{ControllerOptions, Curve, CurveKind, CurveState, ResultTable, HJD};
use crate::error::AppError;
use crate::jobs::{JobDispatcher, LC_JOB};
use crate::params::{ParamValue, ParameterSet, ParameterStore};
use crate::report::{compute_residuals, ResidualStats};
use crate::solver::SyntheticSolver;

/// Worker pool plus the shared parameter bundle of one binary system.
#[derive(Debug, Clone)]
pub struct Engine {
    pub config: EngineConfig,
    pub dispatcher: Arc<JobDispatcher>,
    pub bundle: Arc<ParameterStore>,
}

impl Engine {
    /// Engine backed by the synthetic solver, optionally slowed down.
    pub fn synthetic(config: EngineConfig, latency: Option<Duration>) -> Result<Self, AppError> {
        config.validate()?;
        let solver = match latency {
            Some(latency) => SyntheticSolver::with_latency(latency),
            None => SyntheticSolver::new(),
        };
        let dispatcher = JobDispatcher::new(config.workers)?.with_executor(LC_JOB, solver);
        info!(workers = dispatcher.workers(), "worker pool ready");
        Ok(Self {
            config,
            dispatcher: Arc::new(dispatcher),
            bundle: Arc::new(ParameterStore::new(ParameterSet::default_binary())),
        })
    }

    /// New curve of `kind` over this engine's bundle.
    pub fn curve(&self, kind: CurveKind, observations: Option<ResultTable>) -> Result<Curve, AppError> {
        Ok(Curve::new(
            kind,
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.bundle),
            ControllerOptions::from_config(&self.config),
            observations.unwrap_or_else(|| ResultTable::empty(HJD)),
        )?)
    }

    /// Apply `NAME=VALUE` overrides to the bundle.
    pub fn apply_assignments(&self, assignments: &[String]) -> Result<(), AppError> {
        for raw in assignments {
            let (name, value) = parse_assignment(raw)?;
            if self.bundle.set_value(&name, value)? {
                info!(parameter = %name, %value, "bundle parameter set");
            }
        }
        Ok(())
    }
}

/// Parse `NAME=VALUE`; values without a decimal point or exponent are integers.
pub fn parse_assignment(raw: &str) -> Result<(String, ParamValue), AppError> {
    let Some((name, value)) = raw.split_once('=') else {
        return Err(AppError::new(2, format!("Expected NAME=VALUE, got '{raw}'")));
    };
    let (name, value) = (name.trim(), value.trim());
    if name.is_empty() {
        return Err(AppError::new(2, format!("Missing parameter name in '{raw}'")));
    }
    let parsed = match value.parse::<i64>() {
        Ok(v) => ParamValue::Int(v),
        Err(_) => value
            .parse::<f64>()
            .map(ParamValue::Float)
            .map_err(|_| AppError::new(2, format!("Invalid value for {name}: '{value}'")))?,
    };
    Ok((name.to_string(), parsed))
}

/// Everything a single `wdc generate` run computed.
#[derive(Debug)]
pub struct GenerateRun {
    pub curve: Curve,
    pub elapsed: Duration,
    pub residuals: Vec<ResidualStats>,
}

impl GenerateRun {
    pub fn completed(&self) -> bool {
        self.curve.generator().state() == CurveState::Ready
    }
}

/// Split at `splits`, generate, and wait.
///
/// With a `wait` limit the batch is canceled once the limit passes; the
/// run still returns so the caller can report the abandoned state.
pub fn run_generate(
    curve: Curve,
    splits: &[f64],
    wait: Option<Duration>,
) -> Result<GenerateRun, AppError> {
    let generator = Arc::clone(curve.generator());
    for &pos in splits {
        generator.edit_segments(|segments| segments.split_at(pos))?;
    }

    let started = Instant::now();
    generator.generate(false, None)?;
    if !generator.wait(wait) {
        warn!(
            limit_secs = wait.map(|d| d.as_secs_f64()),
            pending = generator.pending_jobs(),
            "generation did not finish in time, canceling"
        );
        generator.cancel();
    }
    let elapsed = started.elapsed();
    info!(
        state = %generator.state(),
        rows = generator.table().len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "generation finished"
    );

    let residuals = residuals(&curve);
    Ok(GenerateRun {
        curve,
        elapsed,
        residuals,
    })
}

fn residuals(curve: &Curve) -> Vec<ResidualStats> {
    let synthetic = curve.synthetic_at_observations();
    if synthetic.is_empty() {
        return Vec::new();
    }
    let observed = curve.observed().table();
    curve
        .kind()
        .value_columns()
        .iter()
        .filter_map(|column| compute_residuals(&observed, &synthetic, column))
        .collect()
}
