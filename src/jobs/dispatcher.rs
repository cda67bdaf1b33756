//! Job dispatcher on a dedicated rayon pool.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{JobError, SolverError};
use crate::jobs::handle::JobHandle;
use crate::params::ParameterSet;
use crate::solver::Solver;

/// Job kind of the light/velocity synthesis program.
pub const LC_JOB: &str = "lc";

pub struct JobDispatcher {
    pool: rayon::ThreadPool,
    executors: HashMap<String, Arc<dyn Solver>>,
    next_id: AtomicU64,
}

impl fmt::Debug for JobDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("JobDispatcher")
            .field("workers", &self.workers())
            .field("kinds", &kinds)
            .finish()
    }
}

impl JobDispatcher {
    /// Pool with `workers` threads (`0` = rayon's default, one per core).
    pub fn new(workers: usize) -> Result<Self, JobError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("wdc-worker-{i}"))
            .build()
            .map_err(|e| JobError::Pool(e.to_string()))?;
        Ok(Self {
            pool,
            executors: HashMap::new(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Register the solver executing jobs of `kind`.
    pub fn with_executor(mut self, kind: impl Into<String>, solver: impl Solver + 'static) -> Self {
        self.executors.insert(kind.into(), Arc::new(solver));
        self
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Queue one job; returns immediately.
    ///
    /// The solver runs on a pool thread. Panics are reported as solver
    /// failures; a run exceeding `timeout` is reported as a timeout even when
    /// the solver itself did not enforce it.
    pub fn schedule(
        &self,
        kind: &str,
        params: ParameterSet,
        timeout: Option<Duration>,
    ) -> Result<JobHandle, JobError> {
        let solver = self
            .executors
            .get(kind)
            .cloned()
            .ok_or_else(|| JobError::UnknownKind(kind.to_string()))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = JobHandle::new(id, kind);

        let job = handle.clone();
        self.pool
            .spawn(move || run_job(job, solver.as_ref(), &params, timeout));
        debug!(job = id, kind, "job scheduled");
        Ok(handle)
    }
}

fn run_job(job: JobHandle, solver: &dyn Solver, params: &ParameterSet, timeout: Option<Duration>) {
    if !job.start() {
        debug!(job = job.id(), "job canceled before start");
        return;
    }

    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| solver.solve(params, timeout)))
        .unwrap_or_else(|payload| Err(SolverError::Failed(panic_message(payload.as_ref()))));
    let outcome = match (outcome, timeout) {
        (Ok(_), Some(limit)) if started.elapsed() > limit => Err(SolverError::Timeout(limit)),
        (outcome, _) => outcome,
    };

    if let Err(err) = &outcome {
        warn!(job = job.id(), error = %err, "job failed");
    }
    job.finish(outcome);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("solver panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("solver panicked: {msg}")
    } else {
        "solver panicked".to_string()
    }
}
