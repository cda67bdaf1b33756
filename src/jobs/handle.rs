//! Handle of one scheduled solver job.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{JobError, SolverError};
use crate::solver::SolverOutput;

type Callback = Box<dyn FnOnce(&JobHandle) + Send>;

enum Status {
    Pending,
    Running,
    Finished(Result<Arc<SolverOutput>, SolverError>),
    Canceled,
}

struct Slot {
    status: Status,
    callbacks: Vec<Callback>,
}

struct Inner {
    id: u64,
    kind: String,
    slot: Mutex<Slot>,
}

/// Shared, clonable handle to a job.
///
/// Completion callbacks run exactly once, on the thread that finishes or
/// cancels the job, after the handle's internal lock has been released.
#[derive(Clone)]
pub struct JobHandle(Arc<Inner>);

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.lock().status {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Finished(Ok(_)) => "ok",
            Status::Finished(Err(_)) => "failed",
            Status::Canceled => "canceled",
        };
        f.debug_struct("JobHandle")
            .field("id", &self.0.id)
            .field("kind", &self.0.kind)
            .field("status", &status)
            .finish()
    }
}

impl JobHandle {
    pub(crate) fn new(id: u64, kind: impl Into<String>) -> Self {
        Self(Arc::new(Inner {
            id,
            kind: kind.into(),
            slot: Mutex::new(Slot {
                status: Status::Pending,
                callbacks: Vec::new(),
            }),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.0.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn kind(&self) -> &str {
        &self.0.kind
    }

    /// Finished (successfully or not) or canceled.
    pub fn done(&self) -> bool {
        matches!(self.lock().status, Status::Finished(_) | Status::Canceled)
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self.lock().status, Status::Canceled)
    }

    /// Outcome of a done job; `JobError::Pending` while it still runs.
    pub fn result(&self) -> Result<Arc<SolverOutput>, JobError> {
        match &self.lock().status {
            Status::Pending | Status::Running => Err(JobError::Pending),
            Status::Canceled => Err(JobError::Canceled),
            Status::Finished(Ok(output)) => Ok(Arc::clone(output)),
            Status::Finished(Err(err)) => Err(JobError::Solver(err.clone())),
        }
    }

    /// Request cancellation.
    ///
    /// A pending job will not start; a running job's outcome is discarded
    /// when it arrives. Returns `false` when the job was already done.
    pub fn cancel(&self) -> bool {
        let callbacks = {
            let mut slot = self.lock();
            match slot.status {
                Status::Pending | Status::Running => {
                    slot.status = Status::Canceled;
                    std::mem::take(&mut slot.callbacks)
                }
                _ => return false,
            }
        };
        self.fire(callbacks);
        true
    }

    /// Register a completion callback. Runs immediately when already done.
    pub fn on_done(&self, callback: impl FnOnce(&JobHandle) + Send + 'static) {
        {
            let mut slot = self.lock();
            if matches!(slot.status, Status::Pending | Status::Running) {
                slot.callbacks.push(Box::new(callback));
                return;
            }
        }
        callback(self);
    }

    pub fn same_job(&self, other: &JobHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Mark the job as running; `false` when it was canceled before start.
    pub(crate) fn start(&self) -> bool {
        let mut slot = self.lock();
        match slot.status {
            Status::Pending => {
                slot.status = Status::Running;
                true
            }
            _ => false,
        }
    }

    /// Store the outcome and fire callbacks. Ignored for canceled jobs.
    pub(crate) fn finish(&self, outcome: Result<SolverOutput, SolverError>) {
        let callbacks = {
            let mut slot = self.lock();
            if !matches!(slot.status, Status::Pending | Status::Running) {
                return;
            }
            slot.status = Status::Finished(outcome.map(Arc::new));
            std::mem::take(&mut slot.callbacks)
        };
        self.fire(callbacks);
    }

    fn fire(&self, callbacks: Vec<Callback>) {
        for callback in callbacks {
            callback(self);
        }
    }
}
