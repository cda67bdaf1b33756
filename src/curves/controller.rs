//! Segmented curve generation.
//!
//! [`GenerationController`] owns the lifecycle of one synthesized curve:
//!
//! ```text
//! Invalid --generate/refresh--> Calculating --batch complete--> Ready
//! Calculating --cancel--> Canceling --> Invalid
//! Ready --parameter change--> Invalid
//! Calculating --parameter change--> Calculating   (restart, Invalid never visible)
//! ```
//!
//! Each `generate` call dispatches one solver job per segment (a *batch*).
//! Job completion callbacks run on pool threads; the last one of the current
//! batch takes the batch, merges the per-segment tables and publishes the
//! result. Callbacks of superseded or canceled batches are ignored.
//!
//! Locking: `control` serializes the control operations (`generate`,
//! `cancel`, `invalidate`, `refresh`) and is never taken by job callbacks.
//! `shared` guards the state and the tracked batch and is never held while
//! canceling handles, registering callbacks or notifying listeners.
//! Listener notification, gate release and callback registration are
//! deferred until `control` is released, so listeners may call any control
//! operation. The completion gate belongs to one batch at a time; a
//! superseded batch cannot open it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::curves::gate::CompletionGate;
use crate::curves::kind::CurveKind;
use crate::curves::merge::merge_tables;
use crate::curves::observer::{ChangeObserver, Invalidate};
use crate::curves::table::ResultTable;
use crate::error::{JobError, SegmentError};
use crate::jobs::{JobDispatcher, JobHandle, LC_JOB};
use crate::params::{
    EventBus, FlagFilter, ParamValue, ParameterSet, ParameterStore, SubscriptionId, MPAGE, PHIN,
    PHSTOP, PHSTRT,
};
use crate::segments::{SegmentData, SegmentTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurveState {
    Invalid,
    Calculating,
    Ready,
    Canceling,
}

impl CurveState {
    pub fn as_str(self) -> &'static str {
        match self {
            CurveState::Invalid => "invalid",
            CurveState::Calculating => "calculating",
            CurveState::Ready => "ready",
            CurveState::Canceling => "canceling",
        }
    }
}

impl fmt::Display for CurveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visible state transition, delivered to state listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub old: CurveState,
    pub new: CurveState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerOptions {
    /// Dispatcher job kind running the solver.
    pub job_kind: String,
    /// Per-job timeout used when `generate` gets none.
    pub job_timeout: Option<Duration>,
    /// Initial number of segments.
    pub segments: usize,
    /// Phase step of segments whose data carries none.
    pub phase_step: f64,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl ControllerOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            job_kind: LC_JOB.to_string(),
            job_timeout: config.job_timeout,
            segments: config.default_segments,
            phase_step: config.phase_step,
        }
    }
}

struct Batch {
    id: u64,
    segment_revision: u64,
    handles: Vec<JobHandle>,
}

struct Shared {
    state: CurveState,
    batch: Option<Batch>,
    /// Batch whose merge may still be published.
    active_batch: Option<u64>,
    table: Arc<ResultTable>,
    table_revision: u64,
    segments: SegmentTable,
}

/// Effects of a control section that must run after `control` is released,
/// so that listeners and callbacks may call back into the controller.
#[derive(Default)]
struct Deferred {
    changes: Vec<StateChange>,
    /// Batch whose gate to open.
    release: Option<u64>,
    /// New batch whose completion callbacks still need registering.
    callbacks: Option<(u64, Vec<JobHandle>)>,
}

impl Deferred {
    fn push(&mut self, change: Option<StateChange>) {
        self.changes.extend(change);
    }
}

pub struct GenerationController {
    me: Weak<GenerationController>,
    kind: CurveKind,
    dispatcher: Arc<JobDispatcher>,
    bundle: Arc<ParameterStore>,
    parameters: Arc<ParameterStore>,
    options: ControllerOptions,
    control: Mutex<()>,
    shared: Mutex<Shared>,
    next_batch: AtomicU64,
    gate: CompletionGate,
    state_bus: EventBus<(), StateChange>,
    observer: ChangeObserver,
}

impl fmt::Debug for GenerationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationController")
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("table_revision", &self.table_revision())
            .field("pending_jobs", &self.pending_jobs())
            .finish()
    }
}

impl GenerationController {
    /// Controller for a curve of `kind` over the shared `bundle`.
    ///
    /// The curve keeps its own overlay of the curve-dependent and
    /// curve-private parameters, initialized from the bundle. The domain
    /// starts split into `options.segments` equal segments.
    pub fn new(
        kind: CurveKind,
        dispatcher: Arc<JobDispatcher>,
        bundle: Arc<ParameterStore>,
        options: ControllerOptions,
    ) -> Result<Arc<Self>, SegmentError> {
        let parameters = Arc::new(ParameterStore::new(bundle.filtered(&FlagFilter::curve())));
        let step = parameters
            .value(PHIN)
            .unwrap_or(ParamValue::Float(options.phase_step));
        let segments = SegmentTable::uniform(
            options.segments,
            SegmentData::from([(PHIN.to_string(), step)]),
        )?;

        Ok(Arc::new_cyclic(|me: &Weak<Self>| {
            let target: Weak<dyn Invalidate> = me.clone();
            let observer =
                ChangeObserver::attach(Arc::clone(&bundle), Arc::clone(&parameters), target);
            Self {
                me: me.clone(),
                kind,
                dispatcher,
                bundle,
                parameters,
                options,
                control: Mutex::new(()),
                shared: Mutex::new(Shared {
                    state: CurveState::Invalid,
                    batch: None,
                    active_batch: None,
                    table: Arc::new(ResultTable::default()),
                    table_revision: 0,
                    segments,
                }),
                next_batch: AtomicU64::new(1),
                gate: CompletionGate::new(),
                state_bus: EventBus::new(),
                observer,
            }
        }))
    }

    fn control(&self) -> MutexGuard<'_, ()> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn kind(&self) -> CurveKind {
        self.kind
    }

    pub fn state(&self) -> CurveState {
        self.shared().state
    }

    /// Last published curve. Empty until the first batch completes.
    pub fn table(&self) -> Arc<ResultTable> {
        Arc::clone(&self.shared().table)
    }

    /// Bumped on every publish.
    pub fn table_revision(&self) -> u64 {
        self.shared().table_revision
    }

    /// Jobs of the current batch that are not done yet.
    pub fn pending_jobs(&self) -> usize {
        self.shared()
            .batch
            .as_ref()
            .map_or(0, |b| b.handles.iter().filter(|h| !h.done()).count())
    }

    pub fn bundle(&self) -> &Arc<ParameterStore> {
        &self.bundle
    }

    /// Curve-specific parameter overlay.
    pub fn parameters(&self) -> &Arc<ParameterStore> {
        &self.parameters
    }

    pub fn segments(&self) -> SegmentTable {
        self.shared().segments.clone()
    }

    /// Edit the segment table; the curve is invalidated when the edit
    /// changed it.
    pub fn edit_segments<R>(
        &self,
        edit: impl FnOnce(&mut SegmentTable) -> Result<R, SegmentError>,
    ) -> Result<R, SegmentError> {
        let (result, changed) = {
            let mut shared = self.shared();
            let before = shared.segments.revision();
            let result = edit(&mut shared.segments);
            (result, shared.segments.revision() != before)
        };
        if changed {
            self.invalidate();
        }
        result
    }

    /// Subscribe to visible state transitions.
    ///
    /// Listeners run without any controller lock held and may call back into
    /// the controller. Transitions triggered from different threads may be
    /// delivered interleaved; `StateChange::old` tells them apart.
    pub fn on_state_change(
        &self,
        listener: impl Fn(&StateChange) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.state_bus.subscribe((), |_| true, listener)
    }

    pub fn remove_state_listener(&self, id: SubscriptionId) -> bool {
        self.state_bus.unsubscribe(id)
    }

    /// Parameters a job would see, before per-segment overrides.
    pub fn snapshot(&self) -> ParameterSet {
        let mut params = self.bundle.snapshot();
        params.update_from(&self.parameters.snapshot());
        params.assign(MPAGE, self.kind.mpage());
        params
    }

    /// Start a new batch, superseding any running one.
    ///
    /// `job_timeout` overrides the configured per-job timeout. With `wait`
    /// the call blocks until the batch completes or is canceled.
    pub fn generate(&self, wait: bool, job_timeout: Option<Duration>) -> Result<(), JobError> {
        let mut deferred = Deferred::default();
        let result = {
            let _control = self.control();
            self.start_batch(job_timeout.or(self.options.job_timeout), &mut deferred)
        };
        self.run_deferred(deferred);
        result?;
        if wait {
            self.wait(None);
        }
        Ok(())
    }

    /// Generate only when the curve is invalid; optionally wait for it.
    pub fn refresh(&self, wait: bool) -> Result<(), JobError> {
        let mut deferred = Deferred::default();
        let result = {
            let _control = self.control();
            if self.state() == CurveState::Invalid {
                self.start_batch(self.options.job_timeout, &mut deferred)
            } else {
                Ok(())
            }
        };
        self.run_deferred(deferred);
        result?;
        if wait {
            self.wait(None);
        }
        Ok(())
    }

    /// Mark the curve stale. A running generation is restarted with the
    /// current parameters instead.
    pub fn invalidate(&self) {
        let mut deferred = Deferred::default();
        {
            let _control = self.control();
            if self.state() == CurveState::Calculating {
                debug!(kind = %self.kind, "restarting generation after change");
                if let Err(err) = self.start_batch(self.options.job_timeout, &mut deferred) {
                    warn!(kind = %self.kind, error = %err, "restart failed");
                }
            } else {
                deferred.push(self.set_state(&mut self.shared(), CurveState::Invalid));
            }
        }
        self.run_deferred(deferred);
    }

    /// Cancel the running batch. No-op unless calculating.
    pub fn cancel(&self) {
        let mut deferred = Deferred::default();
        {
            let _control = self.control();
            self.cancel_batch(&mut deferred);
        }
        self.run_deferred(deferred);
    }

    /// Block until the current batch completes or is canceled.
    ///
    /// Returns `true` at once when nothing is outstanding (in particular
    /// when ready), `false` when `timeout` elapsed first. `None` waits
    /// without bound. State listeners of the completing transition have run
    /// by the time this returns.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        self.gate.wait(timeout)
    }

    /// `Lcombined / Lnorm` of the first published row; `1.0` when the curve
    /// carries no light normalization.
    pub fn normalization_coefficient(&self) -> f64 {
        let table = self.table();
        match (table.value(0, "Lcombined"), table.value(0, "Lnorm")) {
            (Some(combined), Some(norm)) if norm != 0.0 && (combined / norm).is_finite() => {
                combined / norm
            }
            _ => 1.0,
        }
    }

    /// Stop observing parameters and cancel any running batch.
    pub fn shutdown(&self) {
        self.observer.detach();
        self.cancel();
    }

    fn set_state(&self, shared: &mut Shared, new: CurveState) -> Option<StateChange> {
        let old = shared.state;
        if old == new {
            return None;
        }
        shared.state = new;
        Some(StateChange { old, new })
    }

    fn notify(&self, change: Option<StateChange>) {
        if let Some(change) = change {
            debug!(kind = %self.kind, from = %change.old, to = %change.new, "curve state");
            self.state_bus.publish((), &change);
        }
    }

    /// Finish a control section once `control` is released: notify
    /// listeners, open the gate, then hook up the new batch's callbacks.
    fn run_deferred(&self, deferred: Deferred) {
        for change in deferred.changes {
            self.notify(Some(change));
        }
        if let Some(batch) = deferred.release {
            self.gate.release(batch);
        }
        if let Some((batch_id, handles)) = deferred.callbacks {
            for handle in handles {
                let me = self.me.clone();
                handle.on_done(move |job| {
                    if let Some(controller) = me.upgrade() {
                        controller.on_segment_done(batch_id, job);
                    }
                });
            }
        }
    }

    /// Dispatch one job per segment. Caller holds `control`.
    fn start_batch(
        &self,
        job_timeout: Option<Duration>,
        deferred: &mut Deferred,
    ) -> Result<(), JobError> {
        let batch_id = self.next_batch.fetch_add(1, Ordering::Relaxed);
        let (stale, segments, segment_revision) = {
            let mut shared = self.shared();
            shared.active_batch = Some(batch_id);
            (
                shared.batch.take(),
                shared.segments.segments(),
                shared.segments.revision(),
            )
        };
        if let Some(stale) = stale {
            debug!(batch = stale.id, superseded_by = batch_id, "superseding batch");
            for handle in &stale.handles {
                handle.cancel();
            }
        }

        let base = self.snapshot();
        let mut handles = Vec::with_capacity(segments.len());
        for segment in &segments {
            let mut params = base.clone();
            params.assign(PHSTRT, segment.left);
            params.assign(PHSTOP, segment.right);
            let step = segment
                .data
                .get(PHIN)
                .copied()
                .unwrap_or(ParamValue::Float(self.options.phase_step));
            params.assign(PHIN, step);

            match self
                .dispatcher
                .schedule(&self.options.job_kind, params, job_timeout)
            {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    for handle in &handles {
                        handle.cancel();
                    }
                    let mut shared = self.shared();
                    if shared.active_batch == Some(batch_id) {
                        shared.active_batch = None;
                    }
                    deferred.push(self.set_state(&mut shared, CurveState::Invalid));
                    deferred.release = Some(self.gate.batch());
                    return Err(err);
                }
            }
        }

        {
            let mut shared = self.shared();
            self.gate.arm(batch_id, handles.len());
            shared.batch = Some(Batch {
                id: batch_id,
                segment_revision,
                handles: handles.clone(),
            });
            deferred.push(self.set_state(&mut shared, CurveState::Calculating));
        }
        info!(kind = %self.kind, batch = batch_id, jobs = handles.len(), "generation dispatched");
        deferred.callbacks = Some((batch_id, handles));
        Ok(())
    }

    fn on_segment_done(&self, batch_id: u64, job: &JobHandle) {
        let batch = {
            let mut shared = self.shared();
            let current = shared.batch.as_ref().map(|b| b.id);
            if current != Some(batch_id) {
                debug!(batch = batch_id, job = job.id(), "ignoring stale completion");
                return;
            }
            self.gate.job_finished(batch_id);
            let running = shared
                .batch
                .as_ref()
                .is_some_and(|b| b.handles.iter().any(|h| !h.done()));
            if running {
                return;
            }
            shared.batch.take()
        };
        let Some(batch) = batch else {
            return;
        };

        let kind = self.kind.result_kind();
        let mut tables = Vec::with_capacity(batch.handles.len());
        for handle in &batch.handles {
            if handle.is_canceled() {
                continue;
            }
            match handle.result() {
                Ok(output) => {
                    if let Some(table) = output.get(kind) {
                        tables.push(table.clone());
                    }
                }
                Err(err) => warn!(batch = batch.id, job = handle.id(), error = %err, "segment failed"),
            }
        }
        let merged = Arc::new(merge_tables(&tables));

        let change = {
            let mut shared = self.shared();
            if shared.active_batch != Some(batch_id) {
                debug!(batch = batch_id, "discarding merge of superseded batch");
                return;
            }
            shared.active_batch = None;
            shared.table = merged;
            shared.table_revision += 1;
            self.set_state(&mut shared, CurveState::Ready)
        };
        info!(
            kind = %self.kind,
            batch = batch.id,
            segment_revision = batch.segment_revision,
            segments = tables.len(),
            "curve ready"
        );
        self.notify(change);
        self.gate.release(batch_id);
    }

    /// Caller holds `control`.
    fn cancel_batch(&self, deferred: &mut Deferred) {
        let batch = {
            let mut shared = self.shared();
            if shared.state != CurveState::Calculating {
                return;
            }
            shared.active_batch = None;
            let batch = shared.batch.take();
            let pending = batch
                .as_ref()
                .is_some_and(|b| b.handles.iter().any(|h| !h.done()));
            if pending {
                deferred.push(self.set_state(&mut shared, CurveState::Canceling));
            }
            batch
        };

        if let Some(batch) = batch {
            let canceled = batch.handles.iter().filter(|h| h.cancel()).count();
            info!(kind = %self.kind, batch = batch.id, canceled, "generation canceled");
        }

        deferred.push(self.set_state(&mut self.shared(), CurveState::Invalid));
        deferred.release = Some(self.gate.batch());
    }
}

impl Invalidate for GenerationController {
    fn invalidate(&self) {
        GenerationController::invalidate(self);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::params::PERIOD;
    use crate::error::SolverError;
    use crate::solver::{ResultKind, Solver, SolverOutput, SyntheticSolver};

    fn controller(segments: usize) -> Arc<GenerationController> {
        let dispatcher = Arc::new(
            JobDispatcher::new(2)
                .unwrap()
                .with_executor(LC_JOB, SyntheticSolver::new()),
        );
        let bundle = Arc::new(ParameterStore::new(ParameterSet::default_binary()));
        let options = ControllerOptions {
            segments,
            ..ControllerOptions::default()
        };
        GenerationController::new(CurveKind::Light, dispatcher, bundle, options).unwrap()
    }

    #[test]
    fn starts_invalid_with_empty_table() {
        let c = controller(4);
        assert_eq!(c.state(), CurveState::Invalid);
        assert!(c.table().is_empty());
        assert_eq!(c.segments().count(), 4);
        assert_eq!(c.normalization_coefficient(), 1.0);
    }

    #[test]
    fn snapshot_carries_output_selector_and_overlay() {
        let c = controller(1);
        c.parameters().set_value("HLUM", 7.0).unwrap();
        let snap = c.snapshot();
        assert_eq!(snap.int(MPAGE).unwrap(), 1);
        assert_eq!(snap.float("HLUM").unwrap(), 7.0);
        assert_eq!(snap.float(PERIOD).unwrap(), 1.0);
    }

    #[test]
    fn generate_and_wait_reaches_ready() {
        let c = controller(4);
        c.generate(true, None).unwrap();
        assert_eq!(c.state(), CurveState::Ready);
        assert!(c.wait(Some(Duration::ZERO)));
        let table = c.table();
        // 4 segments of 26 points sharing 3 boundaries
        assert_eq!(table.len(), 101);
        assert_eq!(table.xs().first().copied(), Some(0.0));
        assert_eq!(table.xs().last().copied(), Some(1.0));
        assert_eq!(c.table_revision(), 1);
        assert!(c.normalization_coefficient() > 1.0);
    }

    #[test]
    fn refresh_only_generates_when_invalid() {
        let c = controller(2);
        c.refresh(true).unwrap();
        assert_eq!(c.table_revision(), 1);
        c.refresh(true).unwrap();
        assert_eq!(c.table_revision(), 1);
    }

    #[test]
    fn parameter_change_invalidates_ready_curve() {
        let c = controller(2);
        c.generate(true, None).unwrap();
        c.bundle().set_value(PERIOD, 2.0).unwrap();
        assert_eq!(c.state(), CurveState::Invalid);
    }

    #[test]
    fn segment_edit_invalidates() {
        let c = controller(2);
        c.generate(true, None).unwrap();
        c.edit_segments(|s| s.split(0, None)).unwrap();
        assert_eq!(c.state(), CurveState::Invalid);
        assert_eq!(c.segments().count(), 3);

        c.generate(true, None).unwrap();
        let err = c.edit_segments(|s| s.split(0, Some(2.0))).unwrap_err();
        assert!(matches!(err, SegmentError::DividerOutOfRange { .. }));
        assert_eq!(c.state(), CurveState::Ready);
    }

    #[test]
    fn cancel_is_noop_when_not_calculating() {
        let c = controller(1);
        c.cancel();
        assert_eq!(c.state(), CurveState::Invalid);
        c.generate(true, None).unwrap();
        c.cancel();
        assert_eq!(c.state(), CurveState::Ready);
    }

    #[test]
    fn unknown_job_kind_leaves_curve_invalid() {
        let dispatcher = Arc::new(JobDispatcher::new(1).unwrap());
        let bundle = Arc::new(ParameterStore::new(ParameterSet::default_binary()));
        let c = GenerationController::new(
            CurveKind::Light,
            dispatcher,
            bundle,
            ControllerOptions::default(),
        )
        .unwrap();
        assert!(matches!(c.generate(false, None), Err(JobError::UnknownKind(_))));
        assert_eq!(c.state(), CurveState::Invalid);
        assert!(c.wait(Some(Duration::ZERO)));
    }

    #[test]
    fn failed_segments_are_skipped() {
        let dispatcher = Arc::new(JobDispatcher::new(2).unwrap().with_executor(
            LC_JOB,
            |p: &ParameterSet, t: Option<Duration>| {
                if p.float(PHSTRT).unwrap_or(0.0) > 0.0 {
                    return Err(SolverError::Failed("lc crashed".into()));
                }
                SyntheticSolver::new().solve(p, t)
            },
        ));
        let bundle = Arc::new(ParameterStore::new(ParameterSet::default_binary()));
        let options = ControllerOptions {
            segments: 2,
            ..ControllerOptions::default()
        };
        let c = GenerationController::new(CurveKind::Light, dispatcher, bundle, options).unwrap();
        c.generate(true, None).unwrap();
        assert_eq!(c.state(), CurveState::Ready);
        assert_eq!(c.table().len(), 51);
    }

    #[test]
    fn state_listener_sees_transitions() {
        let c = controller(1);
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        c.on_state_change(move |change| {
            let _ = tx.lock().unwrap().send(*change);
        });
        c.generate(true, None).unwrap();
        let seen: Vec<StateChange> = rx.try_iter().collect();
        assert_eq!(
            seen,
            vec![
                StateChange {
                    old: CurveState::Invalid,
                    new: CurveState::Calculating
                },
                StateChange {
                    old: CurveState::Calculating,
                    new: CurveState::Ready
                },
            ]
        );
    }

    #[test]
    fn velocity_curve_keeps_veloc_table() {
        let dispatcher = Arc::new(
            JobDispatcher::new(2)
                .unwrap()
                .with_executor(LC_JOB, SyntheticSolver::new()),
        );
        let bundle = Arc::new(ParameterStore::new(ParameterSet::default_binary()));
        let c = GenerationController::new(
            CurveKind::Velocity,
            dispatcher,
            bundle,
            ControllerOptions::default(),
        )
        .unwrap();
        c.generate(true, None).unwrap();
        let table = c.table();
        assert!(table.column_index("V1").is_some());
        assert_eq!(c.normalization_coefficient(), 1.0);
        assert_eq!(CurveKind::Velocity.result_kind(), ResultKind::Veloc);
    }

    #[test]
    fn empty_solver_output_gives_empty_ready_table() {
        let dispatcher = Arc::new(JobDispatcher::new(1).unwrap().with_executor(
            LC_JOB,
            |_: &ParameterSet, _: Option<Duration>| Ok(SolverOutput::new()),
        ));
        let bundle = Arc::new(ParameterStore::new(ParameterSet::default_binary()));
        let c = GenerationController::new(
            CurveKind::Light,
            dispatcher,
            bundle,
            ControllerOptions::default(),
        )
        .unwrap();
        c.generate(true, None).unwrap();
        assert_eq!(c.state(), CurveState::Ready);
        assert!(c.table().is_empty());
    }
}
