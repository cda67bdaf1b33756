//! End-to-end generation scenarios against the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

use wd_curves::app::pipeline::Engine;
use wd_curves::config::EngineConfig;
use wd_curves::curves::{
    ControllerOptions, CurveKind, CurveState, GenerationController, ResultTable, MAG, PHASE,
};
use wd_curves::error::SolverError;
use wd_curves::jobs::{JobDispatcher, LC_JOB};
use wd_curves::params::{ParamValue, ParameterSet, ParameterStore, PHIN, PHSTOP, PHSTRT};
use wd_curves::segments::SegmentData;
use wd_curves::solver::{ResultKind, Solver, SolverOutput, SyntheticSolver};

const LONG: Duration = Duration::from_secs(10);

/// Blocks solver calls until opened.
#[derive(Default)]
struct Latch {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Latch {
    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cv.wait(open).unwrap();
        }
    }

    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }
}

fn controller_with(
    solver: impl Solver + 'static,
    segments: usize,
) -> (Arc<ParameterStore>, Arc<GenerationController>) {
    let dispatcher = Arc::new(JobDispatcher::new(4).unwrap().with_executor(LC_JOB, solver));
    let bundle = Arc::new(ParameterStore::new(ParameterSet::default_binary()));
    let options = ControllerOptions {
        segments,
        ..ControllerOptions::default()
    };
    let controller =
        GenerationController::new(CurveKind::Light, dispatcher, Arc::clone(&bundle), options)
            .unwrap();
    (bundle, controller)
}

/// Solver returning the segment end points with `value` as magnitude.
fn endpoints(params: &ParameterSet, value: f64) -> SolverOutput {
    let mut table = ResultTable::new(PHASE, [MAG]);
    table.push(params.float(PHSTRT).unwrap(), vec![value]);
    table.push(params.float(PHSTOP).unwrap(), vec![value]);
    SolverOutput::new().with(ResultKind::Light, table)
}

/// Solver that announces each call, then blocks on `latch`; the magnitude
/// is the 1-based call number.
fn blocking_solver(
    latch: Arc<Latch>,
) -> (
    impl Fn(&ParameterSet, Option<Duration>) -> Result<SolverOutput, SolverError> + Send + Sync,
    Receiver<usize>,
) {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let calls = AtomicUsize::new(0);
    let solver = move |params: &ParameterSet, _: Option<Duration>| {
        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = tx.lock().unwrap().send(call);
        latch.wait();
        Ok::<_, SolverError>(endpoints(params, call as f64))
    };
    (solver, rx)
}

#[test]
fn four_segments_merge_into_one_sorted_table() {
    let engine = Engine::synthetic(EngineConfig::default(), None).unwrap();
    let curve = engine.curve(CurveKind::Light, None).unwrap();
    let generator = curve.generator();
    assert_eq!(generator.segments().count(), 4);

    generator.generate(true, None).unwrap();
    assert_eq!(generator.state(), CurveState::Ready);

    let table = generator.table();
    let xs = table.xs();
    assert_eq!(xs.len(), 101);
    assert_eq!(xs[0], 0.0);
    assert_eq!(xs[100], 1.0);
    assert!(xs.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(xs.iter().filter(|&&x| x == 0.25).count(), 1);
    assert_eq!(xs.iter().filter(|&&x| x == 0.75).count(), 1);
}

#[test]
fn per_segment_phase_step_is_honored() {
    let engine = Engine::synthetic(EngineConfig::default(), None).unwrap();
    let curve = engine.curve(CurveKind::Velocity, None).unwrap();
    let generator = curve.generator();
    generator
        .edit_segments(|segments| {
            segments.update_data(0, SegmentData::from([(PHIN.to_string(), ParamValue::Float(0.125))]))
        })
        .unwrap();

    generator.generate(true, None).unwrap();
    let table = generator.table();
    // 3 points in [0, 0.25], 26 in each of the other three, 3 shared ends
    assert_eq!(table.len(), 3 + 3 * 26 - 3);
    assert_eq!(table.columns().to_vec(), vec!["V1".to_string(), "V2".to_string()]);
}

#[test]
fn wait_reflects_outstanding_jobs() {
    let latch = Arc::new(Latch::default());
    let (solver, started) = blocking_solver(Arc::clone(&latch));
    let (_bundle, controller) = controller_with(solver, 2);

    controller.generate(false, None).unwrap();
    started.recv_timeout(LONG).unwrap();
    assert_eq!(controller.state(), CurveState::Calculating);
    assert!(!controller.wait(Some(Duration::ZERO)));
    assert!(!controller.wait(Some(Duration::from_millis(20))));

    latch.open();
    assert!(controller.wait(Some(LONG)));
    assert_eq!(controller.state(), CurveState::Ready);
    assert!(controller.wait(Some(Duration::ZERO)));
    assert_eq!(controller.pending_jobs(), 0);
}

#[test]
fn second_generate_supersedes_the_first() {
    let latch = Arc::new(Latch::default());
    let (solver, started) = blocking_solver(Arc::clone(&latch));
    let (_bundle, controller) = controller_with(solver, 1);

    controller.generate(false, None).unwrap();
    assert_eq!(started.recv_timeout(LONG).unwrap(), 1);
    controller.generate(false, None).unwrap();
    assert_eq!(started.recv_timeout(LONG).unwrap(), 2);
    assert_eq!(controller.state(), CurveState::Calculating);

    latch.open();
    assert!(controller.wait(Some(LONG)));
    assert_eq!(controller.state(), CurveState::Ready);
    assert_eq!(controller.table().value(0, MAG), Some(2.0));

    // the superseded job finishing late must not replace the table
    thread::sleep(Duration::from_millis(50));
    assert_eq!(controller.table().value(0, MAG), Some(2.0));
    assert_eq!(controller.table_revision(), 1);
}

#[test]
fn cancel_is_a_noop_unless_calculating() {
    let (_bundle, controller) = controller_with(SyntheticSolver::new(), 2);
    controller.cancel();
    assert_eq!(controller.state(), CurveState::Invalid);

    controller.generate(true, None).unwrap();
    let revision = controller.table_revision();
    controller.cancel();
    assert_eq!(controller.state(), CurveState::Ready);
    assert_eq!(controller.table_revision(), revision);
}

#[test]
fn cancel_while_calculating_discards_the_batch() {
    let latch = Arc::new(Latch::default());
    let (solver, started) = blocking_solver(Arc::clone(&latch));
    let (_bundle, controller) = controller_with(solver, 2);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    controller.on_state_change(move |change| sink.lock().unwrap().push(change.new));

    controller.generate(false, None).unwrap();
    started.recv_timeout(LONG).unwrap();
    controller.cancel();

    assert_eq!(controller.state(), CurveState::Invalid);
    assert!(controller.wait(Some(Duration::ZERO)));

    latch.open();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(controller.state(), CurveState::Invalid);
    assert!(controller.table().is_empty());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            CurveState::Calculating,
            CurveState::Canceling,
            CurveState::Invalid
        ]
    );
}

#[test]
fn change_during_calculation_restarts_with_new_parameters() {
    let latch = Arc::new(Latch::default());
    let (tx, started) = mpsc::channel();
    let tx = Mutex::new(tx);
    let gate = Arc::clone(&latch);
    let solver = move |params: &ParameterSet, _: Option<Duration>| {
        let hlum = params.float("HLUM").unwrap();
        let _ = tx.lock().unwrap().send(hlum);
        gate.wait();
        Ok::<_, SolverError>(endpoints(params, hlum))
    };
    let (_bundle, controller) = controller_with(solver, 1);

    controller.generate(false, None).unwrap();
    assert_eq!(started.recv_timeout(LONG).unwrap(), 12.0);

    controller.parameters().set_value("HLUM", 5.0).unwrap();
    assert_eq!(controller.state(), CurveState::Calculating);
    assert_eq!(started.recv_timeout(LONG).unwrap(), 5.0);

    latch.open();
    assert!(controller.wait(Some(LONG)));
    assert_eq!(controller.state(), CurveState::Ready);
    assert_eq!(controller.table().value(0, MAG), Some(5.0));
}

#[test]
fn only_relevant_changes_invalidate() {
    let (bundle, controller) = controller_with(SyntheticSolver::new(), 2);
    controller.generate(true, None).unwrap();

    let invalidations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invalidations);
    controller.on_state_change(move |change| {
        if change.new == CurveState::Invalid {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    // curve-private: neither the overlay nor the bundle copy matters
    controller.parameters().set_value(PHIN, 0.05).unwrap();
    bundle.set_value(PHIN, 0.02).unwrap();
    // curve-dependent in the bundle is shadowed by the overlay
    bundle.set_value("HLUM", 3.0).unwrap();
    assert_eq!(invalidations.load(Ordering::SeqCst), 0);
    assert_eq!(controller.state(), CurveState::Ready);

    controller.parameters().set_value("HLUM", 3.0).unwrap();
    assert_eq!(invalidations.load(Ordering::SeqCst), 1);
    assert_eq!(controller.state(), CurveState::Invalid);

    controller.generate(true, None).unwrap();
    bundle.set_value("XINCL", 80.0).unwrap();
    assert_eq!(invalidations.load(Ordering::SeqCst), 2);
}

#[test]
fn failed_segment_contributes_no_rows() {
    let solver = |params: &ParameterSet, timeout: Option<Duration>| {
        if params.float(PHSTRT).unwrap() == 0.5 {
            return Err(SolverError::Failed("diverged".to_string()));
        }
        SyntheticSolver::new().solve(params, timeout)
    };
    let (_bundle, controller) = controller_with(solver, 4);

    controller.generate(true, None).unwrap();
    assert_eq!(controller.state(), CurveState::Ready);
    let xs = controller.table().xs();
    assert_eq!(xs.len(), 26 + 25 + 26);
    assert!(xs.iter().all(|&x| x <= 0.5 || x >= 0.75));
}

#[test]
fn timed_out_jobs_are_skipped() {
    let engine = Engine::synthetic(
        EngineConfig {
            default_segments: 2,
            ..EngineConfig::default()
        },
        Some(Duration::from_millis(30)),
    )
    .unwrap();
    let curve = engine.curve(CurveKind::Light, None).unwrap();
    let generator = curve.generator();

    generator
        .generate(true, Some(Duration::from_millis(1)))
        .unwrap();
    assert_eq!(generator.state(), CurveState::Ready);
    assert!(generator.table().is_empty());
    assert_eq!(generator.normalization_coefficient(), 1.0);
}

#[test]
fn late_ready_listener_does_not_open_the_next_batch() {
    let latch = Arc::new(Latch::default());
    let gate = Arc::clone(&latch);
    let calls = AtomicUsize::new(0);
    // first batch finishes at once, later ones block
    let solver = move |params: &ParameterSet, _: Option<Duration>| {
        if calls.fetch_add(1, Ordering::SeqCst) > 0 {
            gate.wait();
        }
        Ok::<_, SolverError>(endpoints(params, 1.0))
    };
    let (_bundle, controller) = controller_with(solver, 1);

    let (tx, ready) = mpsc::channel();
    let tx = Mutex::new(Some(tx));
    controller.on_state_change(move |change| {
        if change.new != CurveState::Ready {
            return;
        }
        if let Some(tx) = tx.lock().unwrap().take() {
            let _ = tx.send(());
            thread::sleep(Duration::from_millis(200));
        }
    });

    controller.generate(false, None).unwrap();
    ready.recv_timeout(LONG).unwrap();
    controller.generate(false, None).unwrap();
    // let the first batch's listener return and try to open the gate
    thread::sleep(Duration::from_millis(400));

    assert_eq!(controller.state(), CurveState::Calculating);
    assert!(!controller.wait(Some(Duration::ZERO)));

    latch.open();
    assert!(controller.wait(Some(LONG)));
    assert_eq!(controller.state(), CurveState::Ready);
}

#[test]
fn listener_may_cancel_from_inside_a_transition() {
    let latch = Arc::new(Latch::default());
    let (solver, _started) = blocking_solver(Arc::clone(&latch));
    let (_bundle, controller) = controller_with(solver, 2);

    let target: Weak<GenerationController> = Arc::downgrade(&controller);
    controller.on_state_change(move |change| {
        if change.new == CurveState::Calculating {
            if let Some(controller) = target.upgrade() {
                controller.cancel();
            }
        }
    });

    let (tx, done) = mpsc::channel();
    let worker = Arc::clone(&controller);
    thread::spawn(move || {
        let _ = tx.send(worker.generate(false, None).is_ok());
    });
    assert!(done.recv_timeout(LONG).unwrap());

    assert_eq!(controller.state(), CurveState::Invalid);
    assert!(controller.wait(Some(Duration::ZERO)));
    assert!(controller.table().is_empty());
    latch.open();
}

#[test]
fn ready_listener_may_start_the_next_generation() {
    let (_bundle, controller) = controller_with(SyntheticSolver::new(), 2);
    let target: Weak<GenerationController> = Arc::downgrade(&controller);
    let restarted = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&restarted);
    controller.on_state_change(move |change| {
        if change.new == CurveState::Ready && count.fetch_add(1, Ordering::SeqCst) == 0 {
            if let Some(controller) = target.upgrade() {
                controller.generate(false, None).unwrap();
            }
        }
    });

    controller.generate(false, None).unwrap();
    let deadline = Instant::now() + LONG;
    while controller.table_revision() < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(controller.wait(Some(LONG)));
    assert_eq!(controller.table_revision(), 2);
    assert_eq!(controller.state(), CurveState::Ready);
}
