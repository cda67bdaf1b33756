//! A curve: observed values next to their synthesized counterpart.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::curves::controller::{ControllerOptions, CurveState, GenerationController};
use crate::curves::kind::CurveKind;
use crate::curves::observed::ObservedValues;
use crate::curves::table::ResultTable;
use crate::error::SegmentError;
use crate::jobs::JobDispatcher;
use crate::params::{ParameterStore, SubscriptionId, HJD0, PERIOD};

/// Observed data and generation of one curve of a binary system.
///
/// The observed side follows the system's `PERIOD` and `HJD0` (phasing)
/// and, whenever a synthesized light curve becomes ready, its
/// normalization coefficient (weighting). Dropping the curve detaches it
/// from the parameter bundle and cancels any running generation.
pub struct Curve {
    observed: Arc<Mutex<ObservedValues>>,
    generator: Arc<GenerationController>,
    ephemeris_sub: SubscriptionId,
    state_sub: SubscriptionId,
}

impl std::fmt::Debug for Curve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Curve")
            .field("generator", &self.generator)
            .finish_non_exhaustive()
    }
}

impl Curve {
    pub fn new(
        kind: CurveKind,
        dispatcher: Arc<JobDispatcher>,
        bundle: Arc<ParameterStore>,
        options: ControllerOptions,
        observations: ResultTable,
    ) -> Result<Self, SegmentError> {
        let generator = GenerationController::new(kind, dispatcher, Arc::clone(&bundle), options)?;

        let mut observed = ObservedValues::new(observations, kind.value_columns());
        let (period, hjd0) = (bundle.float(PERIOD).ok(), bundle.float(HJD0).ok());
        observed.update_phaser(|p| {
            p.period = period;
            p.hjd0 = hjd0.unwrap_or(0.0);
        });
        let observed = Arc::new(Mutex::new(observed));

        let target = Arc::downgrade(&observed);
        let ephemeris_sub = bundle.observe_names(&[PERIOD, HJD0], move |change| {
            let Some(observed) = target.upgrade() else {
                return;
            };
            let value = change.new.as_f64();
            let mut observed = observed.lock().unwrap_or_else(PoisonError::into_inner);
            observed.update_phaser(|p| match change.name.as_str() {
                PERIOD => p.period = Some(value),
                _ => p.hjd0 = value,
            });
        });

        let target = Arc::downgrade(&observed);
        let source = Arc::downgrade(&generator);
        let state_sub = generator.on_state_change(move |change| {
            if change.new != CurveState::Ready {
                return;
            }
            let (Some(observed), Some(generator)) = (target.upgrade(), source.upgrade()) else {
                return;
            };
            let ratio = generator.normalization_coefficient();
            let mut observed = observed.lock().unwrap_or_else(PoisonError::into_inner);
            if observed.update_weigher(|w| w.normalization_ratio = ratio) {
                debug!(ratio, "light normalization ratio updated");
            }
        });

        Ok(Self {
            observed,
            generator,
            ephemeris_sub,
            state_sub,
        })
    }

    pub fn kind(&self) -> CurveKind {
        self.generator.kind()
    }

    pub fn generator(&self) -> &Arc<GenerationController> {
        &self.generator
    }

    pub fn observed(&self) -> MutexGuard<'_, ObservedValues> {
        self.observed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Synthesized values at the phases of the observations.
    ///
    /// Empty when nothing has been generated yet.
    pub fn synthetic_at_observations(&self) -> ResultTable {
        let synthetic = self.generator.table();
        if synthetic.is_empty() {
            return ResultTable::empty(synthetic.indep());
        }
        let phases = self.observed().table().xs();
        let mut values = ObservedValues::new(synthetic.as_ref().clone(), self.kind().value_columns());
        values.values_at(&phases)
    }
}

impl Drop for Curve {
    fn drop(&mut self) {
        self.generator.bundle().unobserve(self.ephemeris_sub);
        self.generator.remove_state_listener(self.state_sub);
        self.generator.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curves::transform::{HJD, MAG};
    use crate::jobs::LC_JOB;
    use crate::params::ParameterSet;
    use crate::solver::SyntheticSolver;

    fn curve(kind: CurveKind) -> (Arc<ParameterStore>, Curve) {
        let dispatcher = Arc::new(
            JobDispatcher::new(2)
                .unwrap()
                .with_executor(LC_JOB, SyntheticSolver::new()),
        );
        let bundle = Arc::new(ParameterStore::new(ParameterSet::default_binary()));
        let mut observations = ResultTable::new(HJD, [MAG]);
        for i in 0..10 {
            observations.push(i as f64 * 0.3, vec![10.0]);
        }
        let curve = Curve::new(
            kind,
            dispatcher,
            Arc::clone(&bundle),
            ControllerOptions::default(),
            observations,
        )
        .unwrap();
        (bundle, curve)
    }

    #[test]
    fn phaser_follows_ephemeris() {
        let (bundle, curve) = curve(CurveKind::Light);
        assert_eq!(curve.observed().phaser().period, Some(1.0));
        bundle.set_value(PERIOD, 2.5).unwrap();
        bundle.set_value(HJD0, 0.1).unwrap();
        let observed = curve.observed();
        assert_eq!(observed.phaser().period, Some(2.5));
        assert_eq!(observed.phaser().hjd0, 0.1);
    }

    #[test]
    fn ready_light_curve_updates_weigher() {
        let (_bundle, curve) = curve(CurveKind::Light);
        curve.generator().generate(true, None).unwrap();
        let expected = curve.generator().normalization_coefficient();
        assert!(expected > 1.0);
        assert_eq!(curve.observed().weigher().normalization_ratio, expected);
    }

    #[test]
    fn synthetic_values_at_observed_phases() {
        let (_bundle, curve) = curve(CurveKind::Light);
        assert!(curve.synthetic_at_observations().is_empty());
        curve.generator().generate(true, None).unwrap();
        let synthetic = curve.synthetic_at_observations();
        assert_eq!(synthetic.len(), 10);
        assert!(synthetic.column(MAG).unwrap().iter().all(|m| m.is_finite()));
    }

    #[test]
    fn drop_detaches_from_bundle() {
        let (bundle, curve) = curve(CurveKind::Velocity);
        assert_eq!(bundle.observer_count(), 2);
        drop(curve);
        assert_eq!(bundle.observer_count(), 0);
    }
}
