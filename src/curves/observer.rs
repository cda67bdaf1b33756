//! Translation of parameter changes into curve invalidation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::trace;

use crate::params::{FlagFilter, ParFlags, ParameterChange, ParameterStore, SubscriptionId};

/// Something whose output goes stale when parameters change.
pub trait Invalidate: Send + Sync {
    fn invalidate(&self);
}

/// Keeps one target invalidated on relevant parameter changes.
///
/// Two disjoint subscriptions are held: on the shared bundle, every parameter
/// that is neither curve-dependent nor curve-private; on the curve's own
/// overlay, every curve-dependent parameter. Curve-private bookkeeping values
/// (phase range, step, output selector) never invalidate. Only value changes
/// are observed; toggling `fixed` is ignored.
///
/// The target is held weakly; the subscriptions are removed on
/// [`detach`](ChangeObserver::detach) or drop.
pub struct ChangeObserver {
    bundle: Arc<ParameterStore>,
    overlay: Arc<ParameterStore>,
    bundle_sub: SubscriptionId,
    overlay_sub: SubscriptionId,
    detached: AtomicBool,
}

impl std::fmt::Debug for ChangeObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeObserver")
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl ChangeObserver {
    pub fn attach(
        bundle: Arc<ParameterStore>,
        overlay: Arc<ParameterStore>,
        target: Weak<dyn Invalidate>,
    ) -> Self {
        let on_bundle = target.clone();
        let bundle_sub = bundle.observe(
            FlagFilter::none_of(ParFlags::CURVE_DEP | ParFlags::CURVE_PRIV),
            move |change| forward(&on_bundle, change),
        );
        let overlay_sub = overlay.observe(FlagFilter::all_of(ParFlags::CURVE_DEP), move |change| {
            forward(&target, change)
        });
        Self {
            bundle,
            overlay,
            bundle_sub,
            overlay_sub,
            detached: AtomicBool::new(false),
        }
    }

    pub fn is_attached(&self) -> bool {
        !self.detached.load(Ordering::Acquire)
    }

    /// Remove both subscriptions. Idempotent.
    pub fn detach(&self) {
        if self.detached.swap(true, Ordering::AcqRel) {
            return;
        }
        self.bundle.unobserve(self.bundle_sub);
        self.overlay.unobserve(self.overlay_sub);
    }
}

impl Drop for ChangeObserver {
    fn drop(&mut self) {
        self.detach();
    }
}

fn forward(target: &Weak<dyn Invalidate>, change: &ParameterChange) {
    if change.flags.contains(ParFlags::CURVE_PRIV) {
        return;
    }
    if let Some(target) = target.upgrade() {
        trace!(parameter = %change.name, "invalidating on parameter change");
        target.invalidate();
    }
}
