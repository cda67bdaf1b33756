//! Observable parameter store shared between curves.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::error::ParameterError;
use crate::params::bus::{EventBus, SubscriptionId};
use crate::params::flags::{FlagFilter, ParFlags};
use crate::params::parameter::{ParamValue, Parameter, ParameterSet};

/// Which attribute of a parameter changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeTopic {
    Value,
    Fixed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterChange {
    pub name: String,
    pub flags: ParFlags,
    pub old: ParamValue,
    pub new: ParamValue,
    pub fixed: bool,
}

/// A [`ParameterSet`] behind a lock, publishing every effective mutation.
///
/// Notifications are published after the write lock is released; handlers
/// may read the store.
#[derive(Debug, Default)]
pub struct ParameterStore {
    params: RwLock<ParameterSet>,
    bus: EventBus<ChangeTopic, ParameterChange>,
}

impl ParameterStore {
    pub fn new(params: ParameterSet) -> Self {
        Self {
            params: RwLock::new(params),
            bus: EventBus::new(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ParameterSet> {
        self.params.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ParameterSet> {
        self.params.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Detached copy of the whole set.
    pub fn snapshot(&self) -> ParameterSet {
        self.read().clone()
    }

    pub fn filtered(&self, filter: &FlagFilter) -> ParameterSet {
        self.read().filtered(filter)
    }

    pub fn get(&self, name: &str) -> Option<Parameter> {
        self.read().get(name).cloned()
    }

    pub fn value(&self, name: &str) -> Result<ParamValue, ParameterError> {
        self.read().value(name)
    }

    pub fn float(&self, name: &str) -> Result<f64, ParameterError> {
        self.read().float(name)
    }

    /// Set a value; returns `true` (and notifies) only when it changed.
    pub fn set_value(&self, name: &str, value: impl Into<ParamValue>) -> Result<bool, ParameterError> {
        let change = {
            let mut params = self.write();
            let old = params.set_value(name, value)?;
            let Some(param) = params.get(name) else {
                return Err(ParameterError::Unknown(name.to_string()));
            };
            if param.value == old {
                return Ok(false);
            }
            ParameterChange {
                name: param.name.clone(),
                flags: param.flags,
                old,
                new: param.value,
                fixed: param.fixed,
            }
        };
        let delivered = self.bus.publish(ChangeTopic::Value, &change);
        debug!(parameter = %change.name, old = %change.old, new = %change.new, delivered, "parameter value changed");
        Ok(true)
    }

    pub fn set_fixed(&self, name: &str, fixed: bool) -> Result<bool, ParameterError> {
        let change = {
            let mut params = self.write();
            let old = params.set_fixed(name, fixed)?;
            if old == fixed {
                return Ok(false);
            }
            let Some(param) = params.get(name) else {
                return Err(ParameterError::Unknown(name.to_string()));
            };
            ParameterChange {
                name: param.name.clone(),
                flags: param.flags,
                old: param.value,
                new: param.value,
                fixed,
            }
        };
        self.bus.publish(ChangeTopic::Fixed, &change);
        Ok(true)
    }

    /// Observe value changes of parameters matching `filter`.
    pub fn observe(
        &self,
        filter: FlagFilter,
        handler: impl Fn(&ParameterChange) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.bus
            .subscribe(ChangeTopic::Value, move |c: &ParameterChange| filter.matches(c.flags), handler)
    }

    /// Observe value changes of the named parameters.
    pub fn observe_names(
        &self,
        names: &[&str],
        handler: impl Fn(&ParameterChange) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        self.bus.subscribe(
            ChangeTopic::Value,
            move |c: &ParameterChange| names.iter().any(|n| *n == c.name),
            handler,
        )
    }

    pub fn observe_topic(
        &self,
        topic: ChangeTopic,
        filter: FlagFilter,
        handler: impl Fn(&ParameterChange) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.bus
            .subscribe(topic, move |c: &ParameterChange| filter.matches(c.flags), handler)
    }

    pub fn unobserve(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn observer_count(&self) -> usize {
        self.bus.subscriber_count()
    }
}
