//! Parameter values and parameter sets.
//!
//! A `ParameterSet` is the full model configuration of one binary system
//! (a "bundle"). Sets are cheap to clone; per-segment job snapshots are clones
//! with a handful of overridden values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ParameterError;
use crate::params::flags::{FlagFilter, ParFlags};

/// Output type selector of the solver (1 = light, 2 = radial velocity).
pub const MPAGE: &str = "MPAGE";
/// First phase at which output points are produced.
pub const PHSTRT: &str = "PHSTRT";
/// Last phase at which output points are produced.
pub const PHSTOP: &str = "PHSTOP";
/// Phase increment between output points.
pub const PHIN: &str = "PHIN";
/// Phase of light normalization.
pub const PHN: &str = "PHN";
pub const PERIOD: &str = "PERIOD";
pub const HJD0: &str = "HJD0";
pub const PSHIFT: &str = "PSHIFT";
pub const NOISE: &str = "NOISE";
pub const SEED: &str = "SEED";
pub const STDEV: &str = "STDEV";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
}

impl ParamValue {
    pub fn as_f64(self) -> f64 {
        match self {
            ParamValue::Int(v) => v as f64,
            ParamValue::Float(v) => v,
        }
    }

    /// Integer view; floats are truncated toward zero.
    pub fn as_i64(self) -> i64 {
        match self {
            ParamValue::Int(v) => v,
            ParamValue::Float(v) => v as i64,
        }
    }

    fn type_name(self) -> &'static str {
        match self {
            ParamValue::Int(_) => "integer",
            ParamValue::Float(_) => "float",
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: ParamValue,
    pub flags: ParFlags,
    /// Held constant by fitting runs.
    pub fixed: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<ParamValue>, flags: ParFlags) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            flags,
            fixed: true,
        }
    }

    /// Convert `value` to this parameter's type.
    ///
    /// Float parameters accept integers; integer parameters accept only
    /// integers.
    fn coerce(&self, value: ParamValue) -> Result<ParamValue, ParameterError> {
        match (self.value, value) {
            (ParamValue::Float(_), v) => Ok(ParamValue::Float(v.as_f64())),
            (ParamValue::Int(_), ParamValue::Int(v)) => Ok(ParamValue::Int(v)),
            (ParamValue::Int(_), ParamValue::Float(_)) => Err(ParameterError::WrongType {
                name: self.name.clone(),
                expected: self.value.type_name(),
            }),
        }
    }
}

/// Ordered name -> parameter mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    params: BTreeMap<String, Parameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, param: Parameter) -> Option<Parameter> {
        self.params.insert(param.name.clone(), param)
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.values()
    }

    pub fn value(&self, name: &str) -> Result<ParamValue, ParameterError> {
        self.get(name)
            .map(|p| p.value)
            .ok_or_else(|| ParameterError::Unknown(name.to_string()))
    }

    pub fn float(&self, name: &str) -> Result<f64, ParameterError> {
        self.value(name).map(ParamValue::as_f64)
    }

    pub fn int(&self, name: &str) -> Result<i64, ParameterError> {
        self.value(name).map(ParamValue::as_i64)
    }

    /// Set the value of an existing parameter, returning the previous value.
    pub fn set_value(
        &mut self,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<ParamValue, ParameterError> {
        let param = self
            .params
            .get_mut(name)
            .ok_or_else(|| ParameterError::Unknown(name.to_string()))?;
        let value = param.coerce(value.into())?;
        Ok(std::mem::replace(&mut param.value, value))
    }

    pub fn set_fixed(&mut self, name: &str, fixed: bool) -> Result<bool, ParameterError> {
        let param = self
            .params
            .get_mut(name)
            .ok_or_else(|| ParameterError::Unknown(name.to_string()))?;
        Ok(std::mem::replace(&mut param.fixed, fixed))
    }

    /// Override a value, inserting an output-spec parameter when absent.
    ///
    /// Used for the per-job overrides (`MPAGE`, phase range, phase step),
    /// which must always end up in the snapshot.
    pub fn assign(&mut self, name: &str, value: impl Into<ParamValue>) {
        let value = value.into();
        match self.params.get_mut(name) {
            Some(param) => {
                param.value = param.coerce(value).unwrap_or(value);
            }
            None => {
                self.insert(Parameter::new(name, value, ParFlags::OUTPUT_SPEC | ParFlags::LC));
            }
        }
    }

    /// Clone of the parameters matching `filter`.
    pub fn filtered(&self, filter: &FlagFilter) -> ParameterSet {
        let params = self
            .params
            .iter()
            .filter(|(_, p)| filter.matches(p.flags))
            .map(|(k, p)| (k.clone(), p.clone()))
            .collect();
        ParameterSet { params }
    }

    /// Overlay every parameter of `other` onto this set.
    pub fn update_from(&mut self, other: &ParameterSet) {
        for param in other.iter() {
            self.insert(param.clone());
        }
    }

    /// A detached eclipsing binary with sensible defaults for every parameter
    /// the synthesis engine reads or overrides.
    pub fn default_binary() -> Self {
        use ParFlags as F;

        let model = F::FITTABLE | F::LC | F::DC;
        let curve = F::FITTABLE | F::CURVE_DEP | F::LC | F::DC;
        let output = F::OUTPUT_SPEC | F::LC;

        let mut set = ParameterSet::new();
        for param in [
            Parameter::new(MPAGE, 1_i64, output | F::CURVE_PRIV),
            Parameter::new("JDPHS", 2_i64, F::CONTROLLING | F::LC | F::DC),
            Parameter::new(HJD0, 0.0, model),
            Parameter::new(PERIOD, 1.0, model),
            Parameter::new(PSHIFT, 0.0, model),
            Parameter::new(NOISE, 0_i64, output),
            Parameter::new(SEED, 138_472_375.0, F::CONTROLLING | F::LC),
            Parameter::new(STDEV, 0.0, output),
            Parameter::new(PHSTRT, 0.0, output | F::CURVE_PRIV),
            Parameter::new(PHSTOP, 1.0, output | F::CURVE_PRIV),
            Parameter::new(PHIN, 0.01, output | F::CURVE_PRIV),
            Parameter::new(PHN, 0.25, output),
            Parameter::new("E", 0.0, model),
            Parameter::new("A", 5.0, model),
            Parameter::new("XINCL", 83.0, model),
            Parameter::new("VGA", 0.0, model),
            Parameter::new("RM", 0.9, model),
            Parameter::new("TAVH", 0.60, model),
            Parameter::new("TAVC", 0.55, model),
            Parameter::new("HLUM", 12.0, curve),
            Parameter::new("CLUM", 8.0, curve),
            Parameter::new("XH", 0.6, curve),
            Parameter::new("XC", 0.6, curve),
            Parameter::new("EL3", 0.0, curve),
            Parameter::new("WL", 0.55, F::CURVE_DEP | F::LC | F::DC),
        ] {
            set.insert(param);
        }
        set
    }
}
