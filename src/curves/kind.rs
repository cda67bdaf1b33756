use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::solver::ResultKind;

/// What a curve synthesizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CurveKind {
    /// Light curve (magnitudes / normalized flux).
    Light,
    /// Radial velocities of both components.
    Velocity,
}

impl CurveKind {
    /// Value of the solver's output type selector (`MPAGE`).
    pub fn mpage(self) -> i64 {
        match self {
            CurveKind::Light => 1,
            CurveKind::Velocity => 2,
        }
    }

    /// Solver table holding this curve's values.
    pub fn result_kind(self) -> ResultKind {
        match self {
            CurveKind::Light => ResultKind::Light,
            CurveKind::Velocity => ResultKind::Veloc,
        }
    }

    /// Dependent columns compared against observations.
    pub fn value_columns(self) -> &'static [&'static str] {
        match self {
            CurveKind::Light => &["mag"],
            CurveKind::Velocity => &["V1", "V2"],
        }
    }
}

impl fmt::Display for CurveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurveKind::Light => f.write_str("light"),
            CurveKind::Velocity => f.write_str("velocity"),
        }
    }
}
