//! Solver abstraction.
//!
//! A solver turns one parameter snapshot into named result tables. The real
//! synthesis program is external; [`SyntheticSolver`] is an in-process
//! analytic stand-in.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::curves::ResultTable;
use crate::error::SolverError;
use crate::params::ParameterSet;

pub mod synthetic;

pub use synthetic::*;

/// Synchronous curve synthesis for one parameter snapshot.
pub trait Solver: Send + Sync {
    fn solve(
        &self,
        params: &ParameterSet,
        timeout: Option<Duration>,
    ) -> Result<SolverOutput, SolverError>;
}

impl<F> Solver for F
where
    F: Fn(&ParameterSet, Option<Duration>) -> Result<SolverOutput, SolverError> + Send + Sync,
{
    fn solve(
        &self,
        params: &ParameterSet,
        timeout: Option<Duration>,
    ) -> Result<SolverOutput, SolverError> {
        self(params, timeout)
    }
}

/// Names of the tables a solver run may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Light,
    Veloc,
    Spect,
    Relat,
    Image,
}

impl ResultKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultKind::Light => "light",
            ResultKind::Veloc => "veloc",
            ResultKind::Spect => "spect",
            ResultKind::Relat => "relat",
            ResultKind::Image => "image",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tables produced by one solver run. A missing kind was not produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolverOutput {
    tables: BTreeMap<ResultKind, ResultTable>,
}

impl SolverOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: ResultKind, table: ResultTable) -> Self {
        self.insert(kind, table);
        self
    }

    pub fn insert(&mut self, kind: ResultKind, table: ResultTable) -> Option<ResultTable> {
        self.tables.insert(kind, table)
    }

    pub fn get(&self, kind: ResultKind) -> Option<&ResultTable> {
        self.tables.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ResultKind> + '_ {
        self.tables.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
