//! `wd-curves` library crate.
//!
//! Synthesizes light and radial-velocity curves of a binary system by
//! splitting the phase domain into segments, running one solver job per
//! segment on a worker pool and merging the partial tables.
//!
//! The binary (`wdc`) is a thin wrapper around [`app::run`].

pub mod app;
pub mod cli;
pub mod config;
pub mod curves;
pub mod error;
pub mod io;
pub mod jobs;
pub mod math;
pub mod params;
pub mod report;
pub mod segments;
pub mod solver;
