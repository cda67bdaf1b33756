//! Numerical helpers.

pub mod spline;

pub use spline::*;
