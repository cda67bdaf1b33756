//! Worker pool running solver jobs.

pub mod dispatcher;
pub mod handle;

pub use dispatcher::*;
pub use handle::*;
