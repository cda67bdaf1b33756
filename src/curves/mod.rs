//! Curves: result tables, segmented generation and observed data.
//!
//! The generation engine is [`GenerationController`]: it splits the phase
//! domain per [`SegmentTable`](crate::segments::SegmentTable), runs one
//! solver job per segment, waits on a [`CompletionGate`] and publishes the
//! merged table. [`ChangeObserver`] keeps it invalidated on parameter
//! changes.

pub mod cache;
pub mod controller;
pub mod curve;
pub mod gate;
pub mod kind;
pub mod merge;
pub mod observed;
pub mod observer;
pub mod table;
pub mod transform;

pub use cache::*;
pub use controller::*;
pub use curve::*;
pub use gate::*;
pub use kind::*;
pub use merge::*;
pub use observed::*;
pub use observer::*;
pub use table::*;
pub use transform::*;
