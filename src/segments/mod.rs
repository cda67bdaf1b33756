//! Partition of the phase domain into independently computed segments.

pub mod table;

pub use table::*;
