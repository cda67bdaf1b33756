//! Model parameters.
//!
//! - parameter values and flag sets (`parameter`, `flags`)
//! - an observable, shared parameter store (`store`)
//! - the typed event bus the store publishes on (`bus`)

pub mod bus;
pub mod flags;
pub mod parameter;
pub mod store;

pub use bus::*;
pub use flags::*;
pub use parameter::*;
pub use store::*;
