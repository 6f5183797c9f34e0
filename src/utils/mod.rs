//! Utility modules

pub mod address_space;

pub use address_space::{AddressSequence, AddressSpaceExpander, AddressSpaceSpec};
