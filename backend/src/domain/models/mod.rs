//! Inputs and outputs of the allocators. Persisted entities live in `shared`.

pub mod milestone;
pub mod phase;

pub use milestone::*;
pub use phase::*;
