//! # Storage Module
//!
//! Contracts for the remote project/phase/milestone/settings store the engine
//! is backed by, plus an in-memory implementation of them.
//!
//! The allocators never talk to storage. The planning service fetches a
//! snapshot through these traits, validates against it, and forwards approved
//! mutations back.

pub mod memory;
pub mod traits;

pub use memory::*;
pub use traits::*;
