//! PrepGate Common - Shared types for the usage-governance core
//!
//! Every crate in the workspace speaks the same error language: the
//! taxonomy in [`error`] distinguishes caller mistakes (unknown tier,
//! unknown feature), expected throttling, and transient store failures,
//! so the HTTP layer can map each onto the right status code.

#![warn(missing_docs)]

pub mod error;

pub use error::{PrepError, PrepResult};
