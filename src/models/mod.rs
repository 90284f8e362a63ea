//! Persisted models for the carbon ledger.
//!
//! # Core Concepts
//!
//! - [`Project`]: a carbon project, the top-level unit a user works on.
//! - [`StepRecord`]: the saved state of one form step of a project, stored as
//!   a flat field-key → value map. Editable inputs are kept as the text the
//!   user typed; derived values are kept as numbers.
//!
//! Field semantics live in [`crate::calc`]; records only carry values.

mod project;
mod step;

pub use project::*;
pub use step::*;
