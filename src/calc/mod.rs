//! Derived-field calculation for the six-step carbon form.
//!
//! # Core Concepts
//!
//! - [`StepId`]: the six ordered form steps, from raw materials to audit.
//! - [`StepDefinition`]: the fields a step owns and the [`FormulaRule`]s that
//!   fill its derived fields. Rules may read fields of their own step or, via
//!   [`Operand::Prior`], fields of an earlier step.
//! - [`FieldSet`]: a step's form state. Editable fields hold raw user text;
//!   derived fields are only ever written by [`recompute`].
//!
//! Evaluation order is a topological sort of each step's rules, so the order
//! rules are written in does not matter. Recomputation never fails: missing
//! or unparseable inputs count as `0`, and non-finite results (division by a
//! zero area, for instance) are clamped to `0`.

mod field;
mod formulas;
mod recompute;
mod step;

pub use field::*;
pub use recompute::*;
pub use step::*;

use thiserror::Error;

/// Errors raised by the form layer around the calculation graph.
///
/// The calculation itself never errors; these cover edits that cannot be
/// applied and rule sets that cannot be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalcError {
    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("Unknown field {field} in step {step}")]
    UnknownField { step: StepId, field: String },

    #[error("Field {0} is derived and cannot be edited")]
    NotEditable(String),

    #[error("Formula cycle in step {step}: {}", .fields.join(", "))]
    Cycle { step: StepId, fields: Vec<String> },

    #[error("Rule references undeclared field {field} in step {step}")]
    UndeclaredField { step: StepId, field: String },

    #[error("Rule targets editable field {0}")]
    NotDerived(String),

    #[error("More than one rule targets {0}")]
    DuplicateRule(String),

    #[error("Derived field {0} has no rule")]
    MissingRule(String),

    #[error("Rule for {target} in step {step} reads later step {referenced}")]
    ForwardReference {
        step: StepId,
        target: String,
        referenced: StepId,
    },
}
