use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calc::{FieldMap, PriorValues, StepId};
use crate::numeric::{NumberInput, RoundingMode};

/// Flat field-key → value map, the persisted shape of a step.
pub type StepValues = BTreeMap<String, NumberInput>;

/// The saved state of one step of a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub project_id: Uuid,
    pub step: StepId,
    pub values: StepValues,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for saving one step. Derived keys may be present and are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveStepInput {
    pub values: StepValues,
}

/// One entry of a bulk save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkStepEntry {
    pub step: StepId,
    #[serde(default)]
    pub values: StepValues,
}

/// Input for saving several steps of a project at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkSaveStepsInput {
    pub steps: Vec<BulkStepEntry>,
}

/// A step as returned to clients: record metadata plus recomputed fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResponse {
    pub project_id: Uuid,
    pub step: StepId,
    pub number: u8,
    pub title: String,
    pub fields: FieldMap,
    pub updated_at: DateTime<Utc>,
}

/// Input for stateless recomputation of a step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecomputeInput {
    #[serde(default)]
    pub values: StepValues,
    /// Earlier steps' values. Missing steps read as zeros.
    #[serde(default)]
    pub prior: PriorValues,
}

/// Input for normalizing a human-entered number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseNumberInput {
    #[serde(default)]
    pub input: NumberInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseNumberResponse {
    pub value: f64,
}

/// Input for formatting a number for display.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormatNumberInput {
    /// `null` formats as `"0"`.
    pub value: Option<f64>,
    #[serde(default)]
    pub decimals: u32,
    #[serde(default)]
    pub mode: RoundingMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatNumberResponse {
    pub text: String,
}
