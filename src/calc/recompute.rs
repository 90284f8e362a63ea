use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::field::{FieldMap, FieldSet, FieldValue};
use super::step::{Operand, StepDefinition, StepId};
use crate::numeric::{format_number, RoundingMode};

/// Read-only numeric snapshot of earlier steps, keyed by step then field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorValues {
    steps: BTreeMap<StepId, BTreeMap<String, f64>>,
}

impl PriorValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `key` in `step`, `0` when the step or field is missing.
    pub fn get(&self, step: StepId, key: &str) -> f64 {
        self.steps
            .get(&step)
            .and_then(|fields| fields.get(key))
            .copied()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }

    pub fn insert_step(&mut self, step: StepId, values: BTreeMap<String, f64>) {
        self.steps.insert(step, values);
    }

    pub fn with_step(mut self, step: StepId, values: BTreeMap<String, f64>) -> Self {
        self.insert_step(step, values);
        self
    }
}

/// Recompute every derived field of `step` with no earlier-step data.
///
/// Operands that refer to earlier steps read as `0`.
pub fn recompute(step: StepId, fields: &FieldMap) -> FieldMap {
    recompute_with_prior(step, fields, &PriorValues::default())
}

/// Recompute every derived field of `step` in dependency order.
///
/// Editable fields are returned untouched. Each derived field gets its new
/// numeric value and a `raw_input` formatted at the field's precision.
pub fn recompute_with_prior(step: StepId, fields: &FieldMap, prior: &PriorValues) -> FieldMap {
    evaluate(step.definition(), fields, prior)
}

/// A definition whose rules form a cycle is evaluated in declaration order;
/// operands not yet computed read as `0`.
fn evaluate(definition: &StepDefinition, fields: &FieldMap, prior: &PriorValues) -> FieldMap {
    let step = definition.step;
    let order = match definition.evaluation_order() {
        Ok(order) => order,
        Err(e) => {
            tracing::warn!("{}; evaluating in declaration order", e);
            (0..definition.rules.len()).collect()
        }
    };

    let mut values: HashMap<&str, f64> = definition
        .fields
        .iter()
        .filter(|spec| spec.editable)
        .map(|spec| {
            let value = fields.get(spec.key).map(FieldValue::numeric).unwrap_or(0.0);
            (spec.key, value)
        })
        .collect();

    let mut out = fields.clone();
    for index in order {
        let rule = &definition.rules[index];
        let args: Vec<f64> = rule
            .inputs
            .iter()
            .map(|operand| match *operand {
                Operand::Field(key) => values.get(key).copied().unwrap_or(0.0),
                Operand::Prior(step, key) => prior.get(step, key),
            })
            .map(finite_or_zero)
            .collect();

        let value = finite_or_zero((rule.eval)(&args));
        values.insert(rule.target, value);

        let field = out.entry(rule.target.to_string()).or_insert_with(|| {
            definition
                .field(rule.target)
                .map(FieldValue::from_spec)
                .unwrap_or_else(|| FieldValue {
                    key: rule.target.to_string(),
                    raw_input: String::new(),
                    numeric_value: None,
                    unit: String::new(),
                    editable: false,
                    precision: 2,
                })
        });
        field.numeric_value = Some(value);
        field.raw_input = format_number(value, u32::from(field.precision), RoundingMode::Round);
    }

    tracing::debug!(step = %step, rules = definition.rules.len(), "Recomputed derived fields");
    out
}

/// Recompute a whole project's steps in form order.
///
/// Each step's values, once recomputed, become part of the prior snapshot of
/// every later step. Steps missing from `inputs` contribute zeros and are
/// left out of the result.
pub fn recompute_project(inputs: &BTreeMap<StepId, FieldMap>) -> BTreeMap<StepId, FieldMap> {
    let mut prior = PriorValues::new();
    let mut out = BTreeMap::new();

    for step in StepId::ALL {
        let Some(fields) = inputs.get(&step) else {
            continue;
        };
        let set = FieldSet {
            step,
            fields: recompute_with_prior(step, fields, &prior),
        };
        prior.insert_step(step, set.numeric_values());
        out.insert(step, set.fields);
    }

    out
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
