use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::recompute::{recompute_with_prior, PriorValues};
use super::step::{FieldSpec, StepId};
use super::CalcError;
use crate::numeric::{parse_number, NumberInput};

/// A named scalar quantity belonging to one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub key: String,
    /// User-entered text for editable fields; formatted result for derived ones.
    pub raw_input: String,
    /// `None` until an editable field is parsed or a derived field computed.
    pub numeric_value: Option<f64>,
    pub unit: String,
    pub editable: bool,
    pub precision: u8,
}

impl FieldValue {
    pub fn from_spec(spec: &FieldSpec) -> Self {
        Self {
            key: spec.key.to_string(),
            raw_input: String::new(),
            numeric_value: None,
            unit: spec.unit.to_string(),
            editable: spec.editable,
            precision: spec.precision,
        }
    }

    /// The value formulas read: the cached number, else the parsed input.
    pub fn numeric(&self) -> f64 {
        self.numeric_value
            .unwrap_or_else(|| parse_number(&self.raw_input))
    }
}

/// Field key → value for one step.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// The form state of one step.
///
/// A field set is owned by whichever form or request holds it; other steps only
/// ever see it through a [`PriorValues`] snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSet {
    pub step: StepId,
    pub fields: FieldMap,
}

impl FieldSet {
    /// A fresh form: editable fields empty, derived fields not yet computed.
    pub fn initialize(step: StepId) -> Self {
        let fields = step
            .definition()
            .fields
            .iter()
            .map(|spec| (spec.key.to_string(), FieldValue::from_spec(spec)))
            .collect();
        Self { step, fields }
    }

    /// Build a form from a submitted flat value map.
    ///
    /// Derived keys are accepted and ignored so that a client can send back a
    /// full record; keys the step does not declare are rejected.
    pub fn from_values(
        step: StepId,
        values: &BTreeMap<String, NumberInput>,
    ) -> Result<Self, CalcError> {
        let mut set = Self::initialize(step);
        for (key, value) in values {
            match step.definition().field(key) {
                Some(spec) if spec.editable => set.apply(key, value),
                Some(_) => {}
                None => {
                    return Err(CalcError::UnknownField {
                        step,
                        field: key.clone(),
                    })
                }
            }
        }
        Ok(set)
    }

    /// Rebuild a form from a persisted record, skipping keys that are no
    /// longer declared editable.
    pub fn restore(step: StepId, values: &BTreeMap<String, NumberInput>) -> Self {
        let mut set = Self::initialize(step);
        for (key, value) in values {
            match step.definition().field(key) {
                Some(spec) if spec.editable => set.apply(key, value),
                Some(_) => {}
                None => tracing::warn!(step = %step, field = %key, "Ignoring unknown stored field"),
            }
        }
        set
    }

    fn apply(&mut self, key: &str, value: &NumberInput) {
        if let Some(field) = self.fields.get_mut(key) {
            field.raw_input = value.as_text();
            field.numeric_value = Some(value.value());
        }
    }

    /// Record a user edit of an editable field.
    pub fn set_input(&mut self, key: &str, raw: impl Into<String>) -> Result<(), CalcError> {
        let step = self.step;
        let field = self
            .fields
            .get_mut(key)
            .ok_or_else(|| CalcError::UnknownField {
                step,
                field: key.to_string(),
            })?;
        if !field.editable {
            return Err(CalcError::NotEditable(key.to_string()));
        }
        field.raw_input = raw.into();
        field.numeric_value = Some(parse_number(&field.raw_input));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Numeric value of `key`, `0` when absent or not yet computed.
    pub fn value(&self, key: &str) -> f64 {
        self.fields.get(key).map(FieldValue::numeric).unwrap_or(0.0)
    }

    /// A copy with every derived field recomputed.
    pub fn recompute(&self, prior: &PriorValues) -> Self {
        Self {
            step: self.step,
            fields: recompute_with_prior(self.step, &self.fields, prior),
        }
    }

    /// Numeric value of every field, as later steps see it.
    pub fn numeric_values(&self) -> BTreeMap<String, f64> {
        self.fields
            .iter()
            .map(|(key, field)| (key.clone(), field.numeric()))
            .collect()
    }

    /// Flat persisted shape: editable fields as text, derived fields as numbers.
    pub fn to_values(&self) -> BTreeMap<String, NumberInput> {
        self.fields
            .iter()
            .map(|(key, field)| {
                let value = if field.editable {
                    NumberInput::Text(field.raw_input.clone())
                } else {
                    field
                        .numeric_value
                        .map(NumberInput::Number)
                        .unwrap_or(NumberInput::Null)
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// Fields in the order the step declares them, for tabular display.
    pub fn ordered(&self) -> Vec<&FieldValue> {
        self.step
            .definition()
            .fields
            .iter()
            .filter_map(|spec| self.fields.get(spec.key))
            .collect()
    }
}
