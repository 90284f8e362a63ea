use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{formulas, CalcError};

/// One of the six ordered stages of the carbon-accounting form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    RawMaterials,
    Fertilizer,
    LandUseChange,
    Processing,
    Allocation,
    Audit,
}

impl StepId {
    /// All steps in form order.
    pub const ALL: [StepId; 6] = [
        Self::RawMaterials,
        Self::Fertilizer,
        Self::LandUseChange,
        Self::Processing,
        Self::Allocation,
        Self::Audit,
    ];

    pub fn number(&self) -> u8 {
        match self {
            Self::RawMaterials => 1,
            Self::Fertilizer => 2,
            Self::LandUseChange => 3,
            Self::Processing => 4,
            Self::Allocation => 5,
            Self::Audit => 6,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RawMaterials => "raw_materials",
            Self::Fertilizer => "fertilizer",
            Self::LandUseChange => "land_use_change",
            Self::Processing => "processing",
            Self::Allocation => "allocation",
            Self::Audit => "audit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.as_str() == s)
    }

    /// Resolve a step from its number (`"2"`) or its name (`"fertilizer"`).
    pub fn parse(s: &str) -> Result<Self, CalcError> {
        s.parse::<u8>()
            .ok()
            .and_then(Self::from_number)
            .or_else(|| Self::from_str(s))
            .ok_or_else(|| CalcError::UnknownStep(s.to_string()))
    }

    /// Human-readable title shown as the form tab label.
    pub fn title(&self) -> &'static str {
        match self {
            Self::RawMaterials => "Raw Materials",
            Self::Fertilizer => "Fertilizer",
            Self::LandUseChange => "Land Use Change",
            Self::Processing => "Processing",
            Self::Allocation => "Allocation",
            Self::Audit => "Audit",
        }
    }

    pub fn definition(&self) -> &'static StepDefinition {
        formulas::definition(*self)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static metadata for one form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub key: &'static str,
    /// Display only; never used in computation.
    pub unit: &'static str,
    pub editable: bool,
    /// Display decimal places.
    pub precision: u8,
}

impl FieldSpec {
    pub const fn input(key: &'static str, unit: &'static str, precision: u8) -> Self {
        Self {
            key,
            unit,
            editable: true,
            precision,
        }
    }

    pub const fn derived(key: &'static str, unit: &'static str, precision: u8) -> Self {
        Self {
            key,
            unit,
            editable: false,
            precision,
        }
    }
}

/// A value a formula reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// A field of the step that owns the rule.
    Field(&'static str),
    /// A field of an earlier step, read from its computed snapshot.
    Prior(StepId, &'static str),
}

/// Computes one derived field from its operands.
///
/// `eval` receives the operand values in the order of `inputs`.
#[derive(Clone, Copy, Serialize)]
pub struct FormulaRule {
    pub target: &'static str,
    pub inputs: &'static [Operand],
    #[serde(skip)]
    pub eval: fn(&[f64]) -> f64,
}

impl fmt::Debug for FormulaRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormulaRule")
            .field("target", &self.target)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// The fields and formulas owned by one step.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StepDefinition {
    pub step: StepId,
    pub fields: &'static [FieldSpec],
    pub rules: &'static [FormulaRule],
}

impl StepDefinition {
    pub fn field(&self, key: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Rule indices in dependency-first order.
    ///
    /// Kahn's algorithm; among rules that are ready at the same time the one
    /// declared first runs first.
    pub fn evaluation_order(&self) -> Result<Vec<usize>, CalcError> {
        let rules = self.rules;
        let producers: HashMap<&str, usize> = rules
            .iter()
            .enumerate()
            .map(|(i, rule)| (rule.target, i))
            .collect();

        let mut in_degree = vec![0usize; rules.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); rules.len()];
        for (i, rule) in rules.iter().enumerate() {
            for operand in rule.inputs {
                if let Operand::Field(key) = operand {
                    if let Some(&producer) = producers.get(key) {
                        in_degree[i] += 1;
                        dependents[producer].push(i);
                    }
                }
            }
        }

        let mut ready: BTreeSet<usize> = (0..rules.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(rules.len());

        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < rules.len() {
            let fields = (0..rules.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| rules[i].target.to_string())
                .collect();
            return Err(CalcError::Cycle {
                step: self.step,
                fields,
            });
        }

        Ok(order)
    }

    /// Check that the rules are well formed against the declared fields.
    pub fn validate(&self) -> Result<(), CalcError> {
        let mut targets = BTreeSet::new();
        for rule in self.rules {
            let spec = self
                .field(rule.target)
                .ok_or_else(|| CalcError::UndeclaredField {
                    step: self.step,
                    field: rule.target.to_string(),
                })?;
            if spec.editable {
                return Err(CalcError::NotDerived(rule.target.to_string()));
            }
            if !targets.insert(rule.target) {
                return Err(CalcError::DuplicateRule(rule.target.to_string()));
            }

            for operand in rule.inputs {
                match *operand {
                    Operand::Field(key) => {
                        if self.field(key).is_none() {
                            return Err(CalcError::UndeclaredField {
                                step: self.step,
                                field: key.to_string(),
                            });
                        }
                    }
                    Operand::Prior(step, key) => {
                        if step >= self.step {
                            return Err(CalcError::ForwardReference {
                                step: self.step,
                                target: rule.target.to_string(),
                                referenced: step,
                            });
                        }
                        if step.definition().field(key).is_none() {
                            return Err(CalcError::UndeclaredField {
                                step,
                                field: key.to_string(),
                            });
                        }
                    }
                }
            }
        }

        if let Some(orphan) = self
            .fields
            .iter()
            .find(|f| !f.editable && !targets.contains(f.key))
        {
            return Err(CalcError::MissingRule(orphan.key.to_string()));
        }

        self.evaluation_order().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static CHAIN_FIELDS: &[FieldSpec] = &[
        FieldSpec::input("a", "", 2),
        FieldSpec::derived("c", "", 2),
        FieldSpec::derived("b", "", 2),
        FieldSpec::derived("d", "", 2),
    ];

    // declared out of dependency order on purpose
    static CHAIN_RULES: &[FormulaRule] = &[
        FormulaRule {
            target: "c",
            inputs: &[Operand::Field("b")],
            eval: |v| v[0] + 1.0,
        },
        FormulaRule {
            target: "b",
            inputs: &[Operand::Field("a")],
            eval: |v| v[0] * 2.0,
        },
        FormulaRule {
            target: "d",
            inputs: &[Operand::Field("a")],
            eval: |v| v[0],
        },
    ];

    static CYCLE_FIELDS: &[FieldSpec] = &[
        FieldSpec::derived("x", "", 0),
        FieldSpec::derived("y", "", 0),
    ];

    static CYCLE_RULES: &[FormulaRule] = &[
        FormulaRule {
            target: "x",
            inputs: &[Operand::Field("y")],
            eval: |v| v[0],
        },
        FormulaRule {
            target: "y",
            inputs: &[Operand::Field("x")],
            eval: |v| v[0],
        },
    ];

    static FORWARD_RULES: &[FormulaRule] = &[FormulaRule {
        target: "x",
        inputs: &[Operand::Prior(StepId::Audit, "ghgSavings")],
        eval: |v| v[0],
    }];

    #[test]
    fn step_numbers_round_trip() {
        for step in StepId::ALL {
            assert_eq!(StepId::from_number(step.number()), Some(step));
            assert_eq!(StepId::from_str(step.as_str()), Some(step));
        }
        assert_eq!(StepId::from_number(0), None);
        assert_eq!(StepId::from_number(7), None);
    }

    #[test]
    fn parse_accepts_numbers_and_names() {
        assert_eq!(StepId::parse("2").unwrap(), StepId::Fertilizer);
        assert_eq!(StepId::parse("audit").unwrap(), StepId::Audit);
        assert!(StepId::parse("9").is_err());
        assert!(StepId::parse("harvest").is_err());
    }

    #[test]
    fn dependencies_run_first_and_ties_keep_declaration_order() {
        let definition = StepDefinition {
            step: StepId::RawMaterials,
            fields: CHAIN_FIELDS,
            rules: CHAIN_RULES,
        };
        // b and d are both ready at the start; b was declared before d.
        assert_eq!(definition.evaluation_order().unwrap(), vec![1, 0, 2]);
    }

    #[test]
    fn cycles_are_reported() {
        let definition = StepDefinition {
            step: StepId::Processing,
            fields: CYCLE_FIELDS,
            rules: CYCLE_RULES,
        };
        match definition.evaluation_order() {
            Err(CalcError::Cycle { step, fields }) => {
                assert_eq!(step, StepId::Processing);
                assert_eq!(fields, vec!["x".to_string(), "y".to_string()]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn forward_references_are_rejected() {
        let definition = StepDefinition {
            step: StepId::Processing,
            fields: &CYCLE_FIELDS[..1],
            rules: FORWARD_RULES,
        };
        assert!(matches!(
            definition.validate(),
            Err(CalcError::ForwardReference { .. })
        ));
    }

    #[test]
    fn builtin_definitions_are_valid() {
        for step in StepId::ALL {
            let definition = step.definition();
            assert_eq!(definition.step, step);
            definition
                .validate()
                .unwrap_or_else(|e| panic!("{} is invalid: {}", step, e));
        }
    }
}
