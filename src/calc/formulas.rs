//! Built-in field and formula definitions for each form step.
//!
//! Coefficients (`44/28`, `3.664`, the N2O warming potential) are the
//! emissions-accounting constants the form was built around and are applied
//! exactly as written.

use super::step::{FieldSpec, FormulaRule, Operand, StepDefinition, StepId};

/// Mass ratio of N2O to the nitrogen it contains.
const N2O_PER_N: f64 = 44.0 / 28.0;
/// Mass ratio of CO2 to the carbon it contains.
const CO2_PER_C: f64 = 3.664;
/// 100-year global warming potential of N2O.
const GWP_N2O: f64 = 265.0;

/// `numerator / denominator`, or `0` when the denominator is zero.
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

pub(super) fn definition(step: StepId) -> &'static StepDefinition {
    match step {
        StepId::RawMaterials => &RAW_MATERIALS,
        StepId::Fertilizer => &FERTILIZER,
        StepId::LandUseChange => &LAND_USE_CHANGE,
        StepId::Processing => &PROCESSING,
        StepId::Allocation => &ALLOCATION,
        StepId::Audit => &AUDIT,
    }
}

// ============================================================
// Step 1: Raw materials
// ============================================================

static RAW_MATERIALS: StepDefinition = StepDefinition {
    step: StepId::RawMaterials,
    fields: &[
        FieldSpec::input("cultivationArea", "ha", 2),
        FieldSpec::input("cornSeedsAmount", "kg/ha/yr", 2),
        FieldSpec::input("emissionFactorCornSeeds", "kg CO2eq/kg", 3),
        FieldSpec::input("pesticideAmount", "kg/ha/yr", 2),
        FieldSpec::input("emissionFactorPesticide", "kg CO2eq/kg", 3),
        FieldSpec::derived("co2eqEmissionsRawMaterialInputHaYr", "kg CO2eq/ha/yr", 2),
        FieldSpec::derived("co2eqEmissionsRawMaterialInputTFFB", "kg CO2eq/t FFB", 2),
    ],
    rules: &[
        FormulaRule {
            target: "co2eqEmissionsRawMaterialInputHaYr",
            inputs: &[
                Operand::Field("cornSeedsAmount"),
                Operand::Field("emissionFactorCornSeeds"),
                Operand::Field("pesticideAmount"),
                Operand::Field("emissionFactorPesticide"),
            ],
            eval: |v| v[0] * v[1] + v[2] * v[3],
        },
        FormulaRule {
            target: "co2eqEmissionsRawMaterialInputTFFB",
            inputs: &[
                Operand::Field("co2eqEmissionsRawMaterialInputHaYr"),
                Operand::Field("cultivationArea"),
            ],
            eval: |v| ratio(v[0], v[1]),
        },
    ],
};

// ============================================================
// Step 2: Fertilizer
// ============================================================

static FERTILIZER: StepDefinition = StepDefinition {
    step: StepId::Fertilizer,
    fields: &[
        FieldSpec::input("ammoniumNitrate", "kg N/ha/yr", 2),
        FieldSpec::input("urea", "kg N/ha/yr", 2),
        FieldSpec::input("appliedManure", "kg N/ha/yr", 2),
        FieldSpec::input("nContentCropResidue", "kg N/ha/yr", 2),
        FieldSpec::input("emissionFactorAmmoniumNitrate", "kg CO2eq/kg N", 3),
        FieldSpec::input("emissionFactorUrea", "kg CO2eq/kg N", 3),
        FieldSpec::input("emissionFactorDirectN2O", "kg N2O-N/kg N", 4),
        FieldSpec::derived("totalNSyntheticFertilizer", "kg N/ha/yr", 2),
        FieldSpec::derived("co2eqEmissionsFertilizerProduction", "kg CO2eq/ha/yr", 2),
        FieldSpec::derived("directN2OEmissions", "kg N2O/ha/yr", 3),
        FieldSpec::derived("co2eqDirectN2OEmissions", "kg CO2eq/ha/yr", 2),
        FieldSpec::derived("co2eqEmissionsFertilizerHaYr", "kg CO2eq/ha/yr", 2),
        FieldSpec::derived("co2eqEmissionsFertilizerTFFB", "kg CO2eq/t FFB", 2),
    ],
    rules: &[
        FormulaRule {
            target: "totalNSyntheticFertilizer",
            inputs: &[
                Operand::Field("ammoniumNitrate"),
                Operand::Field("urea"),
                Operand::Field("appliedManure"),
                Operand::Field("nContentCropResidue"),
            ],
            eval: |v| v[0] + v[1] + v[2] + v[3],
        },
        FormulaRule {
            target: "co2eqEmissionsFertilizerProduction",
            inputs: &[
                Operand::Field("ammoniumNitrate"),
                Operand::Field("emissionFactorAmmoniumNitrate"),
                Operand::Field("urea"),
                Operand::Field("emissionFactorUrea"),
            ],
            eval: |v| v[0] * v[1] + v[2] * v[3],
        },
        FormulaRule {
            target: "directN2OEmissions",
            inputs: &[
                Operand::Field("totalNSyntheticFertilizer"),
                Operand::Field("appliedManure"),
                Operand::Field("emissionFactorDirectN2O"),
            ],
            eval: |v| (v[0] + v[1]) * v[2] * N2O_PER_N,
        },
        FormulaRule {
            target: "co2eqDirectN2OEmissions",
            inputs: &[Operand::Field("directN2OEmissions")],
            eval: |v| v[0] * GWP_N2O,
        },
        FormulaRule {
            target: "co2eqEmissionsFertilizerHaYr",
            inputs: &[
                Operand::Field("co2eqEmissionsFertilizerProduction"),
                Operand::Field("co2eqDirectN2OEmissions"),
            ],
            eval: |v| v[0] + v[1],
        },
        FormulaRule {
            target: "co2eqEmissionsFertilizerTFFB",
            inputs: &[
                Operand::Field("co2eqEmissionsFertilizerHaYr"),
                Operand::Prior(StepId::RawMaterials, "cultivationArea"),
            ],
            eval: |v| ratio(v[0], v[1]),
        },
    ],
};

// ============================================================
// Step 3: Land use change
// ============================================================

static LAND_USE_CHANGE: StepDefinition = StepDefinition {
    step: StepId::LandUseChange,
    fields: &[
        FieldSpec::input("referenceLandCarbonStock", "t C/ha", 2),
        FieldSpec::input("actualLandCarbonStock", "t C/ha", 2),
        FieldSpec::input("amortisationPeriod", "yr", 0),
        FieldSpec::derived("carbonStockChange", "t C/ha", 2),
        FieldSpec::derived("lucCarbonEmissionsHaYr", "t CO2eq/ha/yr", 3),
        FieldSpec::derived("lucCarbonEmissionsTFFB", "kg CO2eq/t FFB", 2),
    ],
    rules: &[
        FormulaRule {
            target: "carbonStockChange",
            inputs: &[
                Operand::Field("referenceLandCarbonStock"),
                Operand::Field("actualLandCarbonStock"),
            ],
            eval: |v| v[0] - v[1],
        },
        FormulaRule {
            target: "lucCarbonEmissionsHaYr",
            inputs: &[
                Operand::Field("carbonStockChange"),
                Operand::Field("amortisationPeriod"),
            ],
            eval: |v| ratio(v[0] * CO2_PER_C, v[1]),
        },
        // t per ha scaled to kg, then spread over the cultivated area
        FormulaRule {
            target: "lucCarbonEmissionsTFFB",
            inputs: &[
                Operand::Field("lucCarbonEmissionsHaYr"),
                Operand::Prior(StepId::RawMaterials, "cultivationArea"),
            ],
            eval: |v| ratio(v[0] * 1000.0, v[1]),
        },
    ],
};

// ============================================================
// Step 4: Processing
// ============================================================

static PROCESSING: StepDefinition = StepDefinition {
    step: StepId::Processing,
    fields: &[
        FieldSpec::input("ffbProcessed", "t FFB/yr", 2),
        FieldSpec::input("electricityConsumption", "kWh/yr", 2),
        FieldSpec::input("emissionFactorElectricity", "kg CO2eq/kWh", 4),
        FieldSpec::input("dieselConsumption", "l/yr", 2),
        FieldSpec::input("emissionFactorDiesel", "kg CO2eq/l", 4),
        FieldSpec::derived("co2eqElectricity", "kg CO2eq/yr", 2),
        FieldSpec::derived("co2eqDiesel", "kg CO2eq/yr", 2),
        FieldSpec::derived("co2eqProcessingTotal", "kg CO2eq/yr", 2),
        FieldSpec::derived("co2eqProcessingTFFB", "kg CO2eq/t FFB", 2),
    ],
    rules: &[
        FormulaRule {
            target: "co2eqElectricity",
            inputs: &[
                Operand::Field("electricityConsumption"),
                Operand::Field("emissionFactorElectricity"),
            ],
            eval: |v| v[0] * v[1],
        },
        FormulaRule {
            target: "co2eqDiesel",
            inputs: &[
                Operand::Field("dieselConsumption"),
                Operand::Field("emissionFactorDiesel"),
            ],
            eval: |v| v[0] * v[1],
        },
        FormulaRule {
            target: "co2eqProcessingTotal",
            inputs: &[
                Operand::Field("co2eqElectricity"),
                Operand::Field("co2eqDiesel"),
            ],
            eval: |v| v[0] + v[1],
        },
        FormulaRule {
            target: "co2eqProcessingTFFB",
            inputs: &[
                Operand::Field("co2eqProcessingTotal"),
                Operand::Field("ffbProcessed"),
            ],
            eval: |v| ratio(v[0], v[1]),
        },
    ],
};

// ============================================================
// Step 5: Allocation
// ============================================================

static ALLOCATION: StepDefinition = StepDefinition {
    step: StepId::Allocation,
    fields: &[
        FieldSpec::input("crudePalmOilOutput", "t/yr", 2),
        FieldSpec::input("palmKernelOutput", "t/yr", 2),
        FieldSpec::input("energyContentCrudePalmOil", "MJ/kg", 2),
        FieldSpec::input("energyContentPalmKernel", "MJ/kg", 2),
        FieldSpec::derived("energyCrudePalmOil", "GJ/yr", 2),
        FieldSpec::derived("energyPalmKernel", "GJ/yr", 2),
        FieldSpec::derived("allocationFactorCrudePalmOil", "", 4),
        FieldSpec::derived("totalEmissionsTFFB", "kg CO2eq/t FFB", 2),
        FieldSpec::derived("allocatedEmissionsCrudePalmOil", "kg CO2eq/t FFB", 2),
    ],
    rules: &[
        FormulaRule {
            target: "energyCrudePalmOil",
            inputs: &[
                Operand::Field("crudePalmOilOutput"),
                Operand::Field("energyContentCrudePalmOil"),
            ],
            eval: |v| v[0] * v[1],
        },
        FormulaRule {
            target: "energyPalmKernel",
            inputs: &[
                Operand::Field("palmKernelOutput"),
                Operand::Field("energyContentPalmKernel"),
            ],
            eval: |v| v[0] * v[1],
        },
        FormulaRule {
            target: "allocationFactorCrudePalmOil",
            inputs: &[
                Operand::Field("energyCrudePalmOil"),
                Operand::Field("energyPalmKernel"),
            ],
            eval: |v| ratio(v[0], v[0] + v[1]),
        },
        FormulaRule {
            target: "totalEmissionsTFFB",
            inputs: &[
                Operand::Prior(StepId::RawMaterials, "co2eqEmissionsRawMaterialInputTFFB"),
                Operand::Prior(StepId::Fertilizer, "co2eqEmissionsFertilizerTFFB"),
                Operand::Prior(StepId::LandUseChange, "lucCarbonEmissionsTFFB"),
                Operand::Prior(StepId::Processing, "co2eqProcessingTFFB"),
            ],
            eval: |v| v[0] + v[1] + v[2] + v[3],
        },
        FormulaRule {
            target: "allocatedEmissionsCrudePalmOil",
            inputs: &[
                Operand::Field("totalEmissionsTFFB"),
                Operand::Field("allocationFactorCrudePalmOil"),
            ],
            eval: |v| v[0] * v[1],
        },
    ],
};

// ============================================================
// Step 6: Audit
// ============================================================

static AUDIT: StepDefinition = StepDefinition {
    step: StepId::Audit,
    fields: &[
        FieldSpec::input("oilExtractionRate", "t CPO/t FFB", 4),
        FieldSpec::input("fossilFuelComparator", "g CO2eq/MJ", 2),
        FieldSpec::derived("energyPerTonneFFB", "MJ/t FFB", 2),
        FieldSpec::derived("ghgIntensity", "g CO2eq/MJ", 2),
        FieldSpec::derived("ghgSavings", "%", 2),
    ],
    rules: &[
        FormulaRule {
            target: "energyPerTonneFFB",
            inputs: &[
                Operand::Field("oilExtractionRate"),
                Operand::Prior(StepId::Allocation, "energyContentCrudePalmOil"),
            ],
            eval: |v| v[0] * v[1] * 1000.0,
        },
        FormulaRule {
            target: "ghgIntensity",
            inputs: &[
                Operand::Prior(StepId::Allocation, "allocatedEmissionsCrudePalmOil"),
                Operand::Field("energyPerTonneFFB"),
            ],
            eval: |v| ratio(v[0] * 1000.0, v[1]),
        },
        FormulaRule {
            target: "ghgSavings",
            inputs: &[
                Operand::Field("fossilFuelComparator"),
                Operand::Field("ghgIntensity"),
            ],
            eval: |v| ratio((v[0] - v[1]) * 100.0, v[0]),
        },
    ],
};
