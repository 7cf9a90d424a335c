use std::collections::BTreeMap;

use charge_solver::{ConstraintViolation, ReducedCost};
use serde::Serialize;

use crate::adapter::{BlendStatus, SolvedBlend};
use crate::config::{DisplayUnits, OptimizerConfig};
use crate::error::ChargeError;
use crate::material::TargetRange;
use crate::property::{Composition, EvaluationMode, PropertyModel};
use crate::request::ValidatedRequest;

/// One line of the charge table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialUsage {
    pub name: String,
    /// Mass in the furnace unit
    pub mass: f64,
    /// Mass in the secondary display unit
    pub secondary_mass: f64,
    /// Share of the furnace, percent
    pub share: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlendResult {
    pub materials: Vec<MaterialUsage>,
    pub total_cost: f64,
    pub total_mass: f64,
    /// Element -> mass of that element in the blend
    pub absolute_composition: BTreeMap<String, f64>,
    /// Element -> weight percent in the blend
    pub average_composition: BTreeMap<String, f64>,
    /// Derived property -> value
    pub properties: BTreeMap<String, f64>,
    pub binding_constraints: Vec<String>,
    pub reduced_costs: Vec<ReducedCost>,
}

impl BlendResult {
    /// Average composition of an element or value of a derived property
    pub fn value_of(&self, property: &str) -> Option<f64> {
        self.average_composition
            .get(property)
            .or_else(|| self.properties.get(property))
            .copied()
    }

    pub fn usage(&self, material: &str) -> Option<&MaterialUsage> {
        self.materials.iter().find(|m| m.name == material)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BlendReport {
    pub status: BlendStatus,
    pub mode: EvaluationMode,
    /// Present whenever the status is not optimal
    pub diagnostic: Option<String>,
    pub violations: Vec<ConstraintViolation>,
    pub result: Option<BlendResult>,
    pub units: DisplayUnits,
}

impl BlendReport {
    pub fn is_feasible(&self) -> bool {
        self.status == BlendStatus::Optimal
    }

    /// Targets whose resulting value lies outside the range by more than `tolerance`
    pub fn unmet_targets<'t>(&self, targets: impl IntoIterator<Item = &'t TargetRange>, tolerance: f64) -> Vec<String> {
        let Some(result) = &self.result else {
            return Vec::new();
        };
        targets
            .into_iter()
            .filter(|t| {
                result
                    .value_of(&t.property)
                    .is_some_and(|v| !t.contains(v, tolerance * (1.0 + v.abs())))
            })
            .map(|t| t.property.clone())
            .collect()
    }
}

/// Turns a solver result back into masses, composition and properties
pub struct ResultInterpreter<'a> {
    model: &'a PropertyModel,
    display: &'a DisplayUnits,
}

impl<'a> ResultInterpreter<'a> {
    pub fn new(config: &'a OptimizerConfig) -> Self {
        Self {
            model: &config.property_model,
            display: &config.display,
        }
    }

    pub fn interpret(&self, solved: &SolvedBlend, input: &ValidatedRequest) -> Result<BlendReport, ChargeError> {
        if solved.mode != self.model.mode() {
            return Err(ChargeError::ConventionMismatch {
                built: solved.mode,
                interpreted: self.model.mode(),
            });
        }

        if !solved.is_feasible() {
            return Ok(BlendReport {
                status: solved.status,
                mode: solved.mode,
                diagnostic: Some(solved.diagnostic.clone()),
                violations: solved.violations.clone(),
                result: None,
                units: self.display.clone(),
            });
        }

        let furnace = solved.furnace_size;
        let per_unit = furnace / solved.scale;
        let masses: Vec<f64> = solved.values.iter().map(|v| v * per_unit).collect();

        let physical = Composition::from_blend(&input.materials, &masses, &input.elements);
        let average_composition = physical
            .element_mass
            .iter()
            .map(|(e, mass)| (e.clone(), 100.0 * mass / furnace))
            .collect();

        // Properties are read in the same variable units the rows were built in
        let model_space = Composition::from_blend(&input.materials, &solved.values, &input.elements);
        let properties = self
            .model
            .names()
            .filter_map(|name| {
                self.model
                    .evaluate(name, &model_space)
                    .map(|v| (name.to_string(), v))
            })
            .collect();

        let materials: Vec<MaterialUsage> = input
            .materials
            .iter()
            .zip(&masses)
            .zip(&input.costs)
            .map(|((m, &mass), &cost)| MaterialUsage {
                name: m.name.clone(),
                mass,
                secondary_mass: mass * self.display.secondary_factor,
                share: 100.0 * mass / furnace,
                cost: cost * mass,
            })
            .collect();

        let result = BlendResult {
            total_cost: materials.iter().map(|m| m.cost).sum(),
            total_mass: physical.total_mass,
            absolute_composition: physical.element_mass,
            average_composition,
            properties,
            binding_constraints: solved.binding_constraints.clone(),
            reduced_costs: solved.reduced_costs.clone(),
            materials,
        };

        Ok(BlendReport {
            status: BlendStatus::Optimal,
            mode: solved.mode,
            diagnostic: None,
            violations: Vec::new(),
            result: Some(result),
            units: self.display.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SolverAdapter;
    use crate::builder::ConstraintBuilder;
    use crate::config::BoundUnits;
    use crate::material::RawMaterial;
    use crate::request::ChargeRequest;
    use crate::sample::HARDNESS;

    fn cast_iron() -> ChargeRequest {
        ChargeRequest {
            materials: vec![
                RawMaterial::new("Pig Iron", 42.0).with_element("C", 4.0).with_element("Si", 1.0),
                RawMaterial::new("Steel Scrap", 30.0).with_element("C", 0.2).with_element("Si", 0.3),
                RawMaterial::new("Ferro-Silicon", 120.0).with_element("Si", 75.0),
            ],
            targets: vec![
                TargetRange::new("C", 3.0, 3.5),
                TargetRange::new("Si", 1.8, 2.4),
                TargetRange::new(HARDNESS, 150.0, 200.0),
            ],
            furnace_size: 10.0,
            elements: None,
            bounds: Vec::new(),
        }
    }

    fn run(config: &OptimizerConfig, request: &ChargeRequest) -> (ValidatedRequest, SolvedBlend) {
        let input = request.validate(config).unwrap();
        let lp = ConstraintBuilder::new(config).build(&input);
        let solved = SolverAdapter::new(config.solver.clone()).solve(&lp);
        (input, solved)
    }

    #[test]
    fn test_round_trip_stays_in_range() {
        let config = OptimizerConfig::default();
        let (input, solved) = run(&config, &cast_iron());
        let report = ResultInterpreter::new(&config).interpret(&solved, &input).unwrap();

        assert!(report.is_feasible(), "{:?}", report.diagnostic);
        let result = report.result.as_ref().unwrap();
        assert!((result.total_mass - 10.0).abs() < 1e-6);
        assert!(report.unmet_targets(input.targets(), 1e-6).is_empty());
        assert!((result.total_cost - solved.total_cost).abs() < 1e-6);

        let c = result.value_of("C").unwrap();
        assert!((3.0 - 1e-6..=3.5 + 1e-6).contains(&c), "C = {}", c);
        assert!((result.absolute_composition["C"] - c / 100.0 * 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_presentation_units() {
        let config = OptimizerConfig::default();
        let (input, solved) = run(&config, &cast_iron());
        let report = ResultInterpreter::new(&config).interpret(&solved, &input).unwrap();
        let result = report.result.unwrap();

        for usage in &result.materials {
            assert!((usage.secondary_mass - usage.mass * 1000.0).abs() < 1e-9);
            assert!((usage.share - usage.mass * 10.0).abs() < 1e-9);
        }
        let shares: f64 = result.materials.iter().map(|m| m.share).sum();
        assert!((shares - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_fraction_units_report_physical_masses() {
        let mass = OptimizerConfig::default();
        let fraction = OptimizerConfig::default().with_bound_units(BoundUnits::Fraction);

        let (input, solved) = run(&mass, &cast_iron());
        let by_mass = ResultInterpreter::new(&mass).interpret(&solved, &input).unwrap();
        let (input, solved) = run(&fraction, &cast_iron());
        let by_fraction = ResultInterpreter::new(&fraction).interpret(&solved, &input).unwrap();

        let a = by_mass.result.unwrap();
        let b = by_fraction.result.unwrap();
        assert!((a.total_cost - b.total_cost).abs() < 1e-6, "{} vs {}", a.total_cost, b.total_cost);
        assert!((b.total_mass - 10.0).abs() < 1e-6);
        for (e, v) in &a.average_composition {
            assert!((v - b.average_composition[e]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_infeasible_report_has_no_numbers() {
        let config = OptimizerConfig::default();
        let mut request = cast_iron();
        request.targets = vec![TargetRange::new("C", 5.0, 6.0)];
        let (input, solved) = run(&config, &request);
        let report = ResultInterpreter::new(&config).interpret(&solved, &input).unwrap();

        assert_eq!(report.status, BlendStatus::Infeasible);
        assert!(report.result.is_none());
        assert!(report.diagnostic.is_some());
    }

    #[test]
    fn test_convention_mismatch_is_rejected() {
        let config = OptimizerConfig::default();
        let (input, solved) = run(&config, &cast_iron());

        let other = OptimizerConfig::default().with_mode(EvaluationMode::Absolute);
        let err = ResultInterpreter::new(&other).interpret(&solved, &input).unwrap_err();
        assert!(matches!(
            err,
            ChargeError::ConventionMismatch {
                built: EvaluationMode::Average,
                interpreted: EvaluationMode::Absolute,
            }
        ));
    }
}
