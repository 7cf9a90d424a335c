//! The build → solve → interpret pipeline and the relaxation state machine.
//!
//! Each call to [`ChargeMixOptimizer::optimize`] makes an exact attempt
//! first. When that attempt is infeasible and relaxation is enabled, every
//! target range is widened once and the pipeline runs a second and final
//! time. Numerical failures end the call immediately.

use serde::Serialize;
use tracing::{info, warn};

use crate::adapter::{BlendStatus, SolverAdapter};
use crate::builder::{ConstraintBuilder, LpDefinition};
use crate::config::OptimizerConfig;
use crate::error::ChargeError;
use crate::material::TargetRange;
use crate::relax::relax;
use crate::report::{BlendReport, ResultInterpreter};
use crate::request::{ChargeRequest, ValidatedRequest};

/// Which attempt produced the reported blend
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attempt {
    Exact,
    Relaxed { factor: f64 },
}

impl std::fmt::Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Attempt::Exact => write!(f, "exact"),
            Attempt::Relaxed { factor } => write!(f, "relaxed by {}%", factor * 100.0),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Optimization {
    pub attempt: Attempt,
    pub report: BlendReport,
    /// Target ranges in force for the reported attempt
    pub targets: Vec<TargetRange>,
    /// Diagnostic of the exact attempt, when a relaxed attempt followed it
    pub exact_diagnostic: Option<String>,
    /// Advice for the caller when no blend was found
    pub guidance: Option<String>,
}

impl Optimization {
    pub fn status(&self) -> BlendStatus {
        self.report.status
    }

    pub fn is_feasible(&self) -> bool {
        self.report.is_feasible()
    }

    pub fn is_relaxed(&self) -> bool {
        matches!(self.attempt, Attempt::Relaxed { .. })
    }
}

/// Runs charge requests against one shared configuration, so constraint
/// building and interpretation always use the same property convention
pub struct ChargeMixOptimizer {
    config: OptimizerConfig,
}

impl ChargeMixOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Validate `request` and build its linear program without solving it
    pub fn build(&self, request: &ChargeRequest) -> Result<LpDefinition, ChargeError> {
        self.config.validate()?;
        let input = request.validate(&self.config)?;
        Ok(ConstraintBuilder::new(&self.config).build(&input))
    }

    pub fn optimize(&self, request: &ChargeRequest) -> Result<Optimization, ChargeError> {
        self.config.validate()?;
        let input = request.validate(&self.config)?;
        self.optimize_validated(&input)
    }

    pub fn optimize_validated(&self, input: &ValidatedRequest) -> Result<Optimization, ChargeError> {
        info!(
            event = "optimize",
            materials = input.num_materials(),
            elements = input.elements.len(),
            furnace_size = input.furnace_size,
            mode = %self.config.property_model.mode(),
        );

        let exact = self.attempt(input)?;
        let relaxation = &self.config.relaxation;

        if exact.status != BlendStatus::Infeasible || !relaxation.enabled {
            let guidance = (exact.status == BlendStatus::Infeasible).then(|| {
                "No blend meets every target. Widen the target ranges, loosen material bounds, \
                 or enable relaxation."
                    .to_string()
            });
            return Ok(Optimization {
                attempt: Attempt::Exact,
                targets: input.targets().cloned().collect(),
                report: exact,
                exact_diagnostic: None,
                guidance,
            });
        }

        let factor = relaxation.factor;
        let relaxed = ValidatedRequest {
            element_targets: relax(&input.element_targets, factor)?,
            property_targets: relax(&input.property_targets, factor)?,
            ..input.clone()
        };
        info!(event = "relaxation", factor, targets = relaxed.element_targets.len() + relaxed.property_targets.len());

        let report = self.attempt(&relaxed)?;
        let guidance = match report.status {
            BlendStatus::Optimal => {
                warn!(event = "relaxed_blend", factor, "targets met only after relaxation");
                None
            }
            BlendStatus::Infeasible => Some(format!(
                "No blend meets the targets even after widening them by {}%. \
                 Review the target ranges, material bounds and element selection.",
                factor * 100.0
            )),
            BlendStatus::NumericalFailure => None,
        };

        Ok(Optimization {
            attempt: Attempt::Relaxed { factor },
            targets: relaxed.targets().cloned().collect(),
            report,
            exact_diagnostic: exact.diagnostic,
            guidance,
        })
    }

    fn attempt(&self, input: &ValidatedRequest) -> Result<BlendReport, ChargeError> {
        let lp = ConstraintBuilder::new(&self.config).build(input);
        let solved = SolverAdapter::new(self.config.solver.clone()).solve(&lp);
        ResultInterpreter::new(&self.config).interpret(&solved, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoundUnits, SolverSettings};
    use crate::error::InputError;
    use crate::material::{MaterialBound, RawMaterial};
    use crate::property::{DerivedProperty, EvaluationMode, PropertyModel};
    use crate::sample::{HARDNESS, TENSILE_STRENGTH};

    fn two_materials(targets: Vec<TargetRange>) -> ChargeRequest {
        ChargeRequest {
            materials: vec![
                RawMaterial::new("A", 10.0).with_element("X", 100.0),
                RawMaterial::new("B", 1.0).with_element("X", 0.0),
            ],
            targets,
            furnace_size: 10.0,
            elements: None,
            bounds: Vec::new(),
        }
    }

    /// At most 2% X is reachable with any blend of these two
    fn lean_materials(target: TargetRange) -> ChargeRequest {
        ChargeRequest {
            materials: vec![
                RawMaterial::new("Lean", 5.0).with_element("X", 2.0),
                RawMaterial::new("Filler", 1.0).with_element("X", 0.0),
            ],
            targets: vec![target],
            furnace_size: 10.0,
            elements: None,
            bounds: Vec::new(),
        }
    }

    fn cast_iron(furnace_size: f64) -> ChargeRequest {
        ChargeRequest {
            materials: vec![
                RawMaterial::new("Pig Iron", 42.0).with_element("C", 4.0).with_element("Si", 1.0),
                RawMaterial::new("Steel Scrap", 30.0).with_element("C", 0.2).with_element("Si", 0.3),
                RawMaterial::new("Ferro-Silicon", 120.0).with_element("Si", 75.0),
                RawMaterial::new("Carburiser", 80.0).with_element("C", 90.0),
            ],
            targets: vec![
                TargetRange::new("C", 3.0, 3.5),
                TargetRange::new("Si", 1.8, 2.4),
                TargetRange::new(HARDNESS, 150.0, 200.0),
                TargetRange::new(TENSILE_STRENGTH, 300.0, 400.0),
            ],
            furnace_size,
            elements: None,
            bounds: Vec::new(),
        }
    }

    fn check_invariants(opt: &Optimization, request: &ChargeRequest) {
        let result = opt.report.result.as_ref().unwrap();
        assert!(
            (result.total_mass - request.furnace_size).abs() < 1e-6 * request.furnace_size,
            "total mass {}",
            result.total_mass
        );
        assert!(
            opt.report.unmet_targets(&opt.targets, 1e-6).is_empty(),
            "unmet targets: {:?}",
            opt.report.unmet_targets(&opt.targets, 1e-6)
        );
        for usage in &result.materials {
            assert!(usage.mass >= -1e-9, "{} has negative mass {}", usage.name, usage.mass);
        }
    }

    #[test]
    fn test_exact_two_material_blend() {
        let request = two_materials(vec![TargetRange::new("X", 50.0, 50.0)]);
        let opt = ChargeMixOptimizer::new(OptimizerConfig::default()).optimize(&request).unwrap();

        assert_eq!(opt.attempt, Attempt::Exact);
        assert!(opt.is_feasible(), "{:?}", opt.report.diagnostic);
        let result = opt.report.result.as_ref().unwrap();
        assert!((result.usage("A").unwrap().mass - 5.0).abs() < 1e-6);
        assert!((result.usage("B").unwrap().mass - 5.0).abs() < 1e-6);
        assert!((result.total_cost - 55.0).abs() < 1e-6, "cost = {}", result.total_cost);
        assert!((result.value_of("X").unwrap() - 50.0).abs() < 1e-6);
        check_invariants(&opt, &request);
    }

    #[test]
    fn test_single_material_fills_furnace() {
        let request = ChargeRequest {
            materials: vec![RawMaterial::new("Only", 7.0).with_element("X", 30.0)],
            targets: vec![TargetRange::new("X", 10.0, 60.0)],
            furnace_size: 10.0,
            elements: None,
            bounds: Vec::new(),
        };
        let opt = ChargeMixOptimizer::new(OptimizerConfig::default()).optimize(&request).unwrap();

        assert!(opt.is_feasible());
        let result = opt.report.result.unwrap();
        assert!((result.materials[0].mass - 10.0).abs() < 1e-6);
        assert!((result.total_cost - 70.0).abs() < 1e-6);
    }

    #[test]
    fn test_unreachable_target_is_infeasible() {
        let request = lean_materials(TargetRange::new("X", 5.0, 6.0));
        let opt = ChargeMixOptimizer::new(OptimizerConfig::default()).optimize(&request).unwrap();

        assert_eq!(opt.status(), BlendStatus::Infeasible);
        assert_eq!(opt.attempt, Attempt::Exact);
        assert!(opt.report.result.is_none());
        assert!(opt.report.diagnostic.is_some());
        assert!(opt.guidance.is_some());
    }

    #[test]
    fn test_relaxation_beyond_margin_stays_infeasible() {
        let request = lean_materials(TargetRange::new("X", 5.0, 6.0));
        let config = OptimizerConfig::default().with_relaxation(0.05);
        let opt = ChargeMixOptimizer::new(config).optimize(&request).unwrap();

        assert_eq!(opt.status(), BlendStatus::Infeasible);
        assert_eq!(opt.attempt, Attempt::Relaxed { factor: 0.05 });
        assert!(opt.exact_diagnostic.is_some());
        assert!(opt.guidance.as_deref().unwrap().contains("5%"));
        assert!((opt.targets[0].min - 4.75).abs() < 1e-12);
    }

    #[test]
    fn test_relaxation_within_margin_recovers() {
        // 2.05% is out of reach, 2.05 * 0.95 = 1.9475% is not
        let request = lean_materials(TargetRange::new("X", 2.05, 3.0));

        let exact = ChargeMixOptimizer::new(OptimizerConfig::default()).optimize(&request).unwrap();
        assert_eq!(exact.status(), BlendStatus::Infeasible);

        let config = OptimizerConfig::default().with_relaxation(0.05);
        let opt = ChargeMixOptimizer::new(config).optimize(&request).unwrap();
        assert!(opt.is_feasible(), "{:?}", opt.report.diagnostic);
        assert!(opt.is_relaxed());
        assert!(opt.guidance.is_none());

        let x = opt.report.result.as_ref().unwrap().value_of("X").unwrap();
        assert!((x - 1.9475).abs() < 1e-6, "X = {}", x);
        check_invariants(&opt, &request);
    }

    #[test]
    fn test_small_gap_with_property_target_relaxes() {
        // X tops out at 2%; the hardness rows carry right-hand sides near 10^4
        let mut request = lean_materials(TargetRange::new("X", 2.005, 3.0));
        request.targets.push(TargetRange::new(HARDNESS, -1000.0, 1000.0));
        let model = PropertyModel::new(
            EvaluationMode::Average,
            vec![DerivedProperty::new(HARDNESS, 50.0).with_coefficient("X", 10.0)],
        );

        let exact = ChargeMixOptimizer::new(OptimizerConfig::default().with_property_model(model.clone()))
            .optimize(&request)
            .unwrap();
        assert_eq!(exact.status(), BlendStatus::Infeasible, "{:?}", exact.report.diagnostic);
        assert!(!exact.report.violations.is_empty());

        let config = OptimizerConfig::default()
            .with_property_model(model)
            .with_relaxation(0.05);
        let opt = ChargeMixOptimizer::new(config).optimize(&request).unwrap();
        assert_eq!(opt.attempt, Attempt::Relaxed { factor: 0.05 });
        assert!(opt.is_feasible(), "{:?}", opt.report.diagnostic);
        assert!(opt.exact_diagnostic.is_some());

        let result = opt.report.result.as_ref().unwrap();
        let x = result.value_of("X").unwrap();
        assert!((x - 2.005 * 0.95).abs() < 1e-6, "X = {}", x);
        assert!((result.properties[HARDNESS] - (50.0 + 10.0 * x)).abs() < 1e-6);
        check_invariants(&opt, &request);
    }

    #[test]
    fn test_small_gap_with_default_properties_is_infeasible() {
        let mut request = lean_materials(TargetRange::new("X", 2.005, 3.0));
        request.targets.push(TargetRange::new(HARDNESS, -1000.0, 1000.0));

        let opt = ChargeMixOptimizer::new(OptimizerConfig::default()).optimize(&request).unwrap();
        assert_eq!(opt.status(), BlendStatus::Infeasible, "{:?}", opt.report.diagnostic);
    }

    #[test]
    fn test_feasible_exact_attempt_skips_relaxation() {
        let request = two_materials(vec![TargetRange::new("X", 40.0, 60.0)]);
        let config = OptimizerConfig::default().with_relaxation(0.05);
        let opt = ChargeMixOptimizer::new(config).optimize(&request).unwrap();

        assert_eq!(opt.attempt, Attempt::Exact);
        assert_eq!(opt.targets, request.targets);
    }

    #[test]
    fn test_numerical_failure_is_not_relaxed() {
        let request = two_materials(vec![TargetRange::new("X", 50.0, 50.0)]);
        let config = OptimizerConfig {
            solver: SolverSettings {
                max_iterations: 0,
                ..SolverSettings::default()
            },
            ..OptimizerConfig::default().with_relaxation(0.05)
        };
        let opt = ChargeMixOptimizer::new(config).optimize(&request).unwrap();

        assert_eq!(opt.status(), BlendStatus::NumericalFailure);
        assert_eq!(opt.attempt, Attempt::Exact);
        assert!(opt.guidance.is_none());
    }

    #[test]
    fn test_invalid_furnace_size_rejected_before_solving() {
        for size in [0.0, -10.0] {
            let mut request = two_materials(vec![TargetRange::new("X", 50.0, 50.0)]);
            request.furnace_size = size;
            let err = ChargeMixOptimizer::new(OptimizerConfig::default())
                .optimize(&request)
                .unwrap_err();
            assert!(matches!(
                err,
                ChargeError::InvalidInput(InputError::InvalidFurnaceSize(_))
            ));
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = OptimizerConfig::default().with_relaxation(2.0);
        let request = two_materials(Vec::new());
        assert!(matches!(
            ChargeMixOptimizer::new(config).optimize(&request),
            Err(ChargeError::Config(_))
        ));
    }

    #[test]
    fn test_cast_iron_blend_meets_every_target() {
        let request = cast_iron(10.0);
        let opt = ChargeMixOptimizer::new(OptimizerConfig::default()).optimize(&request).unwrap();

        assert!(opt.is_feasible(), "{:?}", opt.report.diagnostic);
        check_invariants(&opt, &request);
    }

    #[test]
    fn test_raising_a_used_material_cost_never_lowers_total() {
        let optimizer = ChargeMixOptimizer::new(OptimizerConfig::default());
        let base = optimizer.optimize(&cast_iron(10.0)).unwrap();
        let base_cost = base.report.result.as_ref().unwrap().total_cost;

        for bump in [1.0, 5.0, 20.0] {
            let mut request = cast_iron(10.0);
            request.materials[0].cost = Some(42.0 + bump);
            let opt = optimizer.optimize(&request).unwrap();
            let cost = opt.report.result.unwrap().total_cost;
            assert!(cost >= base_cost - 1e-6, "cost fell from {} to {}", base_cost, cost);
        }
    }

    #[test]
    fn test_average_mode_is_invariant_to_furnace_size() {
        let optimizer = ChargeMixOptimizer::new(OptimizerConfig::default());
        let small = optimizer.optimize(&cast_iron(10.0)).unwrap();
        let large = optimizer.optimize(&cast_iron(20.0)).unwrap();

        let a = small.report.result.unwrap();
        let b = large.report.result.unwrap();
        assert!((2.0 * a.total_cost - b.total_cost).abs() < 1e-6, "{} vs {}", a.total_cost, b.total_cost);
        for name in [HARDNESS, TENSILE_STRENGTH] {
            assert!((150.0 - 1e-6..=400.0 + 1e-6).contains(&b.properties[name]));
        }
    }

    #[test]
    fn test_fraction_bounds_match_mass_bounds() {
        let mut by_mass = cast_iron(10.0);
        by_mass.bounds = vec![MaterialBound::new("Pig Iron", 0.0, 8.0)];
        let mut by_fraction = cast_iron(10.0);
        by_fraction.bounds = vec![MaterialBound::new("Pig Iron", 0.0, 0.8)];

        let mass = ChargeMixOptimizer::new(OptimizerConfig::default()).optimize(&by_mass).unwrap();
        let fraction = ChargeMixOptimizer::new(OptimizerConfig::default().with_bound_units(BoundUnits::Fraction))
            .optimize(&by_fraction)
            .unwrap();

        let a = mass.report.result.unwrap();
        let b = fraction.report.result.unwrap();
        assert!((a.total_cost - b.total_cost).abs() < 1e-6, "{} vs {}", a.total_cost, b.total_cost);
        assert!(b.usage("Pig Iron").unwrap().mass <= 8.0 + 1e-6);
    }

    #[test]
    fn test_absolute_mode_on_unit_furnace_matches_average() {
        let request = cast_iron(10.0);
        let average = ChargeMixOptimizer::new(OptimizerConfig::default()).optimize(&request).unwrap();

        // With fraction variables the legacy formulation sees a blend of unit mass
        let config = OptimizerConfig::default()
            .with_mode(EvaluationMode::Absolute)
            .with_bound_units(BoundUnits::Fraction);
        let absolute = ChargeMixOptimizer::new(config).optimize(&request).unwrap();

        assert_eq!(absolute.report.mode, EvaluationMode::Absolute);
        let a = average.report.result.as_ref().unwrap();
        let b = absolute.report.result.as_ref().unwrap();
        assert!((a.total_cost - b.total_cost).abs() < 1e-6, "{} vs {}", a.total_cost, b.total_cost);
        assert!(absolute.report.unmet_targets(&absolute.targets, 1e-6).is_empty());
        assert!((b.total_mass - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_selection_is_only_mass_balance() {
        let mut request = two_materials(Vec::new());
        request.elements = Some(crate::material::ElementSet::default());
        let opt = ChargeMixOptimizer::new(OptimizerConfig::default()).optimize(&request).unwrap();

        // Cheapest material fills the furnace
        let result = opt.report.result.unwrap();
        assert!((result.usage("B").unwrap().mass - 10.0).abs() < 1e-6);
        assert!((result.total_cost - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_build_exposes_the_program() {
        let request = two_materials(vec![TargetRange::new("X", 50.0, 50.0)]);
        let lp = ChargeMixOptimizer::new(OptimizerConfig::default()).build(&request).unwrap();
        assert_eq!(lp.num_variables(), 2);
        assert_eq!(lp.num_rows(), 3);
    }
}
