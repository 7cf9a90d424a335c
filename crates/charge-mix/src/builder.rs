use charge_solver::VariableBounds;
use serde::Serialize;
use tracing::debug;

use crate::config::{BoundUnits, OptimizerConfig};
use crate::error::InputError;
use crate::property::{EvaluationMode, PropertyModel};
use crate::request::{ChargeRequest, ValidatedRequest};

/// One labelled row `coefficients · x (op) rhs`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinearRow {
    pub label: String,
    pub coefficients: Vec<f64>,
    pub rhs: f64,
}

/// The linear program for one request. Variables are material amounts in
/// the configured bound units; they sum to `scale`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LpDefinition {
    pub variables: Vec<String>,
    /// Cost per variable, minimized
    pub objective: Vec<f64>,
    /// `A_eq · x = b_eq`
    pub equalities: Vec<LinearRow>,
    /// `A_ub · x <= b_ub`
    pub inequalities: Vec<LinearRow>,
    pub bounds: Vec<VariableBounds>,
    pub furnace_size: f64,
    /// Total of the variables: `furnace_size` for mass bounds, 1 for fractions
    pub scale: f64,
    /// Property convention the rows were built with
    pub mode: EvaluationMode,
}

impl LpDefinition {
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_rows(&self) -> usize {
        self.equalities.len() + self.inequalities.len()
    }

    pub fn equality_matrix(&self) -> (Vec<Vec<f64>>, Vec<f64>) {
        split_rows(&self.equalities)
    }

    pub fn inequality_matrix(&self) -> (Vec<Vec<f64>>, Vec<f64>) {
        split_rows(&self.inequalities)
    }

    /// Physical mass represented by one variable unit
    pub fn mass_per_unit(&self) -> f64 {
        self.furnace_size / self.scale
    }
}

fn split_rows(rows: &[LinearRow]) -> (Vec<Vec<f64>>, Vec<f64>) {
    rows.iter().map(|r| (r.coefficients.clone(), r.rhs)).unzip()
}

/// Translates material and target tables into an [`LpDefinition`]
pub struct ConstraintBuilder<'a> {
    model: &'a PropertyModel,
    units: BoundUnits,
}

impl<'a> ConstraintBuilder<'a> {
    pub fn new(config: &'a OptimizerConfig) -> Self {
        Self {
            model: &config.property_model,
            units: config.bound_units,
        }
    }

    /// Validate `request` against `config` and build its linear program
    pub fn build_request(config: &OptimizerConfig, request: &ChargeRequest) -> Result<LpDefinition, InputError> {
        let input = request.validate(config)?;
        Ok(ConstraintBuilder::new(config).build(&input))
    }

    pub fn build(&self, input: &ValidatedRequest) -> LpDefinition {
        let scale = match self.units {
            BoundUnits::Mass => input.furnace_size,
            BoundUnits::Fraction => 1.0,
        };
        let n = input.num_materials();

        // Mass balance
        let equalities = vec![LinearRow {
            label: "mass_balance".to_string(),
            coefficients: vec![1.0; n],
            rhs: scale,
        }];

        let mut inequalities = Vec::new();

        // Elemental ranges on average composition, scaled to variable units
        for target in &input.element_targets {
            let fractions: Vec<f64> = input
                .materials
                .iter()
                .map(|m| m.percentage(&target.property) / 100.0)
                .collect();
            inequalities.push(LinearRow {
                label: format!("{}_min", target.property),
                coefficients: fractions.iter().map(|f| -f).collect(),
                rhs: -(target.min / 100.0) * scale,
            });
            inequalities.push(LinearRow {
                label: format!("{}_max", target.property),
                coefficients: fractions,
                rhs: (target.max / 100.0) * scale,
            });
        }

        // Derived properties
        for target in &input.property_targets {
            let Some(form) = self
                .model
                .linear_form(&target.property, &input.materials, &input.elements, scale)
            else {
                continue;
            };
            let (coefficients, rhs) = form.lower_row(target.min);
            inequalities.push(LinearRow {
                label: format!("{}_min", target.property),
                coefficients,
                rhs,
            });
            let (coefficients, rhs) = form.upper_row(target.max);
            inequalities.push(LinearRow {
                label: format!("{}_max", target.property),
                coefficients,
                rhs,
            });
        }

        let bounds = input
            .bounds
            .iter()
            .map(|b| match b {
                Some((min, max)) => VariableBounds::new(*min, max.unwrap_or(scale)),
                None => VariableBounds::new(0.0, scale),
            })
            .collect();

        debug!(
            event = "lp_built",
            variables = n,
            equalities = equalities.len(),
            inequalities = inequalities.len(),
            scale,
            mode = %self.model.mode(),
        );

        LpDefinition {
            variables: input.material_names(),
            objective: input.costs.clone(),
            equalities,
            inequalities,
            bounds,
            furnace_size: input.furnace_size,
            scale,
            mode: self.model.mode(),
        }
    }
}
