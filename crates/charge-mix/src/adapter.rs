use charge_solver::{ConstraintOp, ConstraintViolation, LpProblem, ReducedCost, Solution, SolutionStatus};
use serde::Serialize;
use tracing::{debug, info};

use crate::builder::{LinearRow, LpDefinition};
use crate::config::SolverSettings;
use crate::property::EvaluationMode;

/// Outcome category of one solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendStatus {
    Optimal,
    /// No blend satisfies the constraints; recoverable by relaxing targets
    Infeasible,
    /// Unbounded, iteration/time limit, or a solution that failed verification
    NumericalFailure,
}

impl std::fmt::Display for BlendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlendStatus::Optimal => write!(f, "optimal"),
            BlendStatus::Infeasible => write!(f, "infeasible"),
            BlendStatus::NumericalFailure => write!(f, "numerical failure"),
        }
    }
}

/// Normalized solver result for one [`LpDefinition`]
#[derive(Debug, Clone)]
pub struct SolvedBlend {
    pub status: BlendStatus,
    /// Variable values in the definition's units, empty unless optimal
    pub values: Vec<f64>,
    pub total_cost: f64,
    pub diagnostic: String,
    pub violations: Vec<ConstraintViolation>,
    pub binding_constraints: Vec<String>,
    pub reduced_costs: Vec<ReducedCost>,
    pub scale: f64,
    pub furnace_size: f64,
    pub mode: EvaluationMode,
}

impl SolvedBlend {
    pub fn is_feasible(&self) -> bool {
        self.status == BlendStatus::Optimal
    }
}

/// Runs the simplex solver on an [`LpDefinition`] and checks what comes back
pub struct SolverAdapter {
    settings: SolverSettings,
}

impl SolverAdapter {
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    pub fn solve(&self, definition: &LpDefinition) -> SolvedBlend {
        let problem = to_problem(definition);

        info!(
            event = "solve_start",
            variables = problem.num_variables(),
            constraints = problem.num_constraints(),
        );

        let solution = self.settings.solver().solve(&problem);

        let blend = if solution.is_optimal() {
            match self.verify(definition, &solution.values) {
                Ok(()) => self.optimal(definition, solution),
                Err(reason) => self.failed(definition, BlendStatus::NumericalFailure, reason, Vec::new()),
            }
        } else if solution.status == SolutionStatus::Infeasible {
            let message = solution.message.clone();
            self.failed(definition, BlendStatus::Infeasible, message, solution.violations)
        } else {
            let message = format!("Solver reported {}: {}", solution.status, solution.message);
            self.failed(definition, BlendStatus::NumericalFailure, message, Vec::new())
        };

        info!(event = "solve_end", status = %blend.status, cost = blend.total_cost);
        blend
    }

    /// Every row and bound must hold to the relative feasibility tolerance
    fn verify(&self, definition: &LpDefinition, values: &[f64]) -> Result<(), String> {
        let tol = |rhs: f64| self.settings.feasibility_tolerance * (1.0 + rhs.abs());

        for row in &definition.equalities {
            let lhs = row_value(row, values);
            if (lhs - row.rhs).abs() > tol(row.rhs) {
                return Err(format!(
                    "Solution misses {} by {:.3e}",
                    row.label,
                    (lhs - row.rhs).abs()
                ));
            }
        }
        for row in &definition.inequalities {
            let lhs = row_value(row, values);
            if lhs > row.rhs + tol(row.rhs) {
                return Err(format!("Solution violates {} by {:.3e}", row.label, lhs - row.rhs));
            }
        }
        for ((name, bounds), &value) in definition.variables.iter().zip(&definition.bounds).zip(values) {
            if !bounds.contains(value, tol(value)) {
                return Err(format!("Solution puts {} outside its bounds ({})", name, value));
            }
        }
        Ok(())
    }

    fn optimal(&self, definition: &LpDefinition, solution: Solution) -> SolvedBlend {
        debug!(event = "binding", constraints = ?solution.analysis.binding_constraints);
        SolvedBlend {
            status: BlendStatus::Optimal,
            total_cost: solution.objective_value,
            values: solution.values,
            diagnostic: String::new(),
            violations: Vec::new(),
            binding_constraints: solution.analysis.binding_constraints,
            reduced_costs: solution.analysis.reduced_costs,
            scale: definition.scale,
            furnace_size: definition.furnace_size,
            mode: definition.mode,
        }
    }

    fn failed(
        &self,
        definition: &LpDefinition,
        status: BlendStatus,
        diagnostic: String,
        violations: Vec<ConstraintViolation>,
    ) -> SolvedBlend {
        SolvedBlend {
            status,
            values: Vec::new(),
            total_cost: f64::NAN,
            diagnostic,
            violations,
            binding_constraints: Vec::new(),
            reduced_costs: Vec::new(),
            scale: definition.scale,
            furnace_size: definition.furnace_size,
            mode: definition.mode,
        }
    }
}

fn row_value(row: &LinearRow, values: &[f64]) -> f64 {
    row.coefficients.iter().zip(values).map(|(a, x)| a * x).sum()
}

fn to_problem(definition: &LpDefinition) -> LpProblem {
    let mut problem = LpProblem::new(definition.variables.clone());
    problem.set_objective(definition.objective.clone(), true);

    for row in &definition.equalities {
        problem.add_constraint(row.label.clone(), row.coefficients.clone(), ConstraintOp::Eq, row.rhs);
    }
    for row in &definition.inequalities {
        problem.add_constraint(row.label.clone(), row.coefficients.clone(), ConstraintOp::Le, row.rhs);
    }
    for (i, b) in definition.bounds.iter().enumerate() {
        problem.set_bounds(i, b.lower, b.upper);
    }

    problem
}
