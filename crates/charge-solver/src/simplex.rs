use std::time::{Duration, Instant};

use crate::problem::{dot, ConstraintOp, LpProblem};
use crate::solution::{Analysis, ConstraintViolation, ReducedCost, Solution};

/// Simplex solver for linear programming problems
pub struct Solver {
    /// Maximum iterations before giving up
    max_iterations: usize,
    /// Tolerance for floating point comparisons
    tolerance: f64,
    /// Tolerance for accepting a point as feasible, scaled per row by `1 + |rhs|`
    feasibility_tolerance: f64,
    /// Wall-clock limit for a single solve
    time_limit: Option<Duration>,
    /// Consecutive degenerate pivots tolerated before switching to Bland's rule
    degenerate_limit: usize,
}

impl Default for Solver {
    fn default() -> Self {
        Self {
            max_iterations: 10000,
            tolerance: 1e-9,
            feasibility_tolerance: 1e-7,
            time_limit: None,
            degenerate_limit: 50,
        }
    }
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn with_feasibility_tolerance(mut self, tol: f64) -> Self {
        self.feasibility_tolerance = tol;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn with_degenerate_limit(mut self, limit: usize) -> Self {
        self.degenerate_limit = limit;
        self
    }

    /// Solve the LP problem using the two-phase simplex method
    pub fn solve(&self, problem: &LpProblem) -> Solution {
        if let Err(e) = problem.validate() {
            return Solution::error(e.to_string());
        }

        let conflicts = self.bound_conflicts(problem);
        if !conflicts.is_empty() {
            return Solution::infeasible_with_violations(conflicts, "Variable bounds are contradictory");
        }

        let standard = StandardForm::new(problem);
        let mut tableau = Tableau::build(&standard);
        let mut run = Run {
            iterations: 0,
            deadline: self.time_limit.map(|limit| Instant::now() + limit),
        };

        // Phase 1: Find initial basic feasible solution
        if tableau.n_artificial > 0 {
            match self.phase1(&mut tableau, &mut run) {
                SimplexResult::Optimal => {}
                SimplexResult::Infeasible => {
                    let values = standard.recover(&tableau.primal_values());
                    let violations = self.find_violations(problem, &values);
                    let message = match violations.first() {
                        Some(worst) => format!(
                            "No point satisfies all constraints; {} violated at the closest point found, worst: {}",
                            violations.len(),
                            worst.description
                        ),
                        None => "No point satisfies all constraints".to_string(),
                    };
                    return Solution::infeasible_with_violations(violations, message);
                }
                SimplexResult::Unbounded => {
                    return Solution::error("Phase 1 objective became unbounded (numerical instability)");
                }
                SimplexResult::Stopped(reason) => return Solution::error(reason),
            }
        }

        // Phase 2: Optimize
        match self.phase2(&mut tableau, &mut run) {
            SimplexResult::Optimal => {}
            SimplexResult::Unbounded => {
                return Solution::unbounded("The objective can be improved without limit");
            }
            SimplexResult::Infeasible => return Solution::infeasible("No point satisfies all constraints"),
            SimplexResult::Stopped(reason) => return Solution::error(reason),
        }

        self.extract_solution(&tableau, &standard, problem)
    }

    /// Variables whose lower bound exceeds their upper bound
    fn bound_conflicts(&self, problem: &LpProblem) -> Vec<ConstraintViolation> {
        problem
            .variables
            .iter()
            .zip(&problem.bounds)
            .filter(|(_, b)| b.lower > b.upper + self.tolerance)
            .map(|(name, b)| ConstraintViolation {
                constraint: format!("{}_bounds", name),
                required: b.lower,
                actual: b.upper,
                violation_amount: b.lower - b.upper,
                description: format!(
                    "Conflict: {} requires >= {:.2} but also <= {:.2}",
                    name, b.lower, b.upper
                ),
            })
            .collect()
    }

    /// Allowed residual on a row with right-hand side `rhs`
    fn row_tolerance(&self, rhs: f64) -> f64 {
        self.feasibility_tolerance * (1.0 + rhs.abs())
    }

    /// Find which constraints are violated by a given solution
    fn find_violations(&self, problem: &LpProblem, values: &[f64]) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();

        for c in &problem.constraints {
            let lhs = c.lhs(values);
            let tolerance = self.row_tolerance(c.rhs);

            let (is_violated, violation_amount, description) = match c.op {
                ConstraintOp::Le => {
                    if lhs > c.rhs + tolerance {
                        let amt = lhs - c.rhs;
                        (true, amt, format!("{} exceeds maximum of {:.4} by {:.4}", c.name, c.rhs, amt))
                    } else {
                        (false, 0.0, String::new())
                    }
                }
                ConstraintOp::Ge => {
                    if lhs < c.rhs - tolerance {
                        let amt = c.rhs - lhs;
                        (true, amt, format!("{} is below minimum of {:.4} by {:.4}", c.name, c.rhs, amt))
                    } else {
                        (false, 0.0, String::new())
                    }
                }
                ConstraintOp::Eq => {
                    let diff = (lhs - c.rhs).abs();
                    if diff > tolerance {
                        (true, diff, format!("{} requires exactly {:.4} but got {:.4}", c.name, c.rhs, lhs))
                    } else {
                        (false, 0.0, String::new())
                    }
                }
            };

            if is_violated {
                violations.push(ConstraintViolation {
                    constraint: c.name.clone(),
                    required: c.rhs,
                    actual: lhs,
                    violation_amount,
                    description,
                });
            }
        }

        // Worst first
        violations.sort_by(|a, b| b.violation_amount.total_cmp(&a.violation_amount));

        violations
    }

    fn phase1(&self, tableau: &mut Tableau, run: &mut Run) -> SimplexResult {
        // Maximize -sum(artificials)
        let n_constraints = tableau.n_rows();
        let n_cols = tableau.n_cols();
        let art_start = tableau.art_start();

        let orig_obj = tableau.data[n_constraints].clone();

        for j in 0..n_cols {
            tableau.data[n_constraints][j] = 0.0;
        }
        for j in art_start..(art_start + tableau.n_artificial) {
            tableau.data[n_constraints][j] = -1.0;
        }

        // Price out the basic artificials
        for i in 0..n_constraints {
            if tableau.basic_vars[i] >= art_start {
                for j in 0..n_cols {
                    tableau.data[n_constraints][j] += tableau.data[i][j];
                }
            }
        }

        match self.iterate(tableau, run, n_cols - 1) {
            SimplexResult::Optimal => {}
            other => return other,
        }

        let rhs_col = n_cols - 1;
        // Each leftover artificial is the residual of its own row
        for i in 0..n_constraints {
            let basic = tableau.basic_vars[i];
            if basic >= art_start
                && tableau.data[i][rhs_col] > self.feasibility_tolerance * tableau.art_scale[basic - art_start]
            {
                return SimplexResult::Infeasible;
            }
        }

        self.drive_out_artificials(tableau);

        // Restore original objective and price out the basis
        tableau.data[n_constraints] = orig_obj;
        for i in 0..n_constraints {
            let basic = tableau.basic_vars[i];
            let ratio = tableau.data[n_constraints][basic];
            if ratio.abs() > self.tolerance {
                for j in 0..n_cols {
                    tableau.data[n_constraints][j] -= ratio * tableau.data[i][j];
                }
            }
        }

        SimplexResult::Optimal
    }

    /// Pivot zero-level artificials out of the basis. Rows where no
    /// structural column is available are redundant and left alone.
    fn drive_out_artificials(&self, tableau: &mut Tableau) {
        let art_start = tableau.art_start();
        let rhs_col = tableau.n_cols() - 1;

        for i in 0..tableau.n_rows() {
            if tableau.basic_vars[i] < art_start {
                continue;
            }
            let candidate = (0..art_start)
                .filter(|&j| tableau.data[i][j].abs() > self.tolerance)
                .max_by(|&a, &b| tableau.data[i][a].abs().total_cmp(&tableau.data[i][b].abs()));
            if let Some(col) = candidate {
                tableau.data[i][rhs_col] = 0.0;
                self.pivot(tableau, i, col);
            }
        }
    }

    fn phase2(&self, tableau: &mut Tableau, run: &mut Run) -> SimplexResult {
        // Artificial columns never re-enter
        let exclude_from = tableau.art_start();
        self.iterate(tableau, run, exclude_from)
    }

    fn iterate(&self, tableau: &mut Tableau, run: &mut Run, n_candidate_cols: usize) -> SimplexResult {
        let rhs_col = tableau.n_cols() - 1;
        let mut degenerate_run = 0;

        loop {
            if run.iterations >= self.max_iterations {
                return SimplexResult::Stopped(format!(
                    "Iteration limit of {} reached",
                    self.max_iterations
                ));
            }
            if run.deadline.is_some_and(|d| Instant::now() >= d) {
                return SimplexResult::Stopped("Time limit reached".to_string());
            }

            let rule = if degenerate_run >= self.degenerate_limit {
                PivotRule::Bland
            } else {
                PivotRule::Dantzig
            };

            let Some(pivot_col) = self.find_pivot_column(tableau, n_candidate_cols, rule) else {
                return SimplexResult::Optimal;
            };
            let Some(pivot_row) = self.find_pivot_row(tableau, pivot_col, rule) else {
                return SimplexResult::Unbounded;
            };

            if tableau.data[pivot_row][rhs_col].abs() <= self.tolerance {
                degenerate_run += 1;
            } else {
                degenerate_run = 0;
            }

            self.pivot(tableau, pivot_row, pivot_col);
            run.iterations += 1;
        }
    }

    fn find_pivot_column(&self, tableau: &Tableau, n_cols: usize, rule: PivotRule) -> Option<usize> {
        let obj_row = tableau.n_rows();

        match rule {
            // Most positive reduced cost
            PivotRule::Dantzig => {
                let mut max_val = self.tolerance;
                let mut max_col = None;
                for j in 0..n_cols {
                    if tableau.data[obj_row][j] > max_val {
                        max_val = tableau.data[obj_row][j];
                        max_col = Some(j);
                    }
                }
                max_col
            }
            // Lowest index with positive reduced cost
            PivotRule::Bland => (0..n_cols).find(|&j| tableau.data[obj_row][j] > self.tolerance),
        }
    }

    fn find_pivot_row(&self, tableau: &Tableau, col: usize, rule: PivotRule) -> Option<usize> {
        let rhs_col = tableau.n_cols() - 1;

        let mut min_ratio = f64::INFINITY;
        let mut min_row: Option<usize> = None;

        for i in 0..tableau.n_rows() {
            let val = tableau.data[i][col];
            if val <= self.tolerance {
                continue;
            }
            let ratio = tableau.data[i][rhs_col].max(0.0) / val;
            let better = match min_row {
                None => true,
                Some(current) => {
                    if ratio < min_ratio - self.tolerance {
                        true
                    } else {
                        rule == PivotRule::Bland
                            && ratio <= min_ratio + self.tolerance
                            && tableau.basic_vars[i] < tableau.basic_vars[current]
                    }
                }
            };
            if better {
                min_ratio = ratio.min(min_ratio);
                min_row = Some(i);
            }
        }

        min_row
    }

    fn pivot(&self, tableau: &mut Tableau, row: usize, col: usize) {
        let n_rows = tableau.data.len();
        let n_cols = tableau.n_cols();

        tableau.basic_vars[row] = col;

        let pivot_val = tableau.data[row][col];
        for j in 0..n_cols {
            tableau.data[row][j] /= pivot_val;
        }

        for i in 0..n_rows {
            if i != row {
                let factor = tableau.data[i][col];
                if factor == 0.0 {
                    continue;
                }
                for j in 0..n_cols {
                    tableau.data[i][j] -= factor * tableau.data[row][j];
                }
            }
        }
    }

    fn extract_solution(
        &self,
        tableau: &Tableau,
        standard: &StandardForm,
        problem: &LpProblem,
    ) -> Solution {
        let values = standard.recover(&tableau.primal_values());
        let objective_value = problem.objective_value(&values);
        let analysis = self.analyze(tableau, problem, &values);

        Solution {
            status: crate::SolutionStatus::Optimal,
            values,
            objective_value,
            analysis,
            violations: Vec::new(),
            message: String::new(),
        }
    }

    fn analyze(&self, tableau: &Tableau, problem: &LpProblem, values: &[f64]) -> Analysis {
        let obj_row = tableau.n_rows();

        let reduced_costs = problem
            .variables
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let is_basic = tableau.basic_vars.contains(&j);
                // The tableau maximizes, so a minimization reports the negated entry
                let entry = tableau.data[obj_row][j];
                let reduced_cost = match (is_basic, problem.objective.minimize) {
                    (true, _) => 0.0,
                    (false, true) => -entry,
                    (false, false) => entry,
                };
                ReducedCost {
                    variable: name.clone(),
                    value: values[j],
                    reduced_cost,
                    is_basic,
                }
            })
            .collect();

        // Inequalities satisfied with equality
        let binding_constraints = problem
            .constraints
            .iter()
            .filter(|c| c.op != ConstraintOp::Eq && (c.lhs(values) - c.rhs).abs() <= self.row_tolerance(c.rhs))
            .map(|c| c.name.clone())
            .collect();

        Analysis {
            reduced_costs,
            binding_constraints,
        }
    }
}

/// Problem rewritten with shifted variables `y = x - lower`, explicit upper
/// bound rows, non-negative right-hand sides and a maximization objective
struct StandardForm {
    n_vars: usize,
    lower: Vec<f64>,
    objective: Vec<f64>,
    rows: Vec<StandardRow>,
}

struct StandardRow {
    coefficients: Vec<f64>,
    op: ConstraintOp,
    rhs: f64,
    /// `1 + |rhs|`, taking the smaller of the original and shifted rhs
    scale: f64,
}

impl StandardForm {
    fn new(problem: &LpProblem) -> Self {
        let n_vars = problem.num_variables();
        let lower: Vec<f64> = problem.bounds.iter().map(|b| b.lower).collect();

        let objective = problem
            .objective
            .coefficients
            .iter()
            .map(|&c| if problem.objective.minimize { -c } else { c })
            .collect();

        let mut rows = Vec::with_capacity(problem.num_constraints() + n_vars);
        for c in &problem.constraints {
            let rhs = c.rhs - dot(&c.coefficients, &lower);
            rows.push(StandardRow {
                coefficients: c.coefficients.clone(),
                op: c.op,
                rhs,
                scale: 1.0 + c.rhs.abs().min(rhs.abs()),
            });
        }
        for (j, b) in problem.bounds.iter().enumerate() {
            if b.upper.is_finite() {
                let mut coefficients = vec![0.0; n_vars];
                coefficients[j] = 1.0;
                let rhs = b.upper - b.lower;
                rows.push(StandardRow {
                    coefficients,
                    op: ConstraintOp::Le,
                    rhs,
                    scale: 1.0 + b.upper.abs().min(rhs.abs()),
                });
            }
        }

        for row in &mut rows {
            if row.rhs < 0.0 {
                row.rhs = -row.rhs;
                row.op = row.op.flipped();
                for v in &mut row.coefficients {
                    *v = -*v;
                }
            }
        }

        Self {
            n_vars,
            lower,
            objective,
            rows,
        }
    }

    /// Map shifted values back to the original variables
    fn recover(&self, shifted: &[f64]) -> Vec<f64> {
        shifted
            .iter()
            .zip(&self.lower)
            .map(|(y, lo)| lo + y.max(0.0))
            .collect()
    }
}

struct Tableau {
    data: Vec<Vec<f64>>,
    basic_vars: Vec<usize>,
    n_vars: usize,
    n_slack: usize,
    n_artificial: usize,
    /// Tolerance scale of the row each artificial column belongs to
    art_scale: Vec<f64>,
}

impl Tableau {
    fn build(standard: &StandardForm) -> Self {
        let n_vars = standard.n_vars;
        let n_constraints = standard.rows.len();

        let mut n_slack = 0;
        let mut n_artificial = 0;
        for row in &standard.rows {
            match row.op {
                ConstraintOp::Le => n_slack += 1,
                ConstraintOp::Ge => {
                    n_slack += 1; // surplus
                    n_artificial += 1;
                }
                ConstraintOp::Eq => n_artificial += 1,
            }
        }

        let total_cols = n_vars + n_slack + n_artificial + 1; // +1 for RHS
        let mut tableau = Tableau {
            data: vec![vec![0.0; total_cols]; n_constraints + 1],
            basic_vars: vec![0; n_constraints],
            n_vars,
            n_slack,
            n_artificial,
            art_scale: Vec::with_capacity(n_artificial),
        };

        let mut slack_idx = n_vars;
        let mut artificial_idx = n_vars + n_slack;

        for (i, row) in standard.rows.iter().enumerate() {
            tableau.data[i][..n_vars].copy_from_slice(&row.coefficients);
            tableau.data[i][total_cols - 1] = row.rhs;

            match row.op {
                ConstraintOp::Le => {
                    tableau.data[i][slack_idx] = 1.0;
                    tableau.basic_vars[i] = slack_idx;
                    slack_idx += 1;
                }
                ConstraintOp::Ge => {
                    tableau.data[i][slack_idx] = -1.0;
                    slack_idx += 1;
                    tableau.data[i][artificial_idx] = 1.0;
                    tableau.basic_vars[i] = artificial_idx;
                    tableau.art_scale.push(row.scale);
                    artificial_idx += 1;
                }
                ConstraintOp::Eq => {
                    tableau.data[i][artificial_idx] = 1.0;
                    tableau.basic_vars[i] = artificial_idx;
                    tableau.art_scale.push(row.scale);
                    artificial_idx += 1;
                }
            }
        }

        // Objective row (last row) holds reduced costs of the maximization
        tableau.data[n_constraints][..n_vars].copy_from_slice(&standard.objective);

        tableau
    }

    fn n_rows(&self) -> usize {
        self.basic_vars.len()
    }

    fn n_cols(&self) -> usize {
        self.data[0].len()
    }

    fn art_start(&self) -> usize {
        self.n_vars + self.n_slack
    }

    /// Values of the structural (shifted) variables at the current basis
    fn primal_values(&self) -> Vec<f64> {
        let rhs_col = self.n_cols() - 1;
        let mut values = vec![0.0; self.n_vars];
        for (i, &basic) in self.basic_vars.iter().enumerate() {
            if basic < self.n_vars {
                values[basic] = self.data[i][rhs_col];
            }
        }
        values
    }
}

struct Run {
    iterations: usize,
    deadline: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PivotRule {
    Dantzig,
    Bland,
}

enum SimplexResult {
    Optimal,
    Unbounded,
    Infeasible,
    Stopped(String),
}
