//! Optimizer configuration.
//!
//! Every axis along which charge sheets differ lives here: property
//! evaluation mode, bound units and relaxation. Load it from TOML to change
//! behaviour without code changes; absent keys keep their defaults.
//!
//! ```
//! use charge_mix::{BoundUnits, EvaluationMode, OptimizerConfig};
//!
//! let config = OptimizerConfig::from_toml_str(r#"
//!     bound_units = "fraction"
//!
//!     [relaxation]
//!     enabled = true
//!     factor = 0.1
//! "#).unwrap();
//!
//! assert_eq!(config.bound_units, BoundUnits::Fraction);
//! assert!(config.relaxation.enabled);
//! assert_eq!(config.property_model.mode, EvaluationMode::Average);
//! ```

use std::path::Path;
use std::time::Duration;

use charge_solver::Solver;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::property::{EvaluationMode, PropertyModel};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Unit of per-material bounds and, with it, of the decision variables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundUnits {
    /// Bounds and variables are masses; the furnace holds `furnace_size`
    #[default]
    Mass,
    /// Bounds and variables are fractions of the furnace; the furnace holds 1
    Fraction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaxationConfig {
    pub enabled: bool,
    /// Relative widening applied to every target range
    pub factor: f64,
}

impl Default for RelaxationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            factor: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub max_iterations: usize,
    /// Pivoting tolerance
    pub tolerance: f64,
    /// Relative tolerance for accepting a solution as feasible
    pub feasibility_tolerance: f64,
    /// Wall-clock limit per solve; expiry counts as a failed solve
    pub time_limit_ms: Option<u64>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10000,
            tolerance: 1e-9,
            feasibility_tolerance: 1e-6,
            time_limit_ms: None,
        }
    }
}

impl SolverSettings {
    pub fn solver(&self) -> Solver {
        let solver = Solver::new()
            .with_max_iterations(self.max_iterations)
            .with_tolerance(self.tolerance)
            .with_feasibility_tolerance(self.feasibility_tolerance * 0.1);
        match self.time_limit_ms {
            Some(ms) => solver.with_time_limit(Duration::from_millis(ms)),
            None => solver,
        }
    }
}

/// Presentation-only unit conversion of the output table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayUnits {
    pub mass_unit: String,
    pub secondary_unit: String,
    pub secondary_factor: f64,
}

impl Default for DisplayUnits {
    fn default() -> Self {
        Self {
            mass_unit: "t".to_string(),
            secondary_unit: "kg".to_string(),
            secondary_factor: 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub property_model: PropertyModel,
    pub bound_units: BoundUnits,
    pub relaxation: RelaxationConfig,
    pub solver: SolverSettings,
    /// Cost used for materials whose cost cell is missing or NaN
    pub missing_cost: f64,
    pub display: DisplayUnits,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            property_model: PropertyModel::default(),
            bound_units: BoundUnits::Mass,
            relaxation: RelaxationConfig::default(),
            solver: SolverSettings::default(),
            missing_cost: 0.0,
            display: DisplayUnits::default(),
        }
    }
}

impl OptimizerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.property_model.mode = mode;
        self
    }

    pub fn with_bound_units(mut self, units: BoundUnits) -> Self {
        self.bound_units = units;
        self
    }

    pub fn with_relaxation(mut self, factor: f64) -> Self {
        self.relaxation = RelaxationConfig {
            enabled: true,
            factor,
        };
        self
    }

    pub fn with_property_model(mut self, model: PropertyModel) -> Self {
        self.property_model = model;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let factor = self.relaxation.factor;
        if !(0.0..1.0).contains(&factor) {
            return Err(ConfigError::Invalid(format!(
                "relaxation.factor must be within [0, 1), got {}",
                factor
            )));
        }
        if !(self.solver.tolerance > 0.0 && self.solver.feasibility_tolerance > 0.0) {
            return Err(ConfigError::Invalid("solver tolerances must be positive".to_string()));
        }
        if !self.missing_cost.is_finite() {
            return Err(ConfigError::Invalid("missing_cost must be finite".to_string()));
        }
        if !(self.display.secondary_factor > 0.0) {
            return Err(ConfigError::Invalid(
                "display.secondary_factor must be positive".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for p in &self.property_model.properties {
            if !seen.insert(p.name.as_str()) {
                return Err(ConfigError::Invalid(format!("derived property {} defined twice", p.name)));
            }
            if !p.constant.is_finite() || p.coefficients.values().any(|c| !c.is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "derived property {} has a non-finite coefficient",
                    p.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OptimizerConfig::default();
        assert_eq!(config.property_model.mode, EvaluationMode::Average);
        assert_eq!(config.bound_units, BoundUnits::Mass);
        assert!(!config.relaxation.enabled);
        assert_eq!(config.relaxation.factor, 0.05);
        assert_eq!(config.missing_cost, 0.0);
        assert_eq!(config.property_model.properties.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_parsing() {
        let toml = r#"
            bound_units = "fraction"
            missing_cost = 5.0

            [relaxation]
            enabled = true
            factor = 0.1

            [solver]
            max_iterations = 500
            time_limit_ms = 2000

            [property_model]
            mode = "absolute"

            [[property_model.properties]]
            name = "Hardness"
            constant = 50.0
            coefficients = { C = 40.0, Si = -15.0 }
        "#;

        let config = OptimizerConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.bound_units, BoundUnits::Fraction);
        assert_eq!(config.missing_cost, 5.0);
        assert_eq!(config.relaxation.factor, 0.1);
        assert_eq!(config.solver.max_iterations, 500);
        assert_eq!(config.solver.time_limit_ms, Some(2000));
        assert_eq!(config.solver.tolerance, 1e-9);
        assert_eq!(config.property_model.mode, EvaluationMode::Absolute);
        assert_eq!(config.property_model.properties.len(), 1);
        assert_eq!(config.property_model.properties[0].coefficient("Si"), -15.0);
    }

    #[test]
    fn test_partial_property_model_keeps_default_properties() {
        let config = OptimizerConfig::from_toml_str("[property_model]\nmode = \"absolute\"\n").unwrap();
        assert_eq!(config.property_model.mode, EvaluationMode::Absolute);
        assert_eq!(config.property_model.properties.len(), 2);
    }

    #[test]
    fn test_invalid_relaxation_factor() {
        let result = OptimizerConfig::from_toml_str("[relaxation]\nfactor = 1.5\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_duplicate_property_rejected() {
        let toml = r#"
            [[property_model.properties]]
            name = "Hardness"
            [[property_model.properties]]
            name = "Hardness"
        "#;
        assert!(matches!(
            OptimizerConfig::from_toml_str(toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_builder() {
        let config = OptimizerConfig::new()
            .with_mode(EvaluationMode::Absolute)
            .with_bound_units(BoundUnits::Fraction)
            .with_relaxation(0.02);
        assert_eq!(config.property_model.mode(), EvaluationMode::Absolute);
        assert_eq!(config.bound_units, BoundUnits::Fraction);
        assert!(config.relaxation.enabled);
    }
}
