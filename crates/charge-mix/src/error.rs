use thiserror::Error;

use crate::config::ConfigError;
use crate::property::EvaluationMode;

/// Malformed request data, rejected before any constraint is built
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("No raw materials supplied")]
    NoMaterials,
    #[error("Raw material #{0} has an empty name")]
    EmptyMaterialName(usize),
    #[error("Duplicate raw material: {0}")]
    DuplicateMaterial(String),
    #[error("Invalid cost {value} for {material}")]
    InvalidCost { material: String, value: f64 },
    #[error("Invalid percentage {value} of {element} in {material} (expected 0 to 100)")]
    InvalidPercentage {
        material: String,
        element: String,
        value: f64,
    },
    #[error("Furnace size must be a positive number, got {0}")]
    InvalidFurnaceSize(f64),
    #[error("Duplicate target range for {0}")]
    DuplicateTarget(String),
    #[error("Invalid target range for {property}: min {min}, max {max}")]
    InvalidTargetRange { property: String, min: f64, max: f64 },
    #[error("Target range for unknown property: {0}")]
    UnknownProperty(String),
    #[error("Selected element {0} does not appear in any raw material")]
    UnknownElement(String),
    #[error("Element {0} selected more than once")]
    DuplicateElement(String),
    #[error("Bounds given for unknown raw material: {0}")]
    UnknownMaterialBound(String),
    #[error("Duplicate bounds for {0}")]
    DuplicateBound(String),
    #[error("Invalid bounds for {material}: min {min}, max {max}")]
    InvalidBound { material: String, min: f64, max: f64 },
    #[error("Relaxation factor must be within [0, 1), got {0}")]
    InvalidRelaxationFactor(f64),
}

#[derive(Error, Debug)]
pub enum ChargeError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InputError),
    #[error("Property model convention mismatch: built in {built} mode, interpreted in {interpreted} mode")]
    ConventionMismatch {
        built: EvaluationMode,
        interpreted: EvaluationMode,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
