//! Derived mechanical properties as affine functions of composition.
//!
//! Coefficients are expressed per weight-percent of an element, the unit of
//! the target table. A [`PropertyModel`] records its own [`EvaluationMode`],
//! so constraint building and result interpretation always agree on the
//! convention.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::material::{ElementSet, RawMaterial};

/// How a derived property responds to composition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// `constant + Σ coefficient[e] * average_percent[e]`.
    /// Independent of furnace size.
    #[default]
    Average,
    /// Legacy per-mass formulation: every unit of charged mass contributes
    /// `constant + Σ coefficient[e] * percent[e]`, so the value scales with
    /// the total mass. Kept for compatibility with older charge sheets.
    Absolute,
}

impl std::fmt::Display for EvaluationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluationMode::Average => write!(f, "average"),
            EvaluationMode::Absolute => write!(f, "absolute"),
        }
    }
}

/// One derived property, e.g. hardness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedProperty {
    pub name: String,
    #[serde(default)]
    pub constant: f64,
    /// Element symbol -> contribution per weight-percent
    #[serde(default)]
    pub coefficients: BTreeMap<String, f64>,
}

impl DerivedProperty {
    pub fn new(name: impl Into<String>, constant: f64) -> Self {
        Self {
            name: name.into(),
            constant,
            coefficients: BTreeMap::new(),
        }
    }

    pub fn with_coefficient(mut self, element: impl Into<String>, coefficient: f64) -> Self {
        self.coefficients.insert(element.into(), coefficient);
        self
    }

    pub fn coefficient(&self, element: &str) -> f64 {
        self.coefficients.get(element).copied().unwrap_or(0.0)
    }

    /// `Σ coefficient[e] * percent[e]` over the selected elements of one material
    fn material_contribution(&self, material: &RawMaterial, elements: &ElementSet) -> f64 {
        elements
            .iter()
            .map(|e| self.coefficient(e) * material.percentage(e))
            .sum()
    }
}

/// Derived properties and the convention they are evaluated in. Missing
/// fields fall back to the default (average mode, hardness and tensile
/// strength).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyModel {
    pub mode: EvaluationMode,
    pub properties: Vec<DerivedProperty>,
}

impl Default for PropertyModel {
    fn default() -> Self {
        Self {
            mode: EvaluationMode::Average,
            properties: crate::sample::default_properties(),
        }
    }
}

/// Element content of a blend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Composition {
    /// Total charged mass
    pub total_mass: f64,
    /// Element symbol -> absolute element mass
    pub element_mass: BTreeMap<String, f64>,
}

impl Composition {
    /// Composition of `masses[i]` of `materials[i]`, restricted to `elements`
    pub fn from_blend(materials: &[RawMaterial], masses: &[f64], elements: &ElementSet) -> Self {
        let element_mass = elements
            .iter()
            .map(|e| {
                let mass: f64 = materials
                    .iter()
                    .zip(masses)
                    .map(|(m, x)| x * m.percentage(e) / 100.0)
                    .sum();
                (e.to_string(), mass)
            })
            .collect();

        Self {
            total_mass: masses.iter().sum(),
            element_mass,
        }
    }

    pub fn absolute(&self, element: &str) -> f64 {
        self.element_mass.get(element).copied().unwrap_or(0.0)
    }

    /// Weight percent of `element` in the blend
    pub fn average_percent(&self, element: &str) -> f64 {
        if self.total_mass > 0.0 {
            100.0 * self.absolute(element) / self.total_mass
        } else {
            0.0
        }
    }
}

/// A derived property as a linear function of the decision variables:
/// `value = coefficients · x / divisor + offset`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearForm {
    pub coefficients: Vec<f64>,
    pub offset: f64,
    pub divisor: f64,
}

impl LinearForm {
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        let sum: f64 = self.coefficients.iter().zip(x).map(|(c, v)| c * v).sum();
        sum / self.divisor + self.offset
    }

    /// `value >= min` as a `a · x <= b` row
    pub fn lower_row(&self, min: f64) -> (Vec<f64>, f64) {
        (
            self.coefficients.iter().map(|c| -c).collect(),
            -(min - self.offset) * self.divisor,
        )
    }

    /// `value <= max` as a `a · x <= b` row
    pub fn upper_row(&self, max: f64) -> (Vec<f64>, f64) {
        (self.coefficients.clone(), (max - self.offset) * self.divisor)
    }
}

impl PropertyModel {
    pub fn new(mode: EvaluationMode, properties: Vec<DerivedProperty>) -> Self {
        Self { mode, properties }
    }

    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    pub fn property(&self, name: &str) -> Option<&DerivedProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn is_derived(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name.as_str())
    }

    /// Value of `property` for a blend with the given composition
    pub fn evaluate(&self, property: &str, composition: &Composition) -> Option<f64> {
        let p = self.property(property)?;
        let value = match self.mode {
            EvaluationMode::Average => {
                p.constant
                    + composition
                        .element_mass
                        .keys()
                        .map(|e| p.coefficient(e) * composition.average_percent(e))
                        .sum::<f64>()
            }
            EvaluationMode::Absolute => {
                p.constant * composition.total_mass
                    + composition
                        .element_mass
                        .iter()
                        .map(|(e, mass)| p.coefficient(e) * 100.0 * mass)
                        .sum::<f64>()
            }
        };
        Some(value)
    }

    /// Linear form of `property` over the material variables, for blends
    /// whose variables sum to `total`
    pub fn linear_form(
        &self,
        property: &str,
        materials: &[RawMaterial],
        elements: &ElementSet,
        total: f64,
    ) -> Option<LinearForm> {
        let p = self.property(property)?;
        let form = match self.mode {
            EvaluationMode::Average => LinearForm {
                coefficients: materials
                    .iter()
                    .map(|m| p.material_contribution(m, elements))
                    .collect(),
                offset: p.constant,
                divisor: total,
            },
            EvaluationMode::Absolute => LinearForm {
                coefficients: materials
                    .iter()
                    .map(|m| p.constant + p.material_contribution(m, elements))
                    .collect(),
                offset: 0.0,
                divisor: 1.0,
            },
        };
        Some(form)
    }
}
