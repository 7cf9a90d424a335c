use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{BoundUnits, OptimizerConfig};
use crate::error::{ChargeError, InputError};
use crate::material::{ElementSet, MaterialBound, RawMaterial, TargetRange};

/// One optimization request as supplied by the front end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub materials: Vec<RawMaterial>,
    #[serde(default)]
    pub targets: Vec<TargetRange>,
    pub furnace_size: f64,
    /// Elements to optimize over; every element in the material data when absent
    #[serde(default)]
    pub elements: Option<ElementSet>,
    #[serde(default)]
    pub bounds: Vec<MaterialBound>,
}

/// A request that passed validation, with defaults substituted and target
/// ranges split into active element and derived-property targets
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub materials: Vec<RawMaterial>,
    /// Cost per material, missing cells already substituted
    pub costs: Vec<f64>,
    pub elements: ElementSet,
    /// Targets on selected elements, in element-set order
    pub element_targets: Vec<TargetRange>,
    /// Targets on derived properties, in property-model order
    pub property_targets: Vec<TargetRange>,
    pub furnace_size: f64,
    /// Per material `(min, max)` as supplied, `None` where not given
    pub bounds: Vec<Option<(f64, Option<f64>)>>,
}

impl ChargeRequest {
    pub fn from_json_str(s: &str) -> Result<Self, ChargeError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ChargeError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json_pretty(&self) -> Result<String, ChargeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every table against `config` and produce the snapshot the
    /// builder works from
    pub fn validate(&self, config: &OptimizerConfig) -> Result<ValidatedRequest, InputError> {
        if !(self.furnace_size.is_finite() && self.furnace_size > 0.0) {
            return Err(InputError::InvalidFurnaceSize(self.furnace_size));
        }
        if self.materials.is_empty() {
            return Err(InputError::NoMaterials);
        }

        let mut names = HashSet::new();
        let mut costs = Vec::with_capacity(self.materials.len());
        for (i, m) in self.materials.iter().enumerate() {
            if m.name.trim().is_empty() {
                return Err(InputError::EmptyMaterialName(i));
            }
            if !names.insert(m.name.as_str()) {
                return Err(InputError::DuplicateMaterial(m.name.clone()));
            }
            for (element, &value) in &m.composition {
                if !(0.0..=100.0).contains(&value) {
                    return Err(InputError::InvalidPercentage {
                        material: m.name.clone(),
                        element: element.clone(),
                        value,
                    });
                }
            }
            costs.push(resolve_cost(m, config.missing_cost)?);
        }

        let known = ElementSet::from_materials(&self.materials);
        let elements = match &self.elements {
            Some(selected) => {
                let mut seen = HashSet::new();
                for e in selected.iter() {
                    if !known.contains(e) {
                        return Err(InputError::UnknownElement(e.to_string()));
                    }
                    if !seen.insert(e) {
                        return Err(InputError::DuplicateElement(e.to_string()));
                    }
                }
                selected.clone()
            }
            None => known.clone(),
        };

        let (element_targets, property_targets) = self.split_targets(config, &known, &elements)?;
        let bounds = self.resolve_bounds(config.bound_units)?;

        Ok(ValidatedRequest {
            materials: self.materials.clone(),
            costs,
            elements,
            element_targets,
            property_targets,
            furnace_size: self.furnace_size,
            bounds,
        })
    }

    fn split_targets(
        &self,
        config: &OptimizerConfig,
        known: &ElementSet,
        elements: &ElementSet,
    ) -> Result<(Vec<TargetRange>, Vec<TargetRange>), InputError> {
        let model = &config.property_model;
        let mut seen = HashSet::new();

        for t in &self.targets {
            if !seen.insert(t.property.as_str()) {
                return Err(InputError::DuplicateTarget(t.property.clone()));
            }
            if !(t.min.is_finite() && t.max.is_finite()) || t.min > t.max {
                return Err(InputError::InvalidTargetRange {
                    property: t.property.clone(),
                    min: t.min,
                    max: t.max,
                });
            }
            if !known.contains(&t.property) && !model.is_derived(&t.property) {
                return Err(InputError::UnknownProperty(t.property.clone()));
            }
            if known.contains(&t.property) && !elements.contains(&t.property) {
                debug!(event = "target_ignored", property = %t.property, "element not selected");
            }
        }

        let find = |name: &str| self.targets.iter().find(|t| t.property == name).cloned();
        let element_targets = elements.iter().filter_map(&find).collect();
        let property_targets = model.names().filter_map(&find).collect();

        Ok((element_targets, property_targets))
    }

    fn resolve_bounds(&self, units: BoundUnits) -> Result<Vec<Option<(f64, Option<f64>)>>, InputError> {
        let mut resolved = vec![None; self.materials.len()];

        for b in &self.bounds {
            let index = self
                .materials
                .iter()
                .position(|m| m.name == b.material)
                .ok_or_else(|| InputError::UnknownMaterialBound(b.material.clone()))?;
            if resolved[index].is_some() {
                return Err(InputError::DuplicateBound(b.material.clone()));
            }

            let invalid = || InputError::InvalidBound {
                material: b.material.clone(),
                min: b.min,
                max: b.max.unwrap_or(f64::INFINITY),
            };
            if !b.min.is_finite() || b.min < 0.0 {
                return Err(invalid());
            }
            if let Some(max) = b.max {
                if !max.is_finite() || b.min > max {
                    return Err(invalid());
                }
                if units == BoundUnits::Fraction && max > 1.0 {
                    return Err(invalid());
                }
            }
            if units == BoundUnits::Fraction && b.min > 1.0 {
                return Err(invalid());
            }

            resolved[index] = Some((b.min, b.max));
        }

        Ok(resolved)
    }
}

/// Missing or NaN cost becomes `default`; infinite cost is rejected
fn resolve_cost(material: &RawMaterial, default: f64) -> Result<f64, InputError> {
    match material.cost {
        Some(cost) if cost.is_finite() => Ok(cost),
        Some(cost) if cost.is_infinite() => Err(InputError::InvalidCost {
            material: material.name.clone(),
            value: cost,
        }),
        _ => {
            warn!(event = "cost_substituted", material = %material.name, cost = default);
            Ok(default)
        }
    }
}

impl ValidatedRequest {
    pub fn num_materials(&self) -> usize {
        self.materials.len()
    }

    pub fn material_names(&self) -> Vec<String> {
        self.materials.iter().map(|m| m.name.clone()).collect()
    }

    /// All active targets, elements first
    pub fn targets(&self) -> impl Iterator<Item = &TargetRange> {
        self.element_targets.iter().chain(&self.property_targets)
    }
}
