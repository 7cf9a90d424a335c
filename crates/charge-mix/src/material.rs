use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A raw material that can be charged into the furnace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMaterial {
    pub name: String,
    /// Cost per mass unit. `None` is a missing cell and is substituted
    /// with the configured default when the request is validated.
    #[serde(default)]
    pub cost: Option<f64>,
    /// Element symbol -> mass percentage (0-100). Absent elements are 0.
    #[serde(default)]
    pub composition: BTreeMap<String, f64>,
}

impl RawMaterial {
    pub fn new(name: impl Into<String>, cost: f64) -> Self {
        Self {
            name: name.into(),
            cost: Some(cost),
            composition: BTreeMap::new(),
        }
    }

    pub fn with_element(mut self, symbol: impl Into<String>, percentage: f64) -> Self {
        self.composition.insert(symbol.into(), percentage);
        self
    }

    /// Mass percentage of `element`, 0 when not listed
    pub fn percentage(&self, element: &str) -> f64 {
        self.composition.get(element).copied().unwrap_or(0.0)
    }
}

/// Allowed range of an element (weight percent) or a derived property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRange {
    pub property: String,
    pub min: f64,
    pub max: f64,
}

impl TargetRange {
    pub fn new(property: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            property: property.into(),
            min,
            max,
        }
    }

    pub fn contains(&self, value: f64, tolerance: f64) -> bool {
        value >= self.min - tolerance && value <= self.max + tolerance
    }
}

/// Usage limits for one raw material, in mass units or furnace fractions
/// depending on the configured bound units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialBound {
    pub material: String,
    #[serde(default)]
    pub min: f64,
    /// `None` leaves the default upper limit (the whole furnace)
    #[serde(default)]
    pub max: Option<f64>,
}

impl MaterialBound {
    pub fn new(material: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            material: material.into(),
            min,
            max: Some(max),
        }
    }

    pub fn at_least(material: impl Into<String>, min: f64) -> Self {
        Self {
            material: material.into(),
            min,
            max: None,
        }
    }
}

/// Ordered set of element symbols under optimization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementSet(Vec<String>);

impl ElementSet {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(symbols.into_iter().map(Into::into).collect())
    }

    /// Every symbol listed by any material, sorted
    pub fn from_materials(materials: &[RawMaterial]) -> Self {
        let mut symbols: Vec<String> = materials
            .iter()
            .flat_map(|m| m.composition.keys().cloned())
            .collect();
        symbols.sort();
        symbols.dedup();
        Self(symbols)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.0.iter().any(|s| s == symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}
