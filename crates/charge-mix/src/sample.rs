//! Reference cast-iron charge data: nine common raw materials, a target
//! table and the default hardness / tensile strength coefficients.

use crate::material::{ElementSet, RawMaterial, TargetRange};
use crate::property::DerivedProperty;
use crate::request::ChargeRequest;

pub const HARDNESS: &str = "Hardness";
pub const TENSILE_STRENGTH: &str = "Tensile Strength";

const ELEMENTS: [&str; 9] = ["C", "Si", "Mn", "S", "P", "Cu", "Ni", "Mo", "Cr"];

pub fn default_properties() -> Vec<DerivedProperty> {
    let hardness = [40.0, -15.0, 10.0, -5.0, -5.0, 4.0, 3.0, 2.0, 3.0];
    let tensile = [20.0, -10.0, 25.0, -10.0, -2.0, 5.0, 8.0, 5.0, 5.0];

    vec![
        coefficients(DerivedProperty::new(HARDNESS, 50.0), &hardness),
        coefficients(DerivedProperty::new(TENSILE_STRENGTH, 300.0), &tensile),
    ]
}

fn coefficients(mut property: DerivedProperty, values: &[f64; 9]) -> DerivedProperty {
    for (element, &value) in ELEMENTS.iter().zip(values) {
        property = property.with_coefficient(*element, value);
    }
    property
}

pub fn default_materials() -> Vec<RawMaterial> {
    // name, cost, then C Si Mn S P Cu Ni Mo Cr
    let rows: [(&str, f64, [f64; 9]); 9] = [
        ("HMS", 34.0, [2.5, 0.5, 0.3, 0.05, 0.02, 0.0, 0.0, 0.0, 0.0]),
        ("Shredded Scrap", 32.0, [3.0, 0.7, 0.5, 0.03, 0.015, 0.0, 0.0, 0.0, 0.0]),
        ("Pig Iron", 42.0, [4.0, 1.0, 0.1, 0.01, 0.01, 0.0, 0.0, 0.0, 0.0]),
        ("Ferro-Silicon", 120.0, [0.0, 75.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        ("Ferro-Manganese", 150.0, [0.0, 0.0, 70.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        ("FeSiMg", 210.0, [0.0, 50.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        ("Copper Scrap", 600.0, [0.0, 0.0, 0.0, 0.0, 0.0, 90.0, 0.0, 0.0, 0.0]),
        ("FeMo", 2200.0, [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 70.0, 10.0, 5.0]),
        ("Carburiser", 80.0, [90.0, 0.0, 0.0, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0]),
    ];

    rows.iter()
        .map(|(name, cost, content)| {
            let mut material = RawMaterial::new(*name, *cost);
            for (element, &pct) in ELEMENTS.iter().zip(content) {
                material = material.with_element(*element, pct);
            }
            material
        })
        .collect()
}

pub fn default_targets() -> Vec<TargetRange> {
    vec![
        TargetRange::new("C", 3.2, 3.6),
        TargetRange::new("Si", 1.5, 2.5),
        TargetRange::new("Mn", 0.5, 1.0),
        TargetRange::new("S", 0.01, 0.05),
        TargetRange::new("P", 0.01, 0.02),
        TargetRange::new("Cu", 0.05, 0.5),
        TargetRange::new("Ni", 0.0, 0.2),
        TargetRange::new("Mo", 0.0, 0.1),
        TargetRange::new("Cr", 0.0, 0.1),
        TargetRange::new(HARDNESS, 180.0, 220.0),
        TargetRange::new(TENSILE_STRENGTH, 300.0, 350.0),
    ]
}

impl ChargeRequest {
    /// The reference charge: default materials and targets, all elements
    /// selected, 10 t furnace, no extra material bounds
    pub fn sample() -> Self {
        Self {
            materials: default_materials(),
            targets: default_targets(),
            furnace_size: 10.0,
            elements: Some(ElementSet::new(ELEMENTS)),
            bounds: Vec::new(),
        }
    }
}
