use crate::error::InputError;
use crate::material::TargetRange;

impl TargetRange {
    /// Range widened by `factor` of each bound's magnitude. For non-negative
    /// bounds this is `min * (1 - factor)` and `max * (1 + factor)`; negative
    /// bounds still move outward.
    pub fn widened(&self, factor: f64) -> TargetRange {
        TargetRange {
            property: self.property.clone(),
            min: self.min - self.min.abs() * factor,
            max: self.max + self.max.abs() * factor,
        }
    }
}

pub fn check_factor(factor: f64) -> Result<(), InputError> {
    if (0.0..1.0).contains(&factor) {
        Ok(())
    } else {
        Err(InputError::InvalidRelaxationFactor(factor))
    }
}

/// Widen every target range by `factor`
pub fn relax(targets: &[TargetRange], factor: f64) -> Result<Vec<TargetRange>, InputError> {
    check_factor(factor)?;
    Ok(targets.iter().map(|t| t.widened(factor)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relax_widens_both_sides() {
        let relaxed = relax(&[TargetRange::new("C", 3.2, 3.6)], 0.05).unwrap();
        assert!((relaxed[0].min - 3.04).abs() < 1e-12, "min = {}", relaxed[0].min);
        assert!((relaxed[0].max - 3.78).abs() < 1e-12, "max = {}", relaxed[0].max);
        assert_eq!(relaxed[0].property, "C");
    }

    #[test]
    fn test_relaxed_range_contains_original() {
        let targets = vec![
            TargetRange::new("Hardness", -20.0, -5.0),
            TargetRange::new("Si", 0.0, 0.0),
            TargetRange::new("Mn", 0.5, 1.0),
        ];
        for (before, after) in targets.iter().zip(relax(&targets, 0.1).unwrap()) {
            assert!(after.min <= before.min && after.max >= before.max, "{:?} -> {:?}", before, after);
        }
    }

    #[test]
    fn test_zero_factor_is_identity() {
        let targets = vec![TargetRange::new("C", 3.2, 3.6)];
        assert_eq!(relax(&targets, 0.0).unwrap(), targets);
    }

    #[test]
    fn test_factor_out_of_range() {
        for factor in [-0.1, 1.0, f64::NAN] {
            assert!(matches!(
                relax(&[], factor),
                Err(InputError::InvalidRelaxationFactor(_))
            ));
        }
    }
}
