//! Age adjustment of per-capita excess rates.
//!
//! A population with an older mean age at death would, at equal underlying
//! infection rates, show proportionally higher mortality. Rescaling every
//! jurisdiction to a common reference age isolates variables other than age
//! structure from the per-capita comparison.

use serde::{Deserialize, Serialize};

/// Age-adjustment configuration. Disabled by default; the defaults model an
/// infection fatality rate growing 11.5% per year of age, normalized to a
/// reference age of 74.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgeAdjustment {
    pub enabled: bool,
    pub reference_age: f64,
    pub ifr_growth_per_year: f64,
}

impl Default for AgeAdjustment {
    fn default() -> Self {
        Self {
            enabled: false,
            reference_age: 74.0,
            ifr_growth_per_year: 1.115,
        }
    }
}

impl AgeAdjustment {
    /// Multiplicative factor for a jurisdiction whose mean age at death is
    /// `mean_death_age`. Exactly 1 when adjustment is disabled or the mean
    /// equals the reference age.
    pub fn factor(&self, mean_death_age: f64) -> f64 {
        if !self.enabled {
            return 1.0;
        }
        self.ifr_growth_per_year
            .powf(self.reference_age - mean_death_age)
    }

    pub fn adjust(&self, rate: f64, mean_death_age: f64) -> f64 {
        rate * self.factor(mean_death_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled() -> AgeAdjustment {
        AgeAdjustment {
            enabled: true,
            ..AgeAdjustment::default()
        }
    }

    #[test]
    fn test_identity_at_reference_age() {
        // powf(0) == 1 exactly, for any growth factor.
        for growth in [1.0, 1.115, 2.0] {
            let adj = AgeAdjustment {
                enabled: true,
                reference_age: 74.0,
                ifr_growth_per_year: growth,
            };
            assert_eq!(adj.adjust(1234.5, 74.0), 1234.5);
        }
    }

    #[test]
    fn test_disabled_is_a_no_op() {
        let adj = AgeAdjustment::default();
        assert_eq!(adj.factor(90.0), 1.0);
        assert_eq!(adj.adjust(500.0, 60.0), 500.0);
    }

    #[test]
    fn test_older_population_scales_down() {
        // Deaths skewed older than the reference are discounted, younger
        // ones inflated.
        let adj = enabled();
        assert!(adj.factor(80.0) < 1.0);
        assert!(adj.factor(70.0) > 1.0);
    }

    #[test]
    fn test_known_factor() {
        let adj = enabled();
        let expected = 1.115f64.powf(4.0);
        assert!((adj.factor(70.0) - expected).abs() < 1e-12);
    }
}
