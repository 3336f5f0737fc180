use serde::{Deserialize, Serialize};

use crate::catalogue::{Domain, DomainEffects, PolicyLever};

/// Scalar quantity the solver maximizes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Sum of all three domain effects.
    #[default]
    TotalBenefit,
    /// Population effect only.
    PopulationGrowth,
    /// Economic effect only.
    EconomicImpact,
    /// Livability effect only.
    LivabilityImprovement,
}

impl Objective {
    /// Label for logging.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::TotalBenefit => "total_benefit",
            Self::PopulationGrowth => "population_growth",
            Self::EconomicImpact => "economic_impact",
            Self::LivabilityImprovement => "livability_improvement",
        }
    }

    /// Domain targeted by a single-domain objective.
    #[must_use]
    pub const fn domain(self) -> Option<Domain> {
        match self {
            Self::TotalBenefit => None,
            Self::PopulationGrowth => Some(Domain::Population),
            Self::EconomicImpact => Some(Domain::Economic),
            Self::LivabilityImprovement => Some(Domain::Livability),
        }
    }

    /// Scores aggregate effects.
    #[must_use]
    pub fn evaluate(self, effects: &DomainEffects) -> f64 {
        self.domain()
            .map_or_else(|| effects.total(), |domain| effects.get(domain))
    }

    /// Objective gain per unit of `lever` intensity.
    #[must_use]
    pub fn coefficient(self, lever: &PolicyLever) -> f64 {
        self.evaluate(&lever.effect_coefficients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_single_and_total_domains() {
        let effects = DomainEffects::new(1.0, 2.0, 4.0);
        assert_eq!(Objective::TotalBenefit.evaluate(&effects), 7.0);
        assert_eq!(Objective::EconomicImpact.evaluate(&effects), 2.0);
        assert_eq!(Objective::LivabilityImprovement.evaluate(&effects), 4.0);
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&Objective::PopulationGrowth).unwrap();
        assert_eq!(json, "\"population_growth\"");
    }
}
