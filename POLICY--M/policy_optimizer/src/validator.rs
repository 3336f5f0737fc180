use serde::{Deserialize, Serialize};

use crate::{
    catalogue::{Domain, DomainEffects, LeverCatalogue},
    result::{EffectRange, EffectUncertainty, OptimizationResult, SolveStatus},
    solver::budget_slack,
};

/// Relative half-width of the uncertainty band per domain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UncertaintyBands {
    /// Population band (default ±20%).
    #[serde(default = "default_population_band")]
    pub population: f64,
    /// Economic band (default ±30%).
    #[serde(default = "default_economic_band")]
    pub economic: f64,
    /// Livability band (default ±10%).
    #[serde(default = "default_livability_band")]
    pub livability: f64,
}

impl Default for UncertaintyBands {
    fn default() -> Self {
        Self {
            population: default_population_band(),
            economic: default_economic_band(),
            livability: default_livability_band(),
        }
    }
}

impl UncertaintyBands {
    /// Ratio for `domain`.
    #[must_use]
    pub const fn ratio(&self, domain: Domain) -> f64 {
        match domain {
            Domain::Population => self.population,
            Domain::Economic => self.economic,
            Domain::Livability => self.livability,
        }
    }

    /// Band around each domain of `effects`.
    #[must_use]
    pub fn around(&self, effects: &DomainEffects) -> EffectUncertainty {
        EffectUncertainty {
            population: EffectRange::around(effects.population, self.population),
            economic: EffectRange::around(effects.economic, self.economic),
            livability: EffectRange::around(effects.livability, self.livability),
        }
    }
}

const fn default_population_band() -> f64 {
    0.2
}

const fn default_economic_band() -> f64 {
    0.3
}

const fn default_livability_band() -> f64 {
    0.1
}

/// Post-checks optimization results against the catalogue and their constraints.
#[derive(Debug, Clone, Default)]
pub struct FeasibilityValidator {
    bands: UncertaintyBands,
}

impl FeasibilityValidator {
    /// Creates a validator with the given uncertainty bands.
    #[must_use]
    pub const fn new(bands: UncertaintyBands) -> Self {
        Self { bands }
    }

    /// Bands in use.
    #[must_use]
    pub const fn bands(&self) -> &UncertaintyBands {
        &self.bands
    }

    /// Returns an annotated copy of `result`. Never fails.
    ///
    /// Cost, effects, and utilization are recomputed from the allocation and the
    /// violation list is rebuilt from scratch, so validating twice yields the
    /// same value.
    #[must_use]
    pub fn validate(
        &self,
        catalogue: &LeverCatalogue,
        result: &OptimizationResult,
    ) -> OptimizationResult {
        let constraints = &result.constraints;
        let mut violations = Vec::new();
        let mut total_cost = 0.0;
        let mut effects = DomainEffects::default();

        match result.status {
            SolveStatus::Infeasible => violations.push(
                "no allocation satisfies the budget at the required minimum intensity".to_string(),
            ),
            SolveStatus::Unbounded => violations
                .push("objective is unbounded: a lever lacks a finite intensity cap".to_string()),
            SolveStatus::Optimal | SolveStatus::Approximate => {}
        }

        for (id, intensity) in result.allocation.iter() {
            let Ok(lever) = catalogue.get(id) else {
                violations.push(format!("{id}: unknown policy lever"));
                continue;
            };
            total_cost += intensity * lever.cost_per_unit;
            effects.accumulate(&lever.effect_coefficients, intensity);
            if intensity > lever.max_intensity + budget_slack(lever.max_intensity) {
                violations.push(format!(
                    "{id}: intensity {intensity:.4} exceeds maximum {:.4}",
                    lever.max_intensity
                ));
            }
            if intensity + budget_slack(constraints.min_intensity) < constraints.min_intensity {
                violations.push(format!(
                    "{id}: intensity {intensity:.4} is below minimum {:.4}",
                    constraints.min_intensity
                ));
            }
        }

        if total_cost > constraints.total_budget + budget_slack(constraints.total_budget) {
            violations.push(format!(
                "total cost {total_cost:.4} exceeds budget {:.4}",
                constraints.total_budget
            ));
        }

        let budget_utilization = if constraints.total_budget > 0.0 {
            total_cost / constraints.total_budget * 100.0
        } else {
            0.0
        };

        OptimizationResult {
            total_cost,
            objective_value: result.objective.evaluate(&effects),
            predicted_effects: effects,
            budget_utilization,
            is_feasible: violations.is_empty(),
            violations,
            effect_uncertainty: self.bands.around(&effects),
            ..result.clone()
        }
    }
}
