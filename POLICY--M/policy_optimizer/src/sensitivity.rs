//! One-at-a-time sensitivity of the optimum to cost, budget, and effect inputs.
//!
//! Every perturbation runs on its own copy of the catalogue or constraints, so
//! the caller's values are untouched whether the analysis succeeds or fails.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    catalogue::LeverCatalogue,
    constraints::Constraints,
    error::PolicyError,
    objective::Objective,
    result::{EffectRange, OptimizationResult},
    solver::{AllocationSolver, Strategy},
};

/// Relative perturbation applied to each parameter family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct VariationFractions {
    /// Unit-cost perturbation (default 0.2).
    #[serde(default = "default_cost_fraction")]
    pub cost: f64,
    /// Effect-coefficient perturbation (default 0.2).
    #[serde(default = "default_effect_fraction")]
    pub effect: f64,
    /// Total-budget perturbation (default 0.1).
    #[serde(default = "default_budget_fraction")]
    pub budget: f64,
}

impl Default for VariationFractions {
    fn default() -> Self {
        Self {
            cost: default_cost_fraction(),
            effect: default_effect_fraction(),
            budget: default_budget_fraction(),
        }
    }
}

impl VariationFractions {
    /// Every fraction must lie strictly between 0 and 1.
    pub fn validate(&self) -> Result<(), PolicyError> {
        for (parameter, value) in [
            ("cost", self.cost),
            ("effect", self.effect),
            ("budget", self.budget),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(PolicyError::InvalidVariation { parameter, value });
            }
        }
        Ok(())
    }
}

const fn default_cost_fraction() -> f64 {
    0.2
}

const fn default_effect_fraction() -> f64 {
    0.2
}

const fn default_budget_fraction() -> f64 {
    0.1
}

/// Response of the optimum to one lever's unit cost.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostSensitivity {
    /// Re-optimized objective with the cost raised.
    pub high_cost_objective: f64,
    /// Re-optimized objective with the cost lowered.
    pub low_cost_objective: f64,
    /// `(low − high) / (2 · fraction)`.
    pub sensitivity: f64,
}

/// Response of the optimum to the total budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetSensitivity {
    /// Re-optimized objective with the budget raised.
    pub high_budget_objective: f64,
    /// Re-optimized objective with the budget lowered.
    pub low_budget_objective: f64,
    /// `(high − low) / (2 · fraction)`.
    pub elasticity: f64,
}

/// Closed-form contribution of one lever to the base objective.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectSensitivity {
    /// `intensity · objective coefficient`.
    pub contribution: f64,
    /// Share of the base objective; zero when the base objective is zero.
    pub relative_importance: f64,
    /// Contribution with the coefficients moved by `±fraction.effect`.
    pub contribution_range: EffectRange,
}

/// Outcome of [`SensitivityAnalyzer::analyze`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensitivityReport {
    /// Objective that was re-optimized.
    pub objective: Objective,
    /// Strategy used for every re-optimization.
    pub strategy: Strategy,
    /// Fractions applied.
    pub fractions: VariationFractions,
    /// Objective value of the analyzed result.
    pub base_objective: f64,
    /// Per-lever cost response, for levers with positive intensity.
    pub cost_sensitivity: IndexMap<String, CostSensitivity>,
    /// Budget response.
    pub budget_sensitivity: BudgetSensitivity,
    /// Per-lever effect contribution, for levers with positive intensity.
    pub effect_sensitivity: IndexMap<String, EffectSensitivity>,
}

/// Re-solves perturbed copies of a problem.
#[derive(Debug, Clone, Default)]
pub struct SensitivityAnalyzer {
    solver: AllocationSolver,
}

impl SensitivityAnalyzer {
    /// Creates an analyzer that re-optimizes with `solver`.
    #[must_use]
    pub const fn new(solver: AllocationSolver) -> Self {
        Self { solver }
    }

    /// Analyzes `base` using its own objective, strategy, and constraints.
    pub fn analyze(
        &self,
        catalogue: &LeverCatalogue,
        base: &OptimizationResult,
        fractions: &VariationFractions,
    ) -> Result<SensitivityReport, PolicyError> {
        fractions.validate()?;
        let objective = base.objective;
        let strategy = base.strategy;
        let resolve = |catalogue: &LeverCatalogue, constraints: &Constraints| {
            self.solver
                .optimize(catalogue, objective, constraints, strategy)
                .map(|result| result.objective_value)
        };

        let mut cost_sensitivity = IndexMap::new();
        let mut effect_sensitivity = IndexMap::new();
        for (id, intensity) in base.allocation.active() {
            let lever = catalogue.get(id)?;

            let raised = catalogue.with_cost(id, lever.cost_per_unit * (1.0 + fractions.cost))?;
            let lowered = catalogue.with_cost(id, lever.cost_per_unit * (1.0 - fractions.cost))?;
            let high = resolve(&raised, &base.constraints)?;
            let low = resolve(&lowered, &base.constraints)?;
            cost_sensitivity.insert(
                id.to_string(),
                CostSensitivity {
                    high_cost_objective: high,
                    low_cost_objective: low,
                    sensitivity: (low - high) / (2.0 * fractions.cost),
                },
            );

            let contribution = intensity * objective.coefficient(lever);
            let relative_importance = if base.objective_value.abs() > f64::EPSILON {
                contribution / base.objective_value
            } else {
                0.0
            };
            effect_sensitivity.insert(
                id.to_string(),
                EffectSensitivity {
                    contribution,
                    relative_importance,
                    contribution_range: EffectRange::around(contribution, fractions.effect),
                },
            );
        }

        let total = base.constraints.total_budget;
        let high = resolve(
            catalogue,
            &base.constraints.with_total_budget(total * (1.0 + fractions.budget)),
        )?;
        let low = resolve(
            catalogue,
            &base.constraints.with_total_budget(total * (1.0 - fractions.budget)),
        )?;

        Ok(SensitivityReport {
            objective,
            strategy,
            fractions: *fractions,
            base_objective: base.objective_value,
            cost_sensitivity,
            budget_sensitivity: BudgetSensitivity {
                high_budget_objective: high,
                low_budget_objective: low,
                elasticity: (high - low) / (2.0 * fractions.budget),
            },
            effect_sensitivity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        allocation::Allocation,
        catalogue::{DomainEffects, PolicyLever},
    };

    fn two_lever() -> LeverCatalogue {
        LeverCatalogue::new([
            PolicyLever::new("a", 1.0, DomainEffects::new(2.0, 0.0, 0.0), 10.0, 1),
            PolicyLever::new("b", 2.0, DomainEffects::new(0.0, 5.0, 0.0), 5.0, 2),
        ])
        .unwrap()
    }

    fn base(catalogue: &LeverCatalogue, total: f64) -> OptimizationResult {
        AllocationSolver::default()
            .optimize(
                catalogue,
                Objective::TotalBenefit,
                &Constraints::default().with_total_budget(total),
                Strategy::Exact,
            )
            .unwrap()
    }

    #[test]
    fn reports_cost_budget_and_effect_response() {
        let catalogue = two_lever();
        let base = base(&catalogue, 10.0);
        let report = SensitivityAnalyzer::default()
            .analyze(&catalogue, &base, &VariationFractions::default())
            .unwrap();
        assert!((report.base_objective - 25.0).abs() < 1e-9);

        // b at cost 2.4 → 10/2.4 · 5 ≈ 20.83; at 1.6 → capped at 5 (25) then a gets 2 → 29
        let b = &report.cost_sensitivity["b"];
        assert!((b.high_cost_objective - 10.0 / 2.4 * 5.0).abs() < 1e-9);
        assert!((b.low_cost_objective - 29.0).abs() < 1e-9);
        assert!(b.sensitivity > 0.0);
        assert!(!report.cost_sensitivity.contains_key("a"));

        // budget 11 → 25 + 2 = 27; budget 9 → 22.5
        let budget = &report.budget_sensitivity;
        assert!((budget.high_budget_objective - 27.0).abs() < 1e-9);
        assert!((budget.low_budget_objective - 22.5).abs() < 1e-9);
        assert!((budget.elasticity - 4.5 / 0.2).abs() < 1e-9);

        let effect = &report.effect_sensitivity["b"];
        assert!((effect.contribution - 25.0).abs() < 1e-9);
        assert!((effect.relative_importance - 1.0).abs() < 1e-9);
        assert!((effect.contribution_range.low - 20.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_out_of_range_fractions() {
        let catalogue = two_lever();
        let base = base(&catalogue, 10.0);
        for fractions in [
            VariationFractions {
                cost: 0.0,
                ..VariationFractions::default()
            },
            VariationFractions {
                budget: 1.0,
                ..VariationFractions::default()
            },
            VariationFractions {
                effect: f64::NAN,
                ..VariationFractions::default()
            },
        ] {
            let err = SensitivityAnalyzer::default()
                .analyze(&catalogue, &base, &fractions)
                .unwrap_err();
            assert!(matches!(err, PolicyError::InvalidVariation { .. }));
        }
    }

    #[test]
    fn catalogue_is_untouched_on_success() {
        let catalogue = LeverCatalogue::regional_default();
        let snapshot = catalogue.clone();
        let base = base(&catalogue, 60.0);
        SensitivityAnalyzer::default()
            .analyze(&catalogue, &base, &VariationFractions::default())
            .unwrap();
        assert_eq!(catalogue, snapshot);
    }

    #[test]
    fn catalogue_is_untouched_when_reoptimization_fails() {
        let catalogue = LeverCatalogue::new([
            PolicyLever::new("capped", 1.0, DomainEffects::new(1.0, 0.0, 0.0), 5.0, 1),
            PolicyLever::new("open", 1.0, DomainEffects::new(1.0, 0.0, 0.0), f64::INFINITY, 1),
        ])
        .unwrap();
        let snapshot = catalogue.clone();
        let mut base = base(&catalogue, 10.0);
        base.strategy = Strategy::Stochastic;
        base.allocation = Allocation::from_pairs([("capped", 5.0), ("open", 5.0)]).unwrap();
        let err = SensitivityAnalyzer::default()
            .analyze(&catalogue, &base, &VariationFractions::default())
            .unwrap_err();
        assert_eq!(err, PolicyError::UnboundedSearchSpace("open".into()));
        assert_eq!(catalogue, snapshot);
    }

    #[test]
    fn unknown_lever_in_base_is_fatal() {
        let catalogue = two_lever();
        let mut base = base(&catalogue, 10.0);
        base.allocation = Allocation::from_pairs([("ghost", 1.0)]).unwrap();
        let err = SensitivityAnalyzer::default()
            .analyze(&catalogue, &base, &VariationFractions::default())
            .unwrap_err();
        assert_eq!(err, PolicyError::UnknownLever("ghost".into()));
    }
}
