use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    allocation::Allocation,
    catalogue::{Domain, DomainEffects},
    constraints::Constraints,
    objective::Objective,
    solver::Strategy,
};

/// Terminal state of a solve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// Provable optimum (exact) or converged search (stochastic).
    Optimal,
    /// No allocation satisfies the constraints.
    Infeasible,
    /// The objective grows without bound.
    Unbounded,
    /// Best-effort incumbent; treat as a recommendation.
    Approximate,
}

impl SolveStatus {
    /// Label for logging.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Optimal => "optimal",
            Self::Infeasible => "infeasible",
            Self::Unbounded => "unbounded",
            Self::Approximate => "approximate",
        }
    }

    /// Whether downstream scheduling and analysis may consume the result.
    #[must_use]
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Optimal | Self::Approximate)
    }
}

/// Closed interval around a predicted effect.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct EffectRange {
    /// Lower end.
    pub low: f64,
    /// Upper end.
    pub high: f64,
}

impl EffectRange {
    /// Band of `±ratio` around `value`, ordered even for negative values.
    #[must_use]
    pub fn around(value: f64, ratio: f64) -> Self {
        let a = value * (1.0 - ratio);
        let b = value * (1.0 + ratio);
        Self {
            low: a.min(b),
            high: a.max(b),
        }
    }

    /// Whether `value` lies inside the range.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        (self.low..=self.high).contains(&value)
    }
}

/// Uncertainty band per domain.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct EffectUncertainty {
    /// Population band.
    pub population: EffectRange,
    /// Economic band.
    pub economic: EffectRange,
    /// Livability band.
    pub livability: EffectRange,
}

impl EffectUncertainty {
    /// Band for `domain`.
    #[must_use]
    pub const fn get(&self, domain: Domain) -> EffectRange {
        match domain {
            Domain::Population => self.population,
            Domain::Economic => self.economic,
            Domain::Livability => self.livability,
        }
    }
}

/// Outcome of one optimization call.
///
/// Produced by [`crate::AllocationSolver`] and annotated by
/// [`crate::FeasibilityValidator`], which returns a new value rather than
/// editing this one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizationResult {
    /// Result identifier.
    pub id: Uuid,
    /// Objective that was maximized.
    pub objective: Objective,
    /// Strategy that produced the allocation.
    pub strategy: Strategy,
    /// Constraints in force during the solve.
    pub constraints: Constraints,
    /// Chosen intensities; empty when infeasible or unbounded.
    pub allocation: Allocation,
    /// `Σ intensity · cost_per_unit`.
    pub total_cost: f64,
    /// Objective evaluated at `allocation`.
    pub objective_value: f64,
    /// Terminal solver state.
    pub status: SolveStatus,
    /// Aggregate effect per domain.
    pub predicted_effects: DomainEffects,
    /// Share of the total budget spent, in percent.
    pub budget_utilization: f64,
    /// Human-readable constraint violations.
    pub violations: Vec<String>,
    /// `violations.is_empty()` once validated.
    pub is_feasible: bool,
    /// Fixed-ratio band around `predicted_effects`.
    pub effect_uncertainty: EffectUncertainty,
    /// Simplex pivots, evolution evaluations, or surrogate evaluations.
    pub iterations: usize,
    /// Creation timestamp.
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_orders_negative_values() {
        let range = EffectRange::around(-10.0, 0.2);
        assert!((range.low + 12.0).abs() < 1e-12);
        assert!((range.high + 8.0).abs() < 1e-12);
        assert!(range.contains(-10.0));
    }

    #[test]
    fn only_terminal_successes_are_usable() {
        assert!(SolveStatus::Optimal.is_usable());
        assert!(SolveStatus::Approximate.is_usable());
        assert!(!SolveStatus::Infeasible.is_usable());
        assert!(!SolveStatus::Unbounded.is_usable());
    }
}
