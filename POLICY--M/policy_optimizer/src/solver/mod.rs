//! Budget allocation solver: one contract, three interchangeable strategies.

use chrono::Utc;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    allocation::Allocation,
    catalogue::LeverCatalogue,
    constraints::Constraints,
    error::PolicyError,
    objective::Objective,
    result::{EffectUncertainty, OptimizationResult, SolveStatus},
};

/// Differential evolution strategy.
pub mod evolution;
/// Linear programming strategy.
pub mod simplex;
/// Gaussian-process guided strategy.
pub mod surrogate;

pub use evolution::{DifferentialEvolution, EvolutionSettings};
pub use simplex::SimplexSolver;
pub use surrogate::{SurrogateSearch, SurrogateSettings};

/// Relative slack used when comparing spend against a budget.
pub(crate) const BUDGET_TOLERANCE: f64 = 1e-9;

/// Strategy selector.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Linear program; provable optimum.
    #[default]
    Exact,
    /// Penalized differential evolution.
    Stochastic,
    /// Gaussian-process surrogate with an upper-confidence acquisition.
    Surrogate,
}

impl Strategy {
    /// Every strategy.
    pub const ALL: [Self; 3] = [Self::Exact, Self::Stochastic, Self::Surrogate];

    /// Label for logging.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Stochastic => "stochastic",
            Self::Surrogate => "surrogate",
        }
    }
}

/// Tuning shared by the solver front-end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolverSettings {
    /// Seed for the sampling strategies.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Pivot cap for the exact strategy.
    #[serde(default = "default_max_pivots")]
    pub max_pivots: usize,
    /// Differential evolution tuning.
    #[serde(default)]
    pub evolution: EvolutionSettings,
    /// Surrogate search tuning.
    #[serde(default)]
    pub surrogate: SurrogateSettings,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            max_pivots: default_max_pivots(),
            evolution: EvolutionSettings::default(),
            surrogate: SurrogateSettings::default(),
        }
    }
}

const fn default_seed() -> u64 {
    42
}

const fn default_max_pivots() -> usize {
    10_000
}

/// Raw strategy output before it is turned into an [`OptimizationResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    /// Intensities in problem order; `None` when no allocation exists.
    pub intensities: Option<Vec<f64>>,
    /// Terminal state.
    pub status: SolveStatus,
    /// Work performed (pivots or objective evaluations).
    pub iterations: usize,
}

impl SolveOutcome {
    /// Outcome carrying an allocation.
    #[must_use]
    pub const fn found(intensities: Vec<f64>, status: SolveStatus, iterations: usize) -> Self {
        Self {
            intensities: Some(intensities),
            status,
            iterations,
        }
    }

    /// Outcome without an allocation.
    #[must_use]
    pub const fn empty(status: SolveStatus, iterations: usize) -> Self {
        Self {
            intensities: None,
            status,
            iterations,
        }
    }
}

/// Common contract implemented by every strategy.
pub trait AllocationStrategy {
    /// Maximizes the problem's objective. Only structural problems are errors.
    fn solve(&self, problem: &AllocationProblem<'_>) -> Result<SolveOutcome, PolicyError>;
}

/// Dense view of one allocation problem, in catalogue order.
#[derive(Debug, Clone)]
pub struct AllocationProblem<'a> {
    catalogue: &'a LeverCatalogue,
    objective: Objective,
    constraints: Constraints,
    ids: Vec<String>,
    coefficients: Vec<f64>,
    costs: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl<'a> AllocationProblem<'a> {
    /// Builds the problem, rejecting malformed constraints.
    pub fn new(
        catalogue: &'a LeverCatalogue,
        objective: Objective,
        constraints: Constraints,
    ) -> Result<Self, PolicyError> {
        constraints.validate()?;
        let levers: Vec<_> = catalogue.iter().collect();
        Ok(Self {
            catalogue,
            objective,
            constraints,
            ids: levers.iter().map(|lever| lever.id.clone()).collect(),
            coefficients: levers
                .iter()
                .map(|lever| objective.coefficient(lever))
                .collect(),
            costs: levers.iter().map(|lever| lever.cost_per_unit).collect(),
            lower: vec![constraints.min_intensity; levers.len()],
            upper: levers.iter().map(|lever| lever.max_intensity).collect(),
        })
    }

    /// Catalogue the problem was built from.
    #[must_use]
    pub const fn catalogue(&self) -> &'a LeverCatalogue {
        self.catalogue
    }

    /// Objective being maximized.
    #[must_use]
    pub const fn objective(&self) -> Objective {
        self.objective
    }

    /// Constraints in force.
    #[must_use]
    pub const fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Number of decision variables.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.ids.len()
    }

    /// Lever ids in variable order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Objective gain per unit intensity.
    #[must_use]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Unit costs.
    #[must_use]
    pub fn costs(&self) -> &[f64] {
        &self.costs
    }

    /// Intensity floors.
    #[must_use]
    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    /// Intensity caps.
    #[must_use]
    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// Total budget.
    #[must_use]
    pub const fn budget(&self) -> f64 {
        self.constraints.total_budget
    }

    /// Spend required just to hold every lever at its floor.
    #[must_use]
    pub fn floor_cost(&self) -> f64 {
        self.cost_at(&self.lower)
    }

    /// Whether any allocation satisfies floors, caps, and the budget.
    #[must_use]
    pub fn is_feasible(&self) -> bool {
        let bounds_ok = self
            .lower
            .iter()
            .zip(&self.upper)
            .all(|(lower, upper)| lower <= upper);
        bounds_ok && self.floor_cost() <= self.budget() + budget_slack(self.budget())
    }

    /// Objective at `x`.
    #[must_use]
    pub fn objective_at(&self, x: &[f64]) -> f64 {
        dot(&self.coefficients, x)
    }

    /// Spend at `x`.
    #[must_use]
    pub fn cost_at(&self, x: &[f64]) -> f64 {
        dot(&self.costs, x)
    }

    /// Fails when a lever has no finite cap.
    pub fn require_finite_bounds(&self) -> Result<(), PolicyError> {
        match self.upper.iter().position(|upper| !upper.is_finite()) {
            Some(idx) => Err(PolicyError::UnboundedSearchSpace(self.ids[idx].clone())),
            None => Ok(()),
        }
    }

    /// Uniform draw inside the box `[lower, upper]`.
    pub fn sample(&self, rng: &mut impl Rng) -> Vec<f64> {
        self.lower
            .iter()
            .zip(&self.upper)
            .map(|(lower, upper)| lower + rng.gen::<f64>() * (upper - lower))
            .collect()
    }

    /// Clamps `x` into the box, then shrinks the part above the floors
    /// proportionally until the budget holds.
    pub fn repair(&self, x: &mut [f64]) {
        for ((value, lower), upper) in x.iter_mut().zip(&self.lower).zip(&self.upper) {
            *value = value.clamp(*lower, *upper);
        }
        let cost = self.cost_at(x);
        if cost <= self.budget() {
            return;
        }
        let floor = self.floor_cost();
        let above = cost - floor;
        let scale = if above > 0.0 {
            ((self.budget() - floor) / above).clamp(0.0, 1.0)
        } else {
            0.0
        };
        for (value, lower) in x.iter_mut().zip(&self.lower) {
            *value = lower + (*value - lower) * scale;
        }
    }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn budget_slack(budget: f64) -> f64 {
    BUDGET_TOLERANCE * budget.abs().max(1.0)
}

/// Reproducible RNG for the sampling strategies.
pub(crate) fn seeded_rng(seed: u64) -> SmallRng {
    SmallRng::seed_from_u64(seed)
}

impl Strategy {
    /// Runs the selected strategy. Infeasible problems short-circuit for every strategy.
    pub fn solve(
        self,
        problem: &AllocationProblem<'_>,
        settings: &SolverSettings,
    ) -> Result<SolveOutcome, PolicyError> {
        if !problem.is_feasible() {
            return Ok(SolveOutcome::empty(SolveStatus::Infeasible, 0));
        }
        match self {
            Self::Exact => SimplexSolver::new(settings.max_pivots).solve(problem),
            Self::Stochastic => {
                DifferentialEvolution::new(settings.evolution.clone(), settings.seed).solve(problem)
            }
            Self::Surrogate => {
                SurrogateSearch::new(settings.surrogate.clone(), settings.seed).solve(problem)
            }
        }
    }
}

/// Front-end turning strategy output into [`OptimizationResult`] records.
#[derive(Debug, Clone, Default)]
pub struct AllocationSolver {
    settings: SolverSettings,
}

impl AllocationSolver {
    /// Creates a solver with the given tuning.
    #[must_use]
    pub const fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    /// Tuning in use.
    #[must_use]
    pub const fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// Maximizes `objective` over `catalogue` under `constraints`.
    ///
    /// The returned result is not yet validated: `violations` is empty,
    /// `is_feasible` is false, and `effect_uncertainty` is zeroed until it goes
    /// through [`crate::FeasibilityValidator::validate`].
    pub fn optimize(
        &self,
        catalogue: &LeverCatalogue,
        objective: Objective,
        constraints: &Constraints,
        strategy: Strategy,
    ) -> Result<OptimizationResult, PolicyError> {
        let problem = AllocationProblem::new(catalogue, objective, *constraints)?;
        let outcome = strategy.solve(&problem, &self.settings)?;
        let allocation = outcome
            .intensities
            .as_deref()
            .map(|x| Allocation::from_vector(problem.ids(), x))
            .unwrap_or_default();
        let predicted_effects = catalogue.effects(&allocation)?;
        let total_cost = catalogue.total_cost(&allocation)?;
        let budget_utilization = if constraints.total_budget > 0.0 {
            total_cost / constraints.total_budget * 100.0
        } else {
            0.0
        };
        Ok(OptimizationResult {
            id: Uuid::new_v4(),
            objective,
            strategy,
            constraints: *constraints,
            allocation,
            total_cost,
            objective_value: objective.evaluate(&predicted_effects),
            status: outcome.status,
            predicted_effects,
            budget_utilization,
            violations: Vec::new(),
            is_feasible: false,
            effect_uncertainty: EffectUncertainty::default(),
            iterations: outcome.iterations,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{DomainEffects, PolicyLever};

    fn two_lever() -> LeverCatalogue {
        LeverCatalogue::new([
            PolicyLever::new("a", 1.0, DomainEffects::new(2.0, 0.0, 0.0), 10.0, 1),
            PolicyLever::new("b", 2.0, DomainEffects::new(0.0, 5.0, 0.0), 5.0, 2),
        ])
        .unwrap()
    }

    fn budget(total: f64) -> Constraints {
        Constraints::default().with_total_budget(total)
    }

    #[test]
    fn exact_two_lever_scenario() {
        let result = AllocationSolver::default()
            .optimize(&two_lever(), Objective::TotalBenefit, &budget(10.0), Strategy::Exact)
            .unwrap();
        assert_eq!(result.status, SolveStatus::Optimal);
        assert!(result.allocation.get("a").abs() < 1e-9);
        assert!((result.allocation.get("b") - 5.0).abs() < 1e-9);
        assert!((result.total_cost - 10.0).abs() < 1e-9);
        assert!((result.objective_value - 25.0).abs() < 1e-9);
        assert!((result.budget_utilization - 100.0).abs() < 1e-6);
    }

    #[test]
    fn zero_budget_with_zero_floor_is_trivially_optimal() {
        let result = AllocationSolver::default()
            .optimize(&two_lever(), Objective::TotalBenefit, &budget(0.0), Strategy::Exact)
            .unwrap();
        assert_eq!(result.status, SolveStatus::Optimal);
        assert_eq!(result.objective_value, 0.0);
        assert_eq!(result.total_cost, 0.0);
        assert_eq!(result.budget_utilization, 0.0);
    }

    #[test]
    fn zero_budget_with_positive_floor_is_infeasible() {
        let constraints = Constraints {
            min_intensity: 1.0,
            ..budget(0.0)
        };
        for strategy in Strategy::ALL {
            let result = AllocationSolver::default()
                .optimize(&two_lever(), Objective::TotalBenefit, &constraints, strategy)
                .unwrap();
            assert_eq!(result.status, SolveStatus::Infeasible, "{}", strategy.label());
            assert!(result.allocation.is_empty());
        }
    }

    #[test]
    fn floor_above_cap_is_infeasible() {
        let constraints = Constraints {
            min_intensity: 6.0,
            ..budget(1_000.0)
        };
        let result = AllocationSolver::default()
            .optimize(&two_lever(), Objective::TotalBenefit, &constraints, Strategy::Exact)
            .unwrap();
        assert_eq!(result.status, SolveStatus::Infeasible);
    }

    #[test]
    fn floors_are_honoured_by_exact_strategy() {
        let constraints = Constraints {
            min_intensity: 1.0,
            ..budget(10.0)
        };
        let result = AllocationSolver::default()
            .optimize(&two_lever(), Objective::TotalBenefit, &constraints, Strategy::Exact)
            .unwrap();
        assert_eq!(result.status, SolveStatus::Optimal);
        // floors cost 3, leaving 7 for b: b = 1 + 3.5 = 4.5, a = 1
        assert!((result.allocation.get("a") - 1.0).abs() < 1e-9);
        assert!((result.allocation.get("b") - 4.5).abs() < 1e-9);
        assert!(result.total_cost <= 10.0 + 1e-9);
    }

    #[test]
    fn uncapped_free_lever_is_unbounded() {
        let catalogue = LeverCatalogue::new([PolicyLever::new(
            "free",
            0.0,
            DomainEffects::new(1.0, 0.0, 0.0),
            f64::INFINITY,
            1,
        )])
        .unwrap();
        let result = AllocationSolver::default()
            .optimize(&catalogue, Objective::TotalBenefit, &budget(10.0), Strategy::Exact)
            .unwrap();
        assert_eq!(result.status, SolveStatus::Unbounded);
        let err = AllocationSolver::default()
            .optimize(&catalogue, Objective::TotalBenefit, &budget(10.0), Strategy::Stochastic)
            .unwrap_err();
        assert_eq!(err, PolicyError::UnboundedSearchSpace("free".into()));
    }

    #[test]
    fn exact_respects_budget_and_is_monotone() {
        let catalogue = LeverCatalogue::regional_default();
        let solver = AllocationSolver::default();
        let mut previous = f64::NEG_INFINITY;
        for total in [0.0, 5.0, 20.0, 47.0, 60.0, 100.0, 200.0] {
            for objective in [Objective::TotalBenefit, Objective::LivabilityImprovement] {
                let result = solver
                    .optimize(&catalogue, objective, &budget(total), Strategy::Exact)
                    .unwrap();
                assert_eq!(result.status, SolveStatus::Optimal);
                assert!(result.total_cost <= total + 1e-9 * total.max(1.0));
                for lever in catalogue.iter() {
                    assert!(result.allocation.get(&lever.id) <= lever.max_intensity + 1e-9);
                }
            }
            let value = solver
                .optimize(&catalogue, Objective::TotalBenefit, &budget(total), Strategy::Exact)
                .unwrap()
                .objective_value;
            assert!(value + 1e-9 >= previous);
            previous = value;
        }
    }

    #[test]
    fn malformed_constraints_are_fatal() {
        let err = AllocationSolver::default()
            .optimize(&two_lever(), Objective::TotalBenefit, &budget(-5.0), Strategy::Exact)
            .unwrap_err();
        assert!(matches!(err, PolicyError::MalformedConstraints(_)));
    }

    #[test]
    fn repair_scales_excess_above_floors() {
        let catalogue = two_lever();
        let constraints = Constraints {
            min_intensity: 1.0,
            ..budget(5.0)
        };
        let problem =
            AllocationProblem::new(&catalogue, Objective::TotalBenefit, constraints).unwrap();
        let mut x = vec![20.0, 3.0];
        problem.repair(&mut x);
        assert!(x[0] >= 1.0 && x[1] >= 1.0);
        assert!(x[0] <= 10.0);
        assert!((problem.cost_at(&x) - 5.0).abs() < 1e-9);
    }
}
