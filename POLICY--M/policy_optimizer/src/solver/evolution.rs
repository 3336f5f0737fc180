use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{error::PolicyError, result::SolveStatus};

use super::{seeded_rng, AllocationProblem, AllocationStrategy, SolveOutcome};

/// Tuning for the differential evolution strategy (`best/1/bin`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvolutionSettings {
    /// Generation cap.
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
    /// Population size per decision variable.
    #[serde(default = "default_population_factor")]
    pub population_factor: usize,
    /// Lower end of the dithered mutation factor.
    #[serde(default = "default_mutation_min")]
    pub mutation_min: f64,
    /// Upper end of the dithered mutation factor.
    #[serde(default = "default_mutation_max")]
    pub mutation_max: f64,
    /// Binomial crossover probability.
    #[serde(default = "default_crossover")]
    pub crossover: f64,
    /// Relative spread of population energies that counts as converged.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Weight of the squared budget excess.
    #[serde(default = "default_penalty_weight")]
    pub penalty_weight: f64,
}

impl Default for EvolutionSettings {
    fn default() -> Self {
        Self {
            max_generations: default_max_generations(),
            population_factor: default_population_factor(),
            mutation_min: default_mutation_min(),
            mutation_max: default_mutation_max(),
            crossover: default_crossover(),
            tolerance: default_tolerance(),
            penalty_weight: default_penalty_weight(),
        }
    }
}

const fn default_max_generations() -> usize {
    100
}

const fn default_population_factor() -> usize {
    20
}

const fn default_mutation_min() -> f64 {
    0.5
}

const fn default_mutation_max() -> f64 {
    1.0
}

const fn default_crossover() -> f64 {
    0.7
}

const fn default_tolerance() -> f64 {
    0.01
}

const fn default_penalty_weight() -> f64 {
    1_000.0
}

/// Stochastic strategy: penalized differential evolution over the intensity box.
///
/// The energy minimized is `-(objective - w · excess²)` where `excess` is spend
/// above the total budget. The best member is repaired onto the budget before it
/// is returned, so the incumbent never carries the penalty's slack.
#[derive(Debug, Clone)]
pub struct DifferentialEvolution {
    settings: EvolutionSettings,
    seed: u64,
}

impl DifferentialEvolution {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(settings: EvolutionSettings, seed: u64) -> Self {
        Self { settings, seed }
    }

    fn energy(&self, problem: &AllocationProblem<'_>, x: &[f64]) -> f64 {
        let excess = (problem.cost_at(x) - problem.budget()).max(0.0);
        -(problem.objective_at(x) - self.settings.penalty_weight * excess * excess)
    }

    fn converged(&self, energies: &[f64]) -> bool {
        let count = energies.len() as f64;
        let mean = energies.iter().sum::<f64>() / count;
        let variance = energies.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / count;
        variance.sqrt() <= self.settings.tolerance * mean.abs()
    }
}

impl AllocationStrategy for DifferentialEvolution {
    fn solve(&self, problem: &AllocationProblem<'_>) -> Result<SolveOutcome, PolicyError> {
        problem.require_finite_bounds()?;
        let dim = problem.dimension();
        if dim == 0 {
            return Ok(SolveOutcome::found(Vec::new(), SolveStatus::Optimal, 0));
        }
        let mut rng = seeded_rng(self.seed);
        let size = (self.settings.population_factor * dim).max(5);
        let mut population: Vec<Vec<f64>> = (0..size).map(|_| problem.sample(&mut rng)).collect();
        let mut energies: Vec<f64> = population.iter().map(|x| self.energy(problem, x)).collect();
        let mut evaluations = size;
        let mut best = argmin(&energies);
        let mut status = SolveStatus::Approximate;

        for _ in 0..self.settings.max_generations {
            let spread = self.settings.mutation_max - self.settings.mutation_min;
            let mutation = self.settings.mutation_min + rng.gen::<f64>() * spread;
            for idx in 0..size {
                let r1 = pick_distinct(&mut rng, size, &[idx, best]);
                let r2 = pick_distinct(&mut rng, size, &[idx, best, r1]);
                let forced = rng.gen_range(0..dim);
                let mut trial = population[idx].clone();
                for j in 0..dim {
                    if j == forced || rng.gen::<f64>() < self.settings.crossover {
                        let mutant =
                            population[best][j] + mutation * (population[r1][j] - population[r2][j]);
                        trial[j] = mutant.clamp(problem.lower()[j], problem.upper()[j]);
                    }
                }
                let energy = self.energy(problem, &trial);
                evaluations += 1;
                if energy <= energies[idx] {
                    population[idx] = trial;
                    energies[idx] = energy;
                    if energy <= energies[best] {
                        best = idx;
                    }
                }
            }
            if self.converged(&energies) {
                status = SolveStatus::Optimal;
                break;
            }
        }

        let mut incumbent = population[best].clone();
        problem.repair(&mut incumbent);
        Ok(SolveOutcome::found(incumbent, status, evaluations))
    }
}

fn argmin(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold(0, |best, (idx, value)| if *value < values[best] { idx } else { best })
}

fn pick_distinct(rng: &mut impl Rng, size: usize, exclude: &[usize]) -> usize {
    loop {
        let candidate = rng.gen_range(0..size);
        if !exclude.contains(&candidate) {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalogue::{DomainEffects, LeverCatalogue, PolicyLever},
        constraints::Constraints,
        objective::Objective,
        solver::Strategy,
        AllocationSolver,
    };

    fn two_lever() -> LeverCatalogue {
        LeverCatalogue::new([
            PolicyLever::new("a", 1.0, DomainEffects::new(2.0, 0.0, 0.0), 10.0, 1),
            PolicyLever::new("b", 2.0, DomainEffects::new(0.0, 5.0, 0.0), 5.0, 2),
        ])
        .unwrap()
    }

    #[test]
    fn approaches_linear_optimum_within_budget() {
        let constraints = Constraints::default().with_total_budget(10.0);
        let result = AllocationSolver::default()
            .optimize(&two_lever(), Objective::TotalBenefit, &constraints, Strategy::Stochastic)
            .unwrap();
        assert!(result.status.is_usable());
        assert!(result.total_cost <= 10.0 + 1e-6);
        assert!(result.objective_value >= 0.9 * 25.0);
    }

    #[test]
    fn same_seed_reproduces_allocation() {
        let catalogue = LeverCatalogue::regional_default();
        let problem =
            AllocationProblem::new(&catalogue, Objective::EconomicImpact, Constraints::default())
                .unwrap();
        let first = DifferentialEvolution::new(EvolutionSettings::default(), 7)
            .solve(&problem)
            .unwrap();
        let second = DifferentialEvolution::new(EvolutionSettings::default(), 7)
            .solve(&problem)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn default_catalogue_lands_near_exact_optimum() {
        let catalogue = LeverCatalogue::regional_default();
        let constraints = Constraints::default().with_total_budget(40.0);
        let solver = AllocationSolver::default();
        let exact = solver
            .optimize(&catalogue, Objective::TotalBenefit, &constraints, Strategy::Exact)
            .unwrap();
        let stochastic = solver
            .optimize(&catalogue, Objective::TotalBenefit, &constraints, Strategy::Stochastic)
            .unwrap();
        assert!(stochastic.total_cost <= 40.0 + 1e-6);
        assert!(stochastic.objective_value <= exact.objective_value + 1e-9);
        assert!(stochastic.objective_value >= 0.85 * exact.objective_value);
    }

    #[test]
    fn generation_cap_returns_repaired_approximate_incumbent() {
        let catalogue = LeverCatalogue::regional_default();
        let constraints = Constraints::default().with_total_budget(20.0);
        let problem =
            AllocationProblem::new(&catalogue, Objective::TotalBenefit, constraints).unwrap();
        let settings = EvolutionSettings {
            max_generations: 1,
            ..EvolutionSettings::default()
        };
        let size = settings.population_factor * problem.dimension();
        let outcome = DifferentialEvolution::new(settings, 3).solve(&problem).unwrap();
        assert_eq!(outcome.status, SolveStatus::Approximate);
        assert_eq!(outcome.iterations, size * 2);

        let incumbent = outcome.intensities.unwrap();
        assert!(problem.cost_at(&incumbent) <= 20.0 + 1e-9);
        for ((value, lower), upper) in incumbent.iter().zip(problem.lower()).zip(problem.upper()) {
            assert!(value >= lower && value <= upper);
        }
        assert!(problem.objective_at(&incumbent) > 0.0);
    }

    #[test]
    fn converged_requires_tight_spread() {
        let strategy = DifferentialEvolution::new(EvolutionSettings::default(), 1);
        assert!(strategy.converged(&[-10.0, -10.0, -10.0]));
        assert!(!strategy.converged(&[-10.0, -5.0, -1.0]));
    }
}
