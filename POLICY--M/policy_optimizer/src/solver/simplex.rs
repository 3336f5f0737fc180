//! Exact strategy: dense tableau simplex with Bland's rule.
//!
//! The allocation LP is shifted so every lever's floor becomes zero
//! (`y = x - min_intensity`). After the shift all right-hand sides are
//! non-negative, the origin is a basic feasible solution, and a single phase
//! suffices. Bland's rule makes the pivot sequence, and therefore the returned
//! vertex, deterministic.

use ndarray::{s, Array1, Array2, ArrayView1};

use crate::error::PolicyError;

use super::{AllocationProblem, AllocationStrategy, SolveOutcome};
use crate::result::SolveStatus;

const EPS: f64 = 1e-9;

/// `maximize c·y  s.t.  rows·y ≤ rhs, y ≥ 0` with `rhs ≥ 0`.
#[derive(Debug, Clone)]
pub(crate) struct LinearProgram {
    pub(crate) objective: Array1<f64>,
    pub(crate) rows: Array2<f64>,
    pub(crate) rhs: Array1<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LpOutcome {
    Optimal { x: Vec<f64>, value: f64, pivots: usize },
    Unbounded { pivots: usize },
    PivotLimit { x: Vec<f64>, value: f64, pivots: usize },
}

impl LinearProgram {
    /// Slack columns follow the decision columns; the last row holds `-c`.
    fn tableau(&self) -> Array2<f64> {
        let (m, n) = self.rows.dim();
        let rhs_col = n + m;
        let mut tableau = Array2::<f64>::zeros((m + 1, rhs_col + 1));
        tableau.slice_mut(s![..m, ..n]).assign(&self.rows);
        tableau.slice_mut(s![..m, n..rhs_col]).diag_mut().fill(1.0);
        tableau.slice_mut(s![..m, rhs_col]).assign(&self.rhs);
        tableau
            .slice_mut(s![m, ..n])
            .assign(&self.objective.mapv(|coefficient| -coefficient));
        tableau
    }

    pub(crate) fn maximize(&self, max_pivots: usize) -> LpOutcome {
        let (m, n) = self.rows.dim();
        let rhs_col = n + m;
        let mut tableau = self.tableau();
        let mut basis: Vec<usize> = (n..n + m).collect();
        let mut pivots = 0;

        while let Some(col) = (0..rhs_col).find(|&j| tableau[[m, j]] < -EPS) {
            if pivots >= max_pivots {
                let (x, value) = read_solution(&tableau, &basis, n);
                return LpOutcome::PivotLimit { x, value, pivots };
            }
            let mut leaving: Option<(usize, f64)> = None;
            for i in 0..m {
                let a = tableau[[i, col]];
                if a <= EPS {
                    continue;
                }
                let ratio = tableau[[i, rhs_col]] / a;
                leaving = match leaving {
                    Some((best_row, best_ratio))
                        if ratio > best_ratio + EPS
                            || ((ratio - best_ratio).abs() <= EPS
                                && basis[i] > basis[best_row]) =>
                    {
                        Some((best_row, best_ratio))
                    }
                    _ => Some((i, ratio)),
                };
            }
            let Some((row, _)) = leaving else {
                return LpOutcome::Unbounded { pivots };
            };
            pivot(&mut tableau, row, col);
            basis[row] = col;
            pivots += 1;
        }

        let (x, value) = read_solution(&tableau, &basis, n);
        LpOutcome::Optimal { x, value, pivots }
    }
}

fn pivot(tableau: &mut Array2<f64>, row: usize, col: usize) {
    let divisor = tableau[[row, col]];
    tableau.row_mut(row).mapv_inplace(|value| value / divisor);
    let pivot_row = tableau.row(row).to_owned();
    for (idx, mut other) in tableau.rows_mut().into_iter().enumerate() {
        if idx == row {
            continue;
        }
        let factor = other[col];
        if factor == 0.0 {
            continue;
        }
        other.scaled_add(-factor, &pivot_row);
    }
}

fn read_solution(tableau: &Array2<f64>, basis: &[usize], n: usize) -> (Vec<f64>, f64) {
    let (rows, cols) = tableau.dim();
    let (last, rhs_col) = (rows - 1, cols - 1);
    let mut x = vec![0.0; n];
    for (row, &var) in basis.iter().enumerate() {
        if var < n {
            x[var] = tableau[[row, rhs_col]];
        }
    }
    (x, tableau[[last, rhs_col]])
}

/// Linear-programming strategy.
#[derive(Debug, Clone)]
pub struct SimplexSolver {
    max_pivots: usize,
}

impl SimplexSolver {
    /// Creates a solver that gives up after `max_pivots` pivots.
    #[must_use]
    pub fn new(max_pivots: usize) -> Self {
        Self {
            max_pivots: max_pivots.max(1),
        }
    }

    fn formulate(problem: &AllocationProblem<'_>) -> LinearProgram {
        let n = problem.dimension();
        let capped: Vec<usize> = (0..n).filter(|&j| problem.upper()[j].is_finite()).collect();
        let mut rows = Array2::<f64>::zeros((capped.len() + 1, n));
        let mut rhs = Array1::<f64>::zeros(capped.len() + 1);
        rows.row_mut(0).assign(&ArrayView1::from(problem.costs()));
        rhs[0] = (problem.budget() - problem.floor_cost()).max(0.0);
        for (offset, &j) in capped.iter().enumerate() {
            rows[[offset + 1, j]] = 1.0;
            rhs[offset + 1] = (problem.upper()[j] - problem.lower()[j]).max(0.0);
        }
        LinearProgram {
            objective: Array1::from(problem.coefficients().to_vec()),
            rows,
            rhs,
        }
    }
}

impl Default for SimplexSolver {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl AllocationStrategy for SimplexSolver {
    fn solve(&self, problem: &AllocationProblem<'_>) -> Result<SolveOutcome, PolicyError> {
        let shift = |y: Vec<f64>| -> Vec<f64> {
            y.iter()
                .zip(problem.lower())
                .map(|(value, lower)| value + lower)
                .collect()
        };
        let outcome = match Self::formulate(problem).maximize(self.max_pivots) {
            LpOutcome::Optimal { x, pivots, .. } => {
                SolveOutcome::found(shift(x), SolveStatus::Optimal, pivots)
            }
            LpOutcome::PivotLimit { x, pivots, .. } => {
                SolveOutcome::found(shift(x), SolveStatus::Approximate, pivots)
            }
            LpOutcome::Unbounded { pivots } => {
                SolveOutcome::empty(SolveStatus::Unbounded, pivots)
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn solves_textbook_program() {
        // max 3x + 5y, x ≤ 4, 2y ≤ 12, 3x + 2y ≤ 18  →  (2, 6) = 36
        let lp = LinearProgram {
            objective: array![3.0, 5.0],
            rows: array![[1.0, 0.0], [0.0, 2.0], [3.0, 2.0]],
            rhs: array![4.0, 12.0, 18.0],
        };
        match lp.maximize(100) {
            LpOutcome::Optimal { x, value, .. } => {
                assert!((x[0] - 2.0).abs() < 1e-9);
                assert!((x[1] - 6.0).abs() < 1e-9);
                assert!((value - 36.0).abs() < 1e-9);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn detects_unbounded_direction() {
        let lp = LinearProgram {
            objective: array![1.0, 1.0],
            rows: array![[1.0, 0.0]],
            rhs: array![5.0],
        };
        assert!(matches!(lp.maximize(100), LpOutcome::Unbounded { .. }));
    }

    #[test]
    fn pivot_limit_returns_incumbent() {
        let lp = LinearProgram {
            objective: array![3.0, 5.0],
            rows: array![[1.0, 0.0], [0.0, 2.0], [3.0, 2.0]],
            rhs: array![4.0, 12.0, 18.0],
        };
        assert!(matches!(lp.maximize(1), LpOutcome::PivotLimit { pivots: 1, .. }));
    }

    #[test]
    fn zero_objective_is_immediately_optimal() {
        let lp = LinearProgram {
            objective: array![0.0],
            rows: array![[1.0]],
            rhs: array![3.0],
        };
        assert_eq!(
            lp.maximize(10),
            LpOutcome::Optimal {
                x: vec![0.0],
                value: 0.0,
                pivots: 0
            }
        );
    }
}
