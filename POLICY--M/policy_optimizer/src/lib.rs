#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Regional policy optimizer: allocates a budget across policy levers, checks the
//! allocation, rolls it out over time, and measures how fragile the optimum is.

/// Lever intensities.
pub mod allocation;
/// Effect model and lever catalogue.
pub mod catalogue;
/// TOML-backed model configuration.
pub mod config;
/// Budget and capacity limits.
pub mod constraints;
/// Structural error type.
pub mod error;
/// Forecast collaborator boundary and coefficient calibration.
pub mod forecast;
/// Optimization objectives.
pub mod objective;
/// Optimization result records.
pub mod result;
/// Composite runtime with telemetry.
pub mod runtime;
/// Multi-period implementation scheduling.
pub mod scheduler;
/// Sensitivity analysis.
pub mod sensitivity;
/// Allocation strategies.
pub mod solver;
/// Logging and event emission.
pub mod telemetry;
/// Post-solve feasibility checks.
pub mod validator;

pub use allocation::Allocation;
pub use catalogue::{Domain, DomainEffects, LeverCatalogue, PolicyLever};
pub use config::PolicyModel;
pub use constraints::{ConstraintOverrides, Constraints};
pub use error::PolicyError;
pub use forecast::{ForecastSource, Scenario};
pub use objective::Objective;
pub use result::{EffectRange, EffectUncertainty, OptimizationResult, SolveStatus};
pub use runtime::{ModelStatus, PlanRequest, PolicyPlan, PolicyRuntime};
pub use scheduler::{
    DomainSeries, ImplementationSchedule, ImplementationScheduler, ScheduledLever,
    UnscheduledLever, UnscheduledReason,
};
pub use sensitivity::{
    BudgetSensitivity, CostSensitivity, EffectSensitivity, SensitivityAnalyzer,
    SensitivityReport, VariationFractions,
};
pub use solver::{
    AllocationProblem, AllocationSolver, AllocationStrategy, SolveOutcome, SolverSettings,
    Strategy,
};
pub use telemetry::{PolicyTelemetry, PolicyTelemetryBuilder};
pub use validator::{FeasibilityValidator, UncertaintyBands};
