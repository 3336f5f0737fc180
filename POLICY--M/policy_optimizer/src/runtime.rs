use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    allocation::Allocation,
    config::PolicyModel,
    constraints::{ConstraintOverrides, Constraints},
    error::PolicyError,
    objective::Objective,
    result::OptimizationResult,
    scheduler::{ImplementationSchedule, ImplementationScheduler},
    sensitivity::{SensitivityAnalyzer, SensitivityReport, VariationFractions},
    solver::{AllocationSolver, Strategy},
    telemetry::PolicyTelemetry,
    validator::FeasibilityValidator,
};

/// Parameters for [`PolicyRuntime::plan`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanRequest {
    /// Objective to maximize.
    #[serde(default)]
    pub objective: Objective,
    /// Solution strategy.
    #[serde(default)]
    pub strategy: Strategy,
    /// Per-request constraint overrides.
    #[serde(default)]
    pub constraints: ConstraintOverrides,
    /// Scheduling horizon in periods.
    #[serde(default = "default_time_horizon")]
    pub time_horizon: u32,
    /// Sensitivity perturbations.
    #[serde(default)]
    pub variation: VariationFractions,
    /// Skips the sensitivity phase when false.
    #[serde(default = "default_true")]
    pub include_sensitivity: bool,
}

impl Default for PlanRequest {
    fn default() -> Self {
        Self {
            objective: Objective::default(),
            strategy: Strategy::default(),
            constraints: ConstraintOverrides::default(),
            time_horizon: default_time_horizon(),
            variation: VariationFractions::default(),
            include_sensitivity: true,
        }
    }
}

const fn default_time_horizon() -> u32 {
    10
}

const fn default_true() -> bool {
    true
}

/// Validated result plus its downstream phases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyPlan {
    /// Validated optimization result.
    pub result: OptimizationResult,
    /// Rollout; absent when the solve produced no usable allocation.
    pub schedule: Option<ImplementationSchedule>,
    /// Sensitivity report; absent when skipped or when the solve was unusable.
    pub sensitivity: Option<SensitivityReport>,
}

/// Summary of the loaded model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelStatus {
    /// Number of levers.
    pub lever_count: usize,
    /// Lever ids in catalogue order.
    pub lever_ids: Vec<String>,
    /// Default constraints.
    pub constraints: Constraints,
    /// Strategies available to callers.
    pub strategies: Vec<Strategy>,
    /// Seed used by the sampling strategies.
    pub seed: u64,
}

/// Composite runtime wiring the solver, validator, scheduler, and analyzer to one model.
#[derive(Debug)]
pub struct PolicyRuntime {
    model: PolicyModel,
    solver: AllocationSolver,
    validator: FeasibilityValidator,
    scheduler: ImplementationScheduler,
    analyzer: SensitivityAnalyzer,
    telemetry: Option<PolicyTelemetry>,
}

impl Default for PolicyRuntime {
    fn default() -> Self {
        Self::new(PolicyModel::default())
    }
}

impl PolicyRuntime {
    /// Creates a runtime over `model`, without telemetry.
    #[must_use]
    pub fn new(model: PolicyModel) -> Self {
        let solver = AllocationSolver::new(model.solver.clone());
        Self {
            validator: FeasibilityValidator::new(model.uncertainty),
            scheduler: ImplementationScheduler::new(),
            analyzer: SensitivityAnalyzer::new(solver.clone()),
            solver,
            model,
            telemetry: None,
        }
    }

    /// Injects telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: PolicyTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Replaces the scheduler, e.g. one built with
    /// [`ImplementationScheduler::with_slot_limits`].
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: ImplementationScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Model in use.
    #[must_use]
    pub const fn model(&self) -> &PolicyModel {
        &self.model
    }

    /// Solves and validates one request.
    pub fn optimize(
        &self,
        objective: Objective,
        overrides: &ConstraintOverrides,
        strategy: Strategy,
    ) -> Result<OptimizationResult, PolicyError> {
        let constraints = self.model.constraints_for(overrides);
        self.log(
            LogLevel::Info,
            "policy.optimize.start",
            json!({
                "objective": objective.label(),
                "strategy": strategy.label(),
                "total_budget": constraints.total_budget,
                "levers": self.model.catalogue.len()
            }),
        );
        let raw = self
            .solver
            .optimize(&self.model.catalogue, objective, &constraints, strategy)
            .map_err(|err| {
                self.log(
                    LogLevel::Error,
                    "policy.optimize.failed",
                    json!({ "error": err.to_string() }),
                );
                err
            })?;
        let result = self.validate(&raw);
        self.log(
            LogLevel::Info,
            "policy.optimize.completed",
            json!({
                "status": result.status.label(),
                "objective_value": result.objective_value,
                "total_cost": result.total_cost,
                "iterations": result.iterations
            }),
        );
        self.event(
            "policy.optimize.completed",
            json!({
                "result_id": result.id,
                "status": result.status.label(),
                "objective_value": result.objective_value,
                "budget_utilization": result.budget_utilization,
                "is_feasible": result.is_feasible
            }),
        );
        Ok(result)
    }

    /// Validates a result against the model's catalogue.
    #[must_use]
    pub fn validate(&self, result: &OptimizationResult) -> OptimizationResult {
        let validated = self.validator.validate(&self.model.catalogue, result);
        if !validated.is_feasible {
            self.log(
                LogLevel::Warn,
                "policy.validate.violations",
                json!({ "violations": validated.violations }),
            );
            self.event(
                "policy.validate.violations",
                json!({ "result_id": validated.id, "violations": validated.violations }),
            );
        }
        validated
    }

    /// Schedules a result's allocation under the constraints it was solved with.
    pub fn schedule(
        &self,
        result: &OptimizationResult,
        time_horizon: u32,
    ) -> Result<ImplementationSchedule, PolicyError> {
        self.schedule_allocation(&result.allocation, &result.constraints, time_horizon)
    }

    /// Schedules an arbitrary allocation.
    pub fn schedule_allocation(
        &self,
        allocation: &Allocation,
        constraints: &Constraints,
        time_horizon: u32,
    ) -> Result<ImplementationSchedule, PolicyError> {
        let schedule =
            self.scheduler
                .schedule(&self.model.catalogue, constraints, allocation, time_horizon)?;
        self.log(
            LogLevel::Info,
            "policy.schedule.completed",
            json!({
                "time_horizon": time_horizon,
                "scheduled": schedule.scheduled.len(),
                "unscheduled": schedule.unscheduled.len(),
                "total_scheduled_cost": schedule.total_scheduled_cost
            }),
        );
        self.event(
            "policy.schedule.completed",
            json!({
                "scheduled": schedule.scheduled.keys().collect::<Vec<_>>(),
                "total_scheduled_cost": schedule.total_scheduled_cost
            }),
        );
        for lever in &schedule.unscheduled {
            self.event(
                "policy.schedule.unscheduled",
                json!({ "lever": lever.lever_id, "reason": lever.reason.label() }),
            );
        }
        Ok(schedule)
    }

    /// Sensitivity of `result` to the model's inputs.
    pub fn analyze(
        &self,
        result: &OptimizationResult,
        fractions: &VariationFractions,
    ) -> Result<SensitivityReport, PolicyError> {
        let report = self
            .analyzer
            .analyze(&self.model.catalogue, result, fractions)?;
        self.log(
            LogLevel::Info,
            "policy.sensitivity.completed",
            json!({
                "base_objective": report.base_objective,
                "levers": report.cost_sensitivity.len(),
                "budget_elasticity": report.budget_sensitivity.elasticity
            }),
        );
        self.event(
            "policy.sensitivity.completed",
            json!({
                "result_id": result.id,
                "budget_elasticity": report.budget_sensitivity.elasticity
            }),
        );
        Ok(report)
    }

    /// Optimize, validate, schedule, and analyze in one call.
    pub fn plan(&self, request: &PlanRequest) -> Result<PolicyPlan, PolicyError> {
        let result = self.optimize(request.objective, &request.constraints, request.strategy)?;
        let (schedule, sensitivity) = if result.status.is_usable() {
            let schedule = self.schedule(&result, request.time_horizon)?;
            let sensitivity = if request.include_sensitivity {
                Some(self.analyze(&result, &request.variation)?)
            } else {
                None
            };
            (Some(schedule), sensitivity)
        } else {
            (None, None)
        };
        self.event(
            "policy.plan.completed",
            json!({
                "result_id": result.id,
                "status": result.status.label(),
                "scheduled": schedule.as_ref().map(|s| s.scheduled.len()),
                "sensitivity": sensitivity.is_some()
            }),
        );
        Ok(PolicyPlan {
            result,
            schedule,
            sensitivity,
        })
    }

    /// Summary of the loaded model.
    #[must_use]
    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            lever_count: self.model.catalogue.len(),
            lever_ids: self.model.catalogue.ids(),
            constraints: self.model.constraints,
            strategies: Strategy::ALL.to_vec(),
            seed: self.model.solver.seed,
        }
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }

    fn event(&self, event_type: &str, payload: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.event(event_type, payload);
        }
    }
}
