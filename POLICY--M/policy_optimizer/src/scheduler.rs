//! Multi-period implementation scheduling.
//!
//! Levers are placed greedily in descending effect/cost efficiency. Each one
//! takes the earliest window of `implementation_duration` periods in which its
//! even cost split still fits under `annual_budget`. Greedy placement is a
//! heuristic: a cheaper ordering may schedule more levers.
//!
//! [`ImplementationScheduler::with_slot_limits`] additionally gates each window
//! on `annual_capacity` and `max_concurrent_levers`.

use std::ops::Range;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    allocation::Allocation,
    catalogue::{Domain, DomainEffects, LeverCatalogue},
    constraints::Constraints,
    error::PolicyError,
    solver::budget_slack,
};

/// Placement of one lever.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledLever {
    /// Lever id.
    pub lever_id: String,
    /// Allocated intensity.
    pub intensity: f64,
    /// First period of implementation.
    pub start_period: u32,
    /// Last period of implementation (inclusive).
    pub end_period: u32,
    /// Spend in each period of the window.
    pub annual_cost: f64,
    /// Spend over the whole window.
    pub total_cost: f64,
    /// Total effect per unit of spend.
    pub efficiency: f64,
}

/// Why a lever could not be placed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UnscheduledReason {
    /// The lever takes longer than the horizon.
    ExceedsHorizon,
    /// Every window breaks the annual budget, or an enabled slot limit.
    NoCapacityWindow,
}

impl UnscheduledReason {
    /// Label for logging.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ExceedsHorizon => "exceeds_horizon",
            Self::NoCapacityWindow => "no_capacity_window",
        }
    }
}

/// Lever left out of the schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnscheduledLever {
    /// Lever id.
    pub lever_id: String,
    /// Reason.
    pub reason: UnscheduledReason,
    /// Efficiency it was ranked by.
    pub efficiency: f64,
}

/// One value per period for each domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DomainSeries {
    /// Population series.
    pub population: Vec<f64>,
    /// Economic series.
    pub economic: Vec<f64>,
    /// Livability series.
    pub livability: Vec<f64>,
}

impl DomainSeries {
    fn zeros(periods: usize) -> Self {
        Self {
            population: vec![0.0; periods],
            economic: vec![0.0; periods],
            livability: vec![0.0; periods],
        }
    }

    /// Series for `domain`.
    #[must_use]
    pub fn get(&self, domain: Domain) -> &[f64] {
        match domain {
            Domain::Population => &self.population,
            Domain::Economic => &self.economic,
            Domain::Livability => &self.livability,
        }
    }

    fn add(&mut self, period: usize, effects: &DomainEffects) {
        self.population[period] += effects.population;
        self.economic[period] += effects.economic;
        self.livability[period] += effects.livability;
    }

    /// Effects in `period`, zero when out of range.
    #[must_use]
    pub fn at(&self, period: usize) -> DomainEffects {
        let pick = |series: &[f64]| series.get(period).copied().unwrap_or(0.0);
        DomainEffects::new(
            pick(&self.population),
            pick(&self.economic),
            pick(&self.livability),
        )
    }
}

/// Multi-period rollout of an allocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImplementationSchedule {
    /// Number of periods planned.
    pub time_horizon: u32,
    /// Placed levers in placement order.
    pub scheduled: IndexMap<String, ScheduledLever>,
    /// Levers that could not be placed.
    pub unscheduled: Vec<UnscheduledLever>,
    /// Spend per period.
    pub annual_costs: Vec<f64>,
    /// Cumulative effect per period and domain.
    pub annual_effects: DomainSeries,
    /// Sum of `total_cost` over scheduled levers.
    pub total_scheduled_cost: f64,
}

impl ImplementationSchedule {
    /// Levers in implementation during `period`.
    #[must_use]
    pub fn active_in(&self, period: u32) -> usize {
        self.scheduled
            .values()
            .filter(|lever| (lever.start_period..=lever.end_period).contains(&period))
            .count()
    }
}

#[derive(Debug)]
struct Candidate<'a> {
    id: &'a str,
    intensity: f64,
    duration: u32,
    total_cost: f64,
    full_effect: DomainEffects,
    efficiency: f64,
}

/// Period-by-period usage while placing levers.
#[derive(Debug)]
struct Ledger {
    spend: Vec<f64>,
    deployed: Vec<f64>,
    active: Vec<usize>,
}

impl Ledger {
    fn new(periods: usize) -> Self {
        Self {
            spend: vec![0.0; periods],
            deployed: vec![0.0; periods],
            active: vec![0; periods],
        }
    }

    fn fits(
        &self,
        window: Range<usize>,
        cost: f64,
        units: f64,
        limits: &Constraints,
        slot_limits: bool,
    ) -> bool {
        window.into_iter().all(|t| {
            let within_budget =
                self.spend[t] + cost <= limits.annual_budget + budget_slack(limits.annual_budget);
            within_budget
                && (!slot_limits
                    || (self.deployed[t] + units
                        <= limits.annual_capacity + budget_slack(limits.annual_capacity)
                        && self.active[t] < limits.max_concurrent_levers))
        })
    }

    fn commit(&mut self, window: Range<usize>, cost: f64, units: f64) {
        for t in window {
            self.spend[t] += cost;
            self.deployed[t] += units;
            self.active[t] += 1;
        }
    }
}

/// Greedy multi-period scheduler.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImplementationScheduler {
    slot_limits: bool,
}

impl ImplementationScheduler {
    /// Creates a scheduler bounded by `annual_budget` only.
    #[must_use]
    pub const fn new() -> Self {
        Self { slot_limits: false }
    }

    /// Also caps intensity deployed per period at `annual_capacity` and levers in
    /// implementation at `max_concurrent_levers`.
    #[must_use]
    pub const fn with_slot_limits(mut self) -> Self {
        self.slot_limits = true;
        self
    }

    /// Spreads `allocation` over `time_horizon` periods under `constraints`.
    ///
    /// Unknown lever ids are fatal; levers that do not fit are reported in
    /// [`ImplementationSchedule::unscheduled`].
    pub fn schedule(
        &self,
        catalogue: &LeverCatalogue,
        constraints: &Constraints,
        allocation: &Allocation,
        time_horizon: u32,
    ) -> Result<ImplementationSchedule, PolicyError> {
        constraints.validate()?;
        let periods = time_horizon as usize;

        let mut candidates = Vec::new();
        for (id, intensity) in allocation.active() {
            let lever = catalogue.get(id)?;
            let total_cost = intensity * lever.cost_per_unit;
            let full_effect = lever.effects_at(intensity);
            let efficiency = if total_cost > 0.0 {
                full_effect.total() / total_cost
            } else {
                0.0
            };
            candidates.push(Candidate {
                id,
                intensity,
                duration: lever.implementation_duration,
                total_cost,
                full_effect,
                efficiency,
            });
        }
        candidates.sort_by(|a, b| b.efficiency.total_cmp(&a.efficiency));

        let mut ledger = Ledger::new(periods);
        let mut annual_effects = DomainSeries::zeros(periods);
        let mut scheduled = IndexMap::new();
        let mut unscheduled = Vec::new();

        for candidate in candidates {
            let duration = candidate.duration as usize;
            if duration > periods {
                unscheduled.push(UnscheduledLever {
                    lever_id: candidate.id.to_string(),
                    reason: UnscheduledReason::ExceedsHorizon,
                    efficiency: candidate.efficiency,
                });
                continue;
            }
            let annual_cost = candidate.total_cost / f64::from(candidate.duration);
            let annual_units = candidate.intensity / f64::from(candidate.duration);
            let start = (0..=periods - duration).find(|&s| {
                ledger.fits(
                    s..s + duration,
                    annual_cost,
                    annual_units,
                    constraints,
                    self.slot_limits,
                )
            });
            let Some(start) = start else {
                unscheduled.push(UnscheduledLever {
                    lever_id: candidate.id.to_string(),
                    reason: UnscheduledReason::NoCapacityWindow,
                    efficiency: candidate.efficiency,
                });
                continue;
            };

            let end = start + duration - 1;
            ledger.commit(start..end + 1, annual_cost, annual_units);
            for t in start..periods {
                let progress = if t <= end {
                    (t - start + 1) as f64 / duration as f64
                } else {
                    1.0
                };
                annual_effects.add(t, &candidate.full_effect.scaled(progress));
            }
            // start and end are bounded by time_horizon, which is a u32
            let (start_period, end_period) = (start as u32, end as u32);
            scheduled.insert(
                candidate.id.to_string(),
                ScheduledLever {
                    lever_id: candidate.id.to_string(),
                    intensity: candidate.intensity,
                    start_period,
                    end_period,
                    annual_cost,
                    total_cost: candidate.total_cost,
                    efficiency: candidate.efficiency,
                },
            );
        }

        let total_scheduled_cost = scheduled.values().map(|lever| lever.total_cost).sum();
        Ok(ImplementationSchedule {
            time_horizon,
            scheduled,
            unscheduled,
            annual_costs: ledger.spend,
            annual_effects,
            total_scheduled_cost,
        })
    }
}
