//! Effect model: the static lever catalogue and per-domain effect arithmetic.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{allocation::Allocation, error::PolicyError};

/// Outcome domain a lever can move.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Resident population.
    Population,
    /// Regional economic output.
    Economic,
    /// Composite livability score.
    Livability,
}

impl Domain {
    /// Every domain, in reporting order.
    pub const ALL: [Self; 3] = [Self::Population, Self::Economic, Self::Livability];

    /// Label used in logs and violation strings.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Population => "population",
            Self::Economic => "economic",
            Self::Livability => "livability",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One value per domain. Used both for coefficients and for aggregate effects.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct DomainEffects {
    /// Population effect.
    #[serde(default)]
    pub population: f64,
    /// Economic effect.
    #[serde(default)]
    pub economic: f64,
    /// Livability effect.
    #[serde(default)]
    pub livability: f64,
}

impl DomainEffects {
    /// Creates a value from the three domain components.
    #[must_use]
    pub const fn new(population: f64, economic: f64, livability: f64) -> Self {
        Self {
            population,
            economic,
            livability,
        }
    }

    /// Returns the component for `domain`.
    #[must_use]
    pub const fn get(&self, domain: Domain) -> f64 {
        match domain {
            Domain::Population => self.population,
            Domain::Economic => self.economic,
            Domain::Livability => self.livability,
        }
    }

    /// Replaces the component for `domain`.
    pub fn set(&mut self, domain: Domain, value: f64) {
        match domain {
            Domain::Population => self.population = value,
            Domain::Economic => self.economic = value,
            Domain::Livability => self.livability = value,
        }
    }

    /// Sum across the three domains.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.population + self.economic + self.livability
    }

    /// Multiplies every component by `factor`.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(
            self.population * factor,
            self.economic * factor,
            self.livability * factor,
        )
    }

    /// Adds `other` scaled by `factor` into `self`.
    pub fn accumulate(&mut self, other: &Self, factor: f64) {
        self.population += other.population * factor;
        self.economic += other.economic * factor;
        self.livability += other.livability * factor;
    }

    fn is_finite(&self) -> bool {
        Domain::ALL.iter().all(|domain| self.get(*domain).is_finite())
    }
}

/// Discrete policy instrument with a unit cost and per-domain effects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyLever {
    /// Unique key.
    pub id: String,
    /// Currency cost per unit of intensity.
    pub cost_per_unit: f64,
    /// Upper bound on intensity. May be infinite for uncapped levers.
    pub max_intensity: f64,
    /// Periods needed to deploy the lever.
    pub implementation_duration: u32,
    /// Effect per unit of intensity, per domain.
    #[serde(default)]
    pub effect_coefficients: DomainEffects,
}

impl PolicyLever {
    /// Convenience constructor.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        cost_per_unit: f64,
        effect_coefficients: DomainEffects,
        max_intensity: f64,
        implementation_duration: u32,
    ) -> Self {
        Self {
            id: id.into(),
            cost_per_unit,
            effect_coefficients,
            max_intensity,
            implementation_duration,
        }
    }

    /// Effects produced when the lever runs at `intensity`.
    #[must_use]
    pub fn effects_at(&self, intensity: f64) -> DomainEffects {
        self.effect_coefficients.scaled(intensity)
    }

    /// Checks that every parameter is usable by the solver and scheduler.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let invalid = |reason: &str| PolicyError::InvalidLever {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if !self.cost_per_unit.is_finite() || self.cost_per_unit < 0.0 {
            return Err(invalid("cost_per_unit must be finite and non-negative"));
        }
        if !self.effect_coefficients.is_finite() {
            return Err(invalid("effect coefficients must be finite"));
        }
        if self.max_intensity.is_nan() || self.max_intensity < 0.0 {
            return Err(invalid("max_intensity must be non-negative"));
        }
        if self.implementation_duration == 0 {
            return Err(invalid("implementation_duration must be at least one period"));
        }
        Ok(())
    }
}

/// Ordered, validated set of policy levers.
///
/// Construct it once at startup and share it by reference; every operation that
/// needs a modified catalogue receives a fresh copy instead of mutating this one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeverCatalogue {
    levers: IndexMap<String, PolicyLever>,
}

impl LeverCatalogue {
    /// Builds a catalogue, rejecting duplicates and invalid parameters.
    pub fn new(levers: impl IntoIterator<Item = PolicyLever>) -> Result<Self, PolicyError> {
        let mut map = IndexMap::new();
        for lever in levers {
            lever.validate()?;
            if map.contains_key(&lever.id) {
                return Err(PolicyError::DuplicateLever(lever.id));
            }
            map.insert(lever.id.clone(), lever);
        }
        Ok(Self { levers: map })
    }

    /// The six-lever regional catalogue (costs in 100M currency units per intensity unit).
    #[must_use]
    pub fn regional_default() -> Self {
        let levers = [
            ("childcare_support", 0.5, (0.02, 0.015, 0.03), 10.0, 2),
            ("migration_support", 0.3, (0.03, 0.02, 0.02), 8.0, 1),
            ("economic_development", 1.0, (0.015, 0.04, 0.025), 15.0, 3),
            ("infrastructure_improvement", 2.0, (0.01, 0.03, 0.04), 20.0, 5),
            ("education_enhancement", 0.8, (0.025, 0.02, 0.035), 12.0, 4),
            ("healthcare_improvement", 1.5, (0.02, 0.015, 0.05), 10.0, 3),
        ];
        let levers = levers
            .into_iter()
            .map(|(id, cost, (pop, eco, liv), cap, duration)| {
                let lever =
                    PolicyLever::new(id, cost, DomainEffects::new(pop, eco, liv), cap, duration);
                (lever.id.clone(), lever)
            })
            .collect();
        Self { levers }
    }

    /// Looks up a lever.
    pub fn get(&self, id: &str) -> Result<&PolicyLever, PolicyError> {
        self.levers
            .get(id)
            .ok_or_else(|| PolicyError::UnknownLever(id.to_string()))
    }

    /// Whether the catalogue has a lever with this id.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.levers.contains_key(id)
    }

    /// Number of levers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.levers.len()
    }

    /// Whether the catalogue has no levers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levers.is_empty()
    }

    /// Levers in catalogue order.
    pub fn iter(&self) -> impl Iterator<Item = &PolicyLever> {
        self.levers.values()
    }

    /// Lever ids in catalogue order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.levers.keys().cloned().collect()
    }

    /// Copy of the catalogue with one lever's unit cost replaced.
    pub fn with_cost(&self, id: &str, cost_per_unit: f64) -> Result<Self, PolicyError> {
        self.with_lever(id, |lever| lever.cost_per_unit = cost_per_unit)
    }

    /// Copy of the catalogue with one lever's coefficient for `domain` replaced.
    pub fn with_coefficient(
        &self,
        id: &str,
        domain: Domain,
        coefficient: f64,
    ) -> Result<Self, PolicyError> {
        self.with_lever(id, |lever| lever.effect_coefficients.set(domain, coefficient))
    }

    fn with_lever(
        &self,
        id: &str,
        edit: impl FnOnce(&mut PolicyLever),
    ) -> Result<Self, PolicyError> {
        let mut copy = self.clone();
        let lever = copy
            .levers
            .get_mut(id)
            .ok_or_else(|| PolicyError::UnknownLever(id.to_string()))?;
        edit(lever);
        lever.validate()?;
        Ok(copy)
    }

    /// Aggregate effect per domain: `Σ intensity · coefficient`.
    pub fn effects(&self, allocation: &Allocation) -> Result<DomainEffects, PolicyError> {
        let mut total = DomainEffects::default();
        for (id, intensity) in allocation.iter() {
            let lever = self.get(id)?;
            total.accumulate(&lever.effect_coefficients, intensity);
        }
        Ok(total)
    }

    /// Total spend of an allocation: `Σ intensity · cost_per_unit`.
    pub fn total_cost(&self, allocation: &Allocation) -> Result<f64, PolicyError> {
        allocation.iter().try_fold(0.0, |acc, (id, intensity)| {
            Ok(acc + intensity * self.get(id)?.cost_per_unit)
        })
    }
}

impl Default for LeverCatalogue {
    fn default() -> Self {
        Self::regional_default()
    }
}
