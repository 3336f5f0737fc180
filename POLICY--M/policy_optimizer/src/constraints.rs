use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Budget and capacity limits applied to one optimization call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Constraints {
    /// Total spend allowed across the whole plan.
    #[serde(default = "default_total_budget")]
    pub total_budget: f64,
    /// Spend allowed in any single period of the schedule.
    #[serde(default = "default_annual_budget")]
    pub annual_budget: f64,
    /// Floor applied to every lever's intensity.
    #[serde(default)]
    pub min_intensity: f64,
    /// Levers that may be in implementation during the same period.
    #[serde(default = "default_max_concurrent_levers")]
    pub max_concurrent_levers: usize,
    /// Intensity units that may be deployed in any single period.
    #[serde(default = "default_annual_capacity")]
    pub annual_capacity: f64,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            total_budget: default_total_budget(),
            annual_budget: default_annual_budget(),
            min_intensity: 0.0,
            max_concurrent_levers: default_max_concurrent_levers(),
            annual_capacity: default_annual_capacity(),
        }
    }
}

impl Constraints {
    /// Applies per-request overrides on top of `self`.
    #[must_use]
    pub fn merged(&self, overrides: &ConstraintOverrides) -> Self {
        Self {
            total_budget: overrides.total_budget.unwrap_or(self.total_budget),
            annual_budget: overrides.annual_budget.unwrap_or(self.annual_budget),
            min_intensity: overrides.min_intensity.unwrap_or(self.min_intensity),
            max_concurrent_levers: overrides
                .max_concurrent_levers
                .unwrap_or(self.max_concurrent_levers),
            annual_capacity: overrides.annual_capacity.unwrap_or(self.annual_capacity),
        }
    }

    /// Copy with a different total budget.
    #[must_use]
    pub fn with_total_budget(mut self, total_budget: f64) -> Self {
        self.total_budget = total_budget;
        self
    }

    /// Rejects negative, NaN, or infinite limits.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let checks = [
            ("total_budget", self.total_budget),
            ("annual_budget", self.annual_budget),
            ("min_intensity", self.min_intensity),
            ("annual_capacity", self.annual_capacity),
        ];
        for (name, value) in checks {
            if !value.is_finite() || value < 0.0 {
                return Err(PolicyError::MalformedConstraints(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if self.max_concurrent_levers == 0 {
            return Err(PolicyError::MalformedConstraints(
                "max_concurrent_levers must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Optional per-request constraint values; absent fields fall back to the defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ConstraintOverrides {
    /// Overrides [`Constraints::total_budget`].
    #[serde(default)]
    pub total_budget: Option<f64>,
    /// Overrides [`Constraints::annual_budget`].
    #[serde(default)]
    pub annual_budget: Option<f64>,
    /// Overrides [`Constraints::min_intensity`].
    #[serde(default)]
    pub min_intensity: Option<f64>,
    /// Overrides [`Constraints::max_concurrent_levers`].
    #[serde(default)]
    pub max_concurrent_levers: Option<usize>,
    /// Overrides [`Constraints::annual_capacity`].
    #[serde(default)]
    pub annual_capacity: Option<f64>,
}

impl ConstraintOverrides {
    /// Overrides only the total budget.
    #[must_use]
    pub fn budget(total_budget: f64) -> Self {
        Self {
            total_budget: Some(total_budget),
            ..Self::default()
        }
    }
}

const fn default_total_budget() -> f64 {
    100.0
}

const fn default_annual_budget() -> f64 {
    25.0
}

const fn default_max_concurrent_levers() -> usize {
    5
}

const fn default_annual_capacity() -> f64 {
    30.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_only_present_fields() {
        let merged = Constraints::default().merged(&ConstraintOverrides {
            total_budget: Some(40.0),
            min_intensity: Some(0.5),
            ..ConstraintOverrides::default()
        });
        assert_eq!(merged.total_budget, 40.0);
        assert_eq!(merged.min_intensity, 0.5);
        assert_eq!(merged.annual_budget, 25.0);
        assert_eq!(merged.max_concurrent_levers, 5);
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(Constraints::default().validate().is_ok());
        assert!(Constraints::default()
            .with_total_budget(-1.0)
            .validate()
            .is_err());
        assert!(Constraints::default()
            .with_total_budget(f64::NAN)
            .validate()
            .is_err());
        let no_slots = Constraints {
            max_concurrent_levers: 0,
            ..Constraints::default()
        };
        assert!(matches!(
            no_slots.validate(),
            Err(PolicyError::MalformedConstraints(_))
        ));
    }
}
