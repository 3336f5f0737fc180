//! Boundary to external forecasting models.
//!
//! The optimizer never trains or runs forecasts itself. Callers wrap their
//! models in [`ForecastSource`] and use [`LeverCatalogue::calibrate`] to turn a
//! with-policy versus baseline forecast into an effect coefficient.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    allocation::Allocation,
    catalogue::{Domain, LeverCatalogue},
    error::PolicyError,
};

/// Inputs for one forecast run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    /// Indicator being forecast.
    pub domain: Domain,
    /// Number of periods requested.
    pub horizon: u32,
    /// Policy interventions assumed in place; empty for the baseline.
    pub interventions: Allocation,
}

impl Scenario {
    /// No-policy scenario.
    #[must_use]
    pub fn baseline(domain: Domain, horizon: u32) -> Self {
        Self {
            domain,
            horizon,
            interventions: Allocation::new(),
        }
    }

    /// Scenario with `interventions` in place.
    #[must_use]
    pub const fn with_interventions(domain: Domain, horizon: u32, interventions: Allocation) -> Self {
        Self {
            domain,
            horizon,
            interventions,
        }
    }
}

/// A forecasting collaborator.
pub trait ForecastSource {
    /// One value per period of `scenario.horizon`.
    fn forecast(&self, scenario: &Scenario) -> Result<Vec<f64>>;
}

impl LeverCatalogue {
    /// Copy of the catalogue with `lever_id`'s `domain` coefficient re-estimated
    /// from forecasts.
    ///
    /// The coefficient becomes the final-period gap between a forecast with the
    /// lever at `intensity` and the baseline, divided by `intensity`.
    pub fn calibrate(
        &self,
        source: &dyn ForecastSource,
        lever_id: &str,
        domain: Domain,
        intensity: f64,
        horizon: u32,
    ) -> Result<Self> {
        self.get(lever_id)?;
        if !intensity.is_finite() || intensity <= 0.0 {
            return Err(PolicyError::InvalidIntensity {
                id: lever_id.to_string(),
                intensity,
            }
            .into());
        }
        if horizon == 0 {
            bail!("calibration horizon must be at least one period");
        }

        let baseline = source
            .forecast(&Scenario::baseline(domain, horizon))
            .with_context(|| format!("baseline {domain} forecast failed"))?;
        let interventions = Allocation::from_pairs([(lever_id, intensity)])?;
        let with_policy = source
            .forecast(&Scenario::with_interventions(domain, horizon, interventions))
            .with_context(|| format!("{lever_id} {domain} forecast failed"))?;

        if baseline.len() != with_policy.len() {
            bail!(
                "forecast series must be aligned (baseline {}, policy {})",
                baseline.len(),
                with_policy.len()
            );
        }
        let (Some(base_end), Some(policy_end)) = (baseline.last(), with_policy.last()) else {
            bail!("forecast series is empty");
        };
        let coefficient = (policy_end - base_end) / intensity;
        if !coefficient.is_finite() {
            bail!("forecast produced a non-finite {domain} coefficient for {lever_id}");
        }
        Ok(self.with_coefficient(lever_id, domain, coefficient)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Linear trend plus `slope · intensity` per period for every intervention.
    struct LinearModel {
        start: f64,
        trend: f64,
        slope: f64,
    }

    impl ForecastSource for LinearModel {
        fn forecast(&self, scenario: &Scenario) -> Result<Vec<f64>> {
            let push: f64 = scenario.interventions.iter().map(|(_, x)| x * self.slope).sum();
            Ok((1..=scenario.horizon)
                .map(|t| f64::from(t).mul_add(self.trend + push, self.start))
                .collect())
        }
    }

    struct Broken;

    impl ForecastSource for Broken {
        fn forecast(&self, scenario: &Scenario) -> Result<Vec<f64>> {
            if scenario.interventions.is_empty() {
                Ok(vec![1.0, 2.0])
            } else {
                Ok(vec![1.0])
            }
        }
    }

    #[test]
    fn derives_coefficient_from_final_gap() {
        let catalogue = LeverCatalogue::regional_default();
        let model = LinearModel {
            start: 100.0,
            trend: -0.5,
            slope: 0.01,
        };
        let calibrated = catalogue
            .calibrate(&model, "migration_support", Domain::Population, 4.0, 5)
            .unwrap();
        let lever = calibrated.get("migration_support").unwrap();
        // gap after 5 periods: 5 · 0.01 · 4 = 0.2, per unit intensity 0.05
        assert!((lever.effect_coefficients.population - 0.05).abs() < 1e-12);
        assert_eq!(
            catalogue.get("migration_support").unwrap().effect_coefficients.population,
            0.03
        );
        assert_eq!(
            lever.effect_coefficients.economic,
            catalogue.get("migration_support").unwrap().effect_coefficients.economic
        );
    }

    #[test]
    fn rejects_bad_inputs() {
        let catalogue = LeverCatalogue::regional_default();
        let model = LinearModel {
            start: 0.0,
            trend: 0.0,
            slope: 1.0,
        };
        assert!(catalogue
            .calibrate(&model, "ghost", Domain::Economic, 1.0, 3)
            .is_err());
        assert!(catalogue
            .calibrate(&model, "childcare_support", Domain::Economic, 0.0, 3)
            .is_err());
        assert!(catalogue
            .calibrate(&model, "childcare_support", Domain::Economic, 1.0, 0)
            .is_err());
        let err = catalogue
            .calibrate(&Broken, "childcare_support", Domain::Economic, 1.0, 2)
            .unwrap_err();
        assert!(err.to_string().contains("aligned"));
    }
}
