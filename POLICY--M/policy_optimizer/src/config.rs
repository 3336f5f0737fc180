use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    catalogue::{LeverCatalogue, PolicyLever},
    constraints::{ConstraintOverrides, Constraints},
    solver::SolverSettings,
    validator::UncertaintyBands,
};

/// Everything the optimizer needs besides per-request parameters.
///
/// Built once at startup and passed by reference; nothing in the crate keeps a
/// global copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyModel {
    /// Lever catalogue.
    pub catalogue: LeverCatalogue,
    /// Constraints used when a request does not override them.
    pub constraints: Constraints,
    /// Validator uncertainty bands.
    pub uncertainty: UncertaintyBands,
    /// Strategy tuning and seed.
    pub solver: SolverSettings,
}

impl PolicyModel {
    /// Model with a custom catalogue and default everything else.
    #[must_use]
    pub fn with_catalogue(catalogue: LeverCatalogue) -> Self {
        Self {
            catalogue,
            ..Self::default()
        }
    }

    /// Default constraints with `overrides` applied.
    #[must_use]
    pub fn constraints_for(&self, overrides: &ConstraintOverrides) -> Constraints {
        self.constraints.merged(overrides)
    }

    /// Loads a model from a TOML file.
    ///
    /// Missing sections fall back to defaults; an absent or empty `[[levers]]`
    /// array selects the built-in regional catalogue.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading policy model {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parses a model from TOML text.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let document: PolicyModelDocument = toml::from_str(raw)?;
        document
            .constraints
            .validate()
            .context("invalid [constraints]")?;
        let bands = &document.uncertainty;
        for (name, ratio) in [
            ("population", bands.population),
            ("economic", bands.economic),
            ("livability", bands.livability),
        ] {
            if !ratio.is_finite() || ratio < 0.0 {
                bail!("invalid [uncertainty] {name}: {ratio}");
            }
        }
        let solver = &document.solver;
        if solver.evolution.population_factor == 0 || solver.evolution.max_generations == 0 {
            bail!("[solver.evolution] population_factor and max_generations must be positive");
        }
        if solver.surrogate.initial_samples > solver.surrogate.evaluations {
            bail!(
                "[solver.surrogate] initial_samples ({}) exceeds evaluations ({})",
                solver.surrogate.initial_samples,
                solver.surrogate.evaluations
            );
        }
        let catalogue = if document.levers.is_empty() {
            LeverCatalogue::regional_default()
        } else {
            LeverCatalogue::new(document.levers).context("invalid [[levers]]")?
        };
        Ok(Self {
            catalogue,
            constraints: document.constraints,
            uncertainty: document.uncertainty,
            solver: document.solver,
        })
    }

    /// Renders the model as TOML.
    pub fn to_toml(&self) -> Result<String> {
        let document = PolicyModelDocument {
            constraints: self.constraints,
            uncertainty: self.uncertainty,
            solver: self.solver.clone(),
            levers: self.catalogue.iter().cloned().collect(),
        };
        Ok(toml::to_string_pretty(&document)?)
    }

    /// Writes the model to `path`, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(path, self.to_toml()?)
            .with_context(|| format!("writing policy model {}", path.display()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PolicyModelDocument {
    #[serde(default)]
    constraints: Constraints,
    #[serde(default)]
    uncertainty: UncertaintyBands,
    #[serde(default)]
    solver: SolverSettings,
    #[serde(default)]
    levers: Vec<PolicyLever>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{Domain, DomainEffects};
    use tempfile::tempdir;

    #[test]
    fn empty_document_yields_defaults() {
        let model = PolicyModel::from_toml("").unwrap();
        assert_eq!(model, PolicyModel::default());
        assert_eq!(model.catalogue.len(), 6);
        assert_eq!(model.constraints.total_budget, 100.0);
        assert_eq!(model.constraints.annual_budget, 25.0);
        assert_eq!(model.solver.seed, 42);
    }

    #[test]
    fn loads_partial_document() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("model.toml");
        fs::write(
            &path,
            r#"
[constraints]
total_budget = 40.0
max_concurrent_levers = 2

[uncertainty]
economic = 0.5

[solver]
seed = 7

[solver.surrogate]
evaluations = 20

[[levers]]
id = "transit"
cost_per_unit = 1.5
max_intensity = 12.0
implementation_duration = 3

[levers.effect_coefficients]
economic = 0.04
livability = 0.02
"#,
        )
        .unwrap();
        let model = PolicyModel::load(&path).unwrap();
        assert_eq!(model.constraints.total_budget, 40.0);
        assert_eq!(model.constraints.annual_budget, 25.0);
        assert_eq!(model.constraints.max_concurrent_levers, 2);
        assert_eq!(model.uncertainty.economic, 0.5);
        assert_eq!(model.uncertainty.population, 0.2);
        assert_eq!(model.solver.seed, 7);
        assert_eq!(model.solver.surrogate.evaluations, 20);
        assert_eq!(model.solver.surrogate.initial_samples, 10);
        let transit = model.catalogue.get("transit").unwrap();
        assert_eq!(transit.effect_coefficients.get(Domain::Population), 0.0);
        assert_eq!(transit.effect_coefficients.get(Domain::Economic), 0.04);
    }

    #[test]
    fn save_then_load_preserves_model() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("model.toml");
        let catalogue = LeverCatalogue::new([
            PolicyLever::new("a", 1.0, DomainEffects::new(2.0, 0.0, 0.0), 10.0, 1),
            PolicyLever::new("open", 0.5, DomainEffects::new(0.0, 1.0, 0.0), f64::INFINITY, 2),
        ])
        .unwrap();
        let model = PolicyModel {
            constraints: Constraints::default().with_total_budget(12.5),
            ..PolicyModel::with_catalogue(catalogue)
        };
        model.save(&path).unwrap();
        assert_eq!(PolicyModel::load(&path).unwrap(), model);
    }

    #[test]
    fn rejects_invalid_documents() {
        let negative = "[constraints]\ntotal_budget = -1.0\n";
        assert!(PolicyModel::from_toml(negative).is_err());

        let duplicate = r#"
[[levers]]
id = "a"
cost_per_unit = 1.0
max_intensity = 1.0
implementation_duration = 1
[[levers]]
id = "a"
cost_per_unit = 2.0
max_intensity = 1.0
implementation_duration = 1
"#;
        let err = PolicyModel::from_toml(duplicate).unwrap_err();
        assert!(format!("{err:#}").contains("duplicate policy lever"));

        let surrogate = "[solver.surrogate]\nevaluations = 5\ninitial_samples = 8\n";
        assert!(PolicyModel::from_toml(surrogate).is_err());

        let missing = std::env::temp_dir().join("policy-model-does-not-exist.toml");
        assert!(PolicyModel::load(missing).is_err());
    }
}
