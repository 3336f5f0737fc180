use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Intensity chosen for each lever.
///
/// Intensities are always finite and non-negative. Levers absent from the map
/// run at zero. Whether the allocation respects a budget is a separate question
/// answered by [`crate::FeasibilityValidator`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Allocation {
    intensities: IndexMap<String, f64>,
}

impl Allocation {
    /// Empty allocation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an allocation from `(lever, intensity)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut allocation = Self::new();
        for (id, intensity) in pairs {
            allocation.insert(id, intensity)?;
        }
        Ok(allocation)
    }

    /// Sets the intensity for a lever.
    pub fn insert(&mut self, id: impl Into<String>, intensity: f64) -> Result<(), PolicyError> {
        let id = id.into();
        if !intensity.is_finite() || intensity < 0.0 {
            return Err(PolicyError::InvalidIntensity { id, intensity });
        }
        self.intensities.insert(id, intensity);
        Ok(())
    }

    /// Zips solver output back onto lever ids, flushing round-off below zero.
    pub(crate) fn from_vector(ids: &[String], values: &[f64]) -> Self {
        let intensities = ids
            .iter()
            .zip(values)
            .map(|(id, value)| (id.clone(), if value.is_finite() { value.max(0.0) } else { 0.0 }))
            .collect();
        Self { intensities }
    }

    /// Intensity for `id`, zero when absent.
    #[must_use]
    pub fn get(&self, id: &str) -> f64 {
        self.intensities.get(id).copied().unwrap_or(0.0)
    }

    /// `(lever, intensity)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.intensities
            .iter()
            .map(|(id, intensity)| (id.as_str(), *intensity))
    }

    /// Pairs with strictly positive intensity.
    pub fn active(&self) -> impl Iterator<Item = (&str, f64)> {
        self.iter().filter(|(_, intensity)| *intensity > 0.0)
    }

    /// Number of entries, including zero-intensity ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.intensities.len()
    }

    /// Whether no lever has an entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intensities.is_empty()
    }
}
