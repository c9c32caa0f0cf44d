//! Weighted dataset mixtures.

use crate::error::Result;
use crate::query::QueryFilter;
use datakit_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_weight() -> f64 {
    1.0
}

fn default_seed() -> u64 {
    42
}

/// One dataset in a mixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetWeight {
    /// Dataset name
    pub name: String,
    /// Relative sampling weight
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Episodes of the dataset to include
    #[serde(default)]
    pub filter: QueryFilter,
}

/// Named, weighted set of datasets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixtureSpec {
    /// Mixture name
    pub name: String,
    /// Member datasets
    pub datasets: Vec<DatasetWeight>,
    /// Sampling seed
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl MixtureSpec {
    /// Empty mixture
    pub fn new(name: impl Into<String>) -> Self {
        MixtureSpec {
            name: name.into(),
            datasets: Vec::new(),
            seed: default_seed(),
        }
    }

    /// Add a dataset with no filter
    pub fn with_dataset(mut self, name: impl Into<String>, weight: f64) -> Self {
        self.datasets.push(DatasetWeight {
            name: name.into(),
            weight,
            filter: QueryFilter::default(),
        });
        self
    }

    /// Reject empty mixtures and negative, non-finite or all-zero weights.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.datasets.is_empty() {
            return Err(ConfigError::Invalid(format!("mixture '{}' has no datasets", self.name)));
        }
        if let Some(d) = self.datasets.iter().find(|d| !d.weight.is_finite() || d.weight < 0.0) {
            return Err(ConfigError::Invalid(format!(
                "dataset '{}' has invalid weight {}",
                d.name, d.weight
            )));
        }
        if self.datasets.iter().map(|d| d.weight).sum::<f64>() <= 0.0 {
            return Err(ConfigError::Invalid(format!("mixture '{}' has zero total weight", self.name)));
        }
        for d in &self.datasets {
            d.filter.compile()?;
        }
        Ok(())
    }

    /// Weights scaled to sum to 1.
    pub fn normalized_weights(&self) -> std::result::Result<Vec<(String, f64)>, ConfigError> {
        self.validate()?;
        let total: f64 = self.datasets.iter().map(|d| d.weight).sum();
        Ok(self
            .datasets
            .iter()
            .map(|d| (d.name.clone(), d.weight / total))
            .collect())
    }

    /// Write as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Read and validate a mixture file.
    pub fn load(path: &Path) -> Result<Self> {
        let spec: MixtureSpec = serde_json::from_str(&fs::read_to_string(path)?)?;
        spec.validate()?;
        Ok(spec)
    }
}
