//! Calculation configuration
//!
//! ## Table of Contents
//! - **SamplingConfig**: Logic tree sampling parameters
//! - **ProcessorConfig**: Source filtering/splitting parameters
//! - **CalculationConfig**: Complete configuration, loadable from JSON

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CompositeError, Result};

/// Logic tree sampling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Master seed; each source model draws with `random_seed + ordinal`
    pub random_seed: u64,
    /// Total number of realizations to sample; 0 means full enumeration
    pub number_of_logic_tree_samples: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            random_seed: 42,
            number_of_logic_tree_samples: 0,
        }
    }
}

impl SamplingConfig {
    /// Full enumeration of the logic tree
    pub fn enumeration() -> Self {
        Self::default()
    }

    /// Monte Carlo sampling of `samples` realizations
    pub fn sampling(samples: usize) -> Self {
        Self {
            number_of_logic_tree_samples: samples,
            ..Self::default()
        }
    }

    /// Set the master seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    /// True when the logic tree is sampled rather than enumerated
    pub fn is_sampling(&self) -> bool {
        self.number_of_logic_tree_samples > 0
    }

    /// Seed of the generator used for the source model with the given ordinal
    pub fn seed_for(&self, ordinal: usize) -> u64 {
        self.random_seed.wrapping_add(ordinal as u64)
    }
}

/// Source filtering and splitting parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Maximum source-site distance in km
    pub maximum_distance: f64,
    /// Discretization used when splitting area-like sources, in km
    pub area_source_discretization: f64,
    /// Worker threads for heavy sources (0 = one per CPU)
    pub num_workers: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            maximum_distance: 200.0,
            area_source_discretization: 10.0,
            num_workers: 0,
        }
    }
}

impl ProcessorConfig {
    /// Create a new processor config
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum distance
    pub fn maximum_distance(mut self, km: f64) -> Self {
        self.maximum_distance = km;
        self
    }

    /// Set the area source discretization
    pub fn discretization(mut self, km: f64) -> Self {
        self.area_source_discretization = km;
        self
    }

    /// Set the number of worker threads
    pub fn workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    /// Check that distances are positive and finite
    pub fn validate(&self) -> Result<()> {
        if !(self.maximum_distance.is_finite() && self.maximum_distance > 0.0) {
            return Err(CompositeError::config(format!(
                "maximum_distance must be positive, got {}",
                self.maximum_distance
            )));
        }
        if !(self.area_source_discretization.is_finite() && self.area_source_discretization > 0.0)
        {
            return Err(CompositeError::config(format!(
                "area_source_discretization must be positive, got {}",
                self.area_source_discretization
            )));
        }
        Ok(())
    }
}

/// Complete calculation configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculationConfig {
    /// Logic tree sampling
    pub sampling: SamplingConfig,
    /// Source processing
    pub processor: ProcessorConfig,
}

impl CalculationConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        self.processor.validate()
    }
}
