//! CompositeBuilder for assembling composite source models
//!
//! ## Table of Contents
//! - **SourceModelBranch**: One source model branch with its raw sources
//! - **CompositeBuilder**: Groups sources by TRT, assigns IDs and ordinals

use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

use crate::composite::CompositeSourceModel;
use crate::config::SamplingConfig;
use crate::error::{CompositeError, Result};
use crate::logictree::BoxedChoiceTree;
use crate::source::{Source, SourceGroup, SourceModel};
use crate::types::GroupId;

/// A source model branch before grouping
#[derive(Debug, Clone)]
pub struct SourceModelBranch<S> {
    name: String,
    weight: f64,
    path: Vec<String>,
    gsim_lt: BoxedChoiceTree,
    samples: usize,
    sources: Vec<S>,
}

impl<S: Source> SourceModelBranch<S> {
    /// Create a branch with weight 1, sampled once
    pub fn new(name: impl Into<String>, gsim_lt: BoxedChoiceTree) -> Self {
        Self {
            name: name.into(),
            weight: 1.0,
            path: Vec::new(),
            gsim_lt,
            samples: 1,
            sources: Vec::new(),
        }
    }

    /// Set the branch weight
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Set the logic tree path
    pub fn with_path(mut self, path: Vec<impl Into<String>>) -> Self {
        self.path = path.into_iter().map(|p| p.into()).collect();
        self
    }

    /// Set how many times the branch was drawn
    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    /// Add one source
    pub fn with_source(mut self, source: S) -> Self {
        self.sources.push(source);
        self
    }

    /// Add several sources
    pub fn with_sources(mut self, sources: impl IntoIterator<Item = S>) -> Self {
        self.sources.extend(sources);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.samples == 0 {
            return Err(CompositeError::config(format!(
                "source model {} must be sampled at least once",
                self.name
            )));
        }
        if !(self.weight.is_finite() && self.weight >= 0.0) {
            return Err(CompositeError::config(format!(
                "source model {} has invalid weight {}",
                self.name, self.weight
            )));
        }
        let mut seen = HashSet::new();
        for src in &self.sources {
            if !seen.insert(src.source_id()) {
                return Err(CompositeError::DuplicatedId {
                    source_id: src.source_id().to_string(),
                    scope: format!("source model {}", self.name),
                });
            }
        }
        Ok(())
    }
}

/// Builder for constructing composite source models
pub struct CompositeBuilder<S> {
    sampling: SamplingConfig,
    branches: Vec<SourceModelBranch<S>>,
}

impl<S: Source> CompositeBuilder<S> {
    /// Create a builder in full enumeration mode
    pub fn new() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            branches: Vec::new(),
        }
    }

    /// Set the sampling parameters
    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    /// Append a source model branch; ordinals follow insertion order
    pub fn source_model(mut self, branch: SourceModelBranch<S>) -> Self {
        self.branches.push(branch);
        self
    }

    fn validate_sampling(&self) -> Result<()> {
        if !self.sampling.is_sampling() {
            if let Some(branch) = self.branches.iter().find(|b| b.samples > 1) {
                return Err(CompositeError::config(format!(
                    "source model {} has {} samples but the logic tree is enumerated",
                    branch.name, branch.samples
                )));
            }
            return Ok(());
        }
        let total: usize = self.branches.iter().map(|b| b.samples).sum();
        if total != self.sampling.number_of_logic_tree_samples {
            return Err(CompositeError::config(format!(
                "source model samples add up to {}, expected {}",
                total, self.sampling.number_of_logic_tree_samples
            )));
        }
        Ok(())
    }

    /// Build the composite source model
    ///
    /// In sampling mode the branch samples must add up to the configured
    /// number of logic tree samples; in enumeration mode every branch must be
    /// sampled exactly once.
    pub fn build(self) -> Result<CompositeSourceModel<S>> {
        info!(
            source_models = self.branches.len(),
            samples = self.sampling.number_of_logic_tree_samples,
            seed = self.sampling.random_seed,
            "Building composite source model"
        );
        self.validate_sampling()?;

        let mut next_id = 1u32;
        let mut source_models = Vec::with_capacity(self.branches.len());
        for (ordinal, branch) in self.branches.into_iter().enumerate() {
            branch.validate()?;

            let mut by_trt: BTreeMap<String, SourceGroup<S>> = BTreeMap::new();
            for src in branch.sources {
                let trt = src.tectonic_region_type().to_string();
                by_trt
                    .entry(trt.clone())
                    .or_insert_with(|| SourceGroup::new(trt))
                    .update(src)?;
            }
            let mut groups: Vec<SourceGroup<S>> = by_trt.into_values().collect();
            groups.sort_by(|a, b| a.ordering(b));
            for group in &mut groups {
                group.id = GroupId(next_id);
                next_id += 1;
            }

            debug!(
                ordinal,
                model = %branch.name,
                groups = groups.len(),
                "Assembled source model"
            );
            source_models.push(SourceModel {
                name: branch.name,
                weight: branch.weight,
                path: branch.path,
                groups,
                gsim_lt: branch.gsim_lt,
                ordinal,
                samples: branch.samples,
            });
        }

        Ok(CompositeSourceModel::new(source_models, self.sampling))
    }
}

impl<S: Source> Default for CompositeBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}
