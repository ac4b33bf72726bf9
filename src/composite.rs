//! Composite source model
//!
//! A [`CompositeSourceModel`] is the full set of source model branches of a
//! calculation, together with the collection layout derived from them and
//! the sampling parameters used to build realizations.

use std::fmt;

use crate::assoc::RlzsAssoc;
use crate::composition::CompositionInfo;
use crate::config::SamplingConfig;
use crate::error::Result;
use crate::processor::ProcessingReport;
use crate::source::{Source, SourceGroup, SourceModel};
use crate::types::GroupId;

/// All source model branches of a calculation
#[derive(Debug, Clone)]
pub struct CompositeSourceModel<S> {
    source_models: Vec<SourceModel<S>>,
    info: CompositionInfo,
    sampling: SamplingConfig,
    processing_report: Option<ProcessingReport>,
}

impl<S> CompositeSourceModel<S> {
    /// Wrap already assembled source models
    ///
    /// Collection IDs are allocated here, so group IDs must be final.
    pub fn new(source_models: Vec<SourceModel<S>>, sampling: SamplingConfig) -> Self {
        let info = CompositionInfo::new(&source_models);
        Self {
            source_models,
            info,
            sampling,
            processing_report: None,
        }
    }

    /// Collection layout
    pub fn info(&self) -> &CompositionInfo {
        &self.info
    }

    /// Sampling parameters
    pub fn sampling(&self) -> &SamplingConfig {
        &self.sampling
    }

    /// Source models, in order
    pub fn source_models(&self) -> &[SourceModel<S>] {
        &self.source_models
    }

    pub(crate) fn source_model_mut(&mut self, i: usize) -> &mut SourceModel<S> {
        &mut self.source_models[i]
    }

    /// Iterate over the source models
    pub fn iter(&self) -> std::slice::Iter<'_, SourceModel<S>> {
        self.source_models.iter()
    }

    /// Number of source models
    pub fn len(&self) -> usize {
        self.source_models.len()
    }

    /// True if there are no source models
    pub fn is_empty(&self) -> bool {
        self.source_models.is_empty()
    }

    /// All groups, in model order
    pub fn groups(&self) -> impl Iterator<Item = &SourceGroup<S>> + '_ {
        self.source_models.iter().flat_map(|sm| sm.groups.iter())
    }

    /// All groups, mutably
    pub fn groups_mut(&mut self) -> impl Iterator<Item = &mut SourceGroup<S>> + '_ {
        self.source_models
            .iter_mut()
            .flat_map(|sm| sm.groups.iter_mut())
    }

    /// Sources paired with the ID of their group, in group order
    pub fn tagged_sources(&self) -> impl Iterator<Item = (GroupId, &S)> + '_ {
        self.groups()
            .flat_map(|group| group.iter().map(move |src| (group.id, src)))
    }

    /// Total number of sources
    pub fn num_sources(&self) -> usize {
        self.source_models.iter().map(SourceModel::num_sources).sum()
    }

    /// Copy of the composite with every group emptied
    pub fn skeleton(&self) -> Self {
        Self {
            source_models: self.source_models.iter().map(SourceModel::skeleton).collect(),
            info: self.info.clone(),
            sampling: self.sampling.clone(),
            processing_report: self.processing_report.clone(),
        }
    }

    /// Report of the last processing pass
    pub fn processing_report(&self) -> Option<&ProcessingReport> {
        self.processing_report.as_ref()
    }

    pub(crate) fn set_processing_report(&mut self, report: ProcessingReport) {
        self.processing_report = Some(report);
    }
}

impl<S: Source> CompositeSourceModel<S> {
    /// Tag every source with its group ID and return all sources in group order
    pub fn flatten(&mut self) -> Vec<&S> {
        for group in self.groups_mut() {
            group.tag_sources();
        }
        self.groups().flat_map(SourceGroup::iter).collect()
    }

    /// Count the ruptures of every group whose count is unknown, or of all groups if `force`
    pub fn count_ruptures(&mut self, force: bool) -> u64 {
        self.groups_mut().map(|group| group.count_ruptures(force)).sum()
    }

    /// Build the realization association, weighting groups by rupture count
    pub fn rlzs_assoc(&mut self) -> Result<RlzsAssoc> {
        self.count_ruptures(false);
        RlzsAssoc::build(self, |group| group.num_ruptures as f64)
    }

    /// Build the realization association with a custom group weight
    pub fn rlzs_assoc_with<F>(&mut self, get_weight: F) -> Result<RlzsAssoc>
    where
        F: Fn(&SourceGroup<S>) -> f64,
    {
        RlzsAssoc::build(self, get_weight)
    }
}

impl<S> std::ops::Index<usize> for CompositeSourceModel<S> {
    type Output = SourceModel<S>;

    fn index(&self, i: usize) -> &SourceModel<S> {
        &self.source_models[i]
    }
}

impl<'a, S> IntoIterator for &'a CompositeSourceModel<S> {
    type Item = &'a SourceModel<S>;
    type IntoIter = std::slice::Iter<'a, SourceModel<S>>;

    fn into_iter(self) -> Self::IntoIter {
        self.source_models.iter()
    }
}

impl<S> fmt::Display for CompositeSourceModel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let models: Vec<String> = self
            .source_models
            .iter()
            .map(|sm| {
                format!(
                    "{}-{}-{},w={} [{} group(s)]",
                    sm.ordinal,
                    sm.name,
                    sm.path_str(),
                    sm.weight,
                    sm.groups.len()
                )
            })
            .collect();
        write!(f, "<CompositeSourceModel\n{}>", models.join("\n"))
    }
}
