//! Parallel source filtering and splitting
//!
//! ## Table of Contents
//! - **SiteFilter**: Trait locating the sites affected by a source
//! - **SourceProcessor**: Filters and splits every source of a composite model
//! - **ProcessedSources**: Partial result of a batch of sources
//! - **SourceInfo**: Per-source timing record
//! - **ProcessingReport**: Records of one processing pass
//! - **pool**: Task managers running the heavy sources
//!
//! Heavy sources (see [`CostClass`]) are handed to a [`TaskManager`] on a
//! scoped thread while light sources are processed on the calling thread.
//! Both halves produce [`ProcessedSources`] values that are merged once
//! both are complete, and each group then receives its sub-sources.

pub mod pool;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::composite::CompositeSourceModel;
use crate::config::ProcessorConfig;
use crate::error::Result;
use crate::metrics::{ProcessorMetrics, Timer};
use crate::source::{source_weight, Source};
use crate::types::{CostClass, GroupId, SourceKind};

pub use pool::{RayonTaskManager, SequentialTaskManager, TaskManager, TaskStats};

/// Locates the sites affected by a source
pub trait SiteFilter<S>: Send + Sync {
    /// Indices of the sites within `maximum_distance` km of the source
    fn sites_within(&self, source: &S, maximum_distance: f64) -> Result<Vec<usize>>;
}

/// Timing record of one original source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Group of the source
    pub group_id: GroupId,
    /// Source ID
    pub source_id: String,
    /// Typology
    pub source_class: SourceKind,
    /// Number of sub-sources produced (0 if filtered away)
    pub num_split: usize,
    /// Seconds spent filtering
    pub filter_time: f64,
    /// Seconds spent splitting
    pub split_time: f64,
}

impl SourceInfo {
    /// Filter plus split time
    pub fn total_time(&self) -> f64 {
        self.filter_time + self.split_time
    }
}

/// Sub-sources per group, with the records of the sources they came from
#[derive(Debug, Clone)]
pub struct ProcessedSources<S> {
    /// Sub-sources keyed by group ID
    pub by_group: BTreeMap<GroupId, Vec<S>>,
    /// One record per original source
    pub infos: Vec<SourceInfo>,
}

impl<S> Default for ProcessedSources<S> {
    fn default() -> Self {
        Self {
            by_group: BTreeMap::new(),
            infos: Vec::new(),
        }
    }
}

impl<S> ProcessedSources<S> {
    /// Concatenate two partial results
    pub fn merge(mut self, other: Self) -> Self {
        for (group_id, sources) in other.by_group {
            self.by_group.entry(group_id).or_default().extend(sources);
        }
        self.infos.extend(other.infos);
        self
    }

    /// Total number of sub-sources
    pub fn num_sources(&self) -> usize {
        self.by_group.values().map(Vec::len).sum()
    }
}

/// Wall-clock time of the two halves of a processing pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTimes {
    /// Seconds spent on light sources, on the calling thread
    pub sequential: f64,
    /// Seconds spent on heavy sources, in the worker pool
    pub parallel: f64,
}

/// Immutable report of one processing pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingReport {
    /// Unique ID of the pass
    pub run_id: Uuid,
    /// When the pass completed
    pub completed_at: DateTime<Utc>,
    /// Records, slowest source first
    pub records: Vec<SourceInfo>,
    /// Timing of both halves
    pub times: ProcessingTimes,
}

impl ProcessingReport {
    fn new(mut records: Vec<SourceInfo>, times: ProcessingTimes) -> Self {
        records.sort_by(|a, b| {
            b.total_time()
                .total_cmp(&a.total_time())
                .then_with(|| a.source_id.cmp(&b.source_id))
        });
        Self {
            run_id: Uuid::new_v4(),
            completed_at: Utc::now(),
            records,
            times,
        }
    }

    /// Number of sub-sources produced
    pub fn num_split(&self) -> usize {
        self.records.iter().map(|r| r.num_split).sum()
    }

    /// Number of sources dropped by the filter
    pub fn num_discarded(&self) -> usize {
        self.records.iter().filter(|r| r.num_split == 0).count()
    }

    /// The `n` slowest records
    pub fn slowest(&self, n: usize) -> &[SourceInfo] {
        &self.records[..n.min(self.records.len())]
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Filters and splits the sources of a composite model
pub struct SourceProcessor<S> {
    site_filter: Option<Arc<dyn SiteFilter<S>>>,
    config: ProcessorConfig,
    metrics: Option<Arc<ProcessorMetrics>>,
}

impl<S: Source> SourceProcessor<S> {
    /// Create a processor that only splits
    pub fn new(config: ProcessorConfig) -> Self {
        Self {
            site_filter: None,
            config,
            metrics: None,
        }
    }

    /// Drop sources with no site within the maximum distance
    pub fn with_site_filter(mut self, filter: Arc<dyn SiteFilter<S>>) -> Self {
        self.site_filter = Some(filter);
        self
    }

    /// Record telemetry into the given metrics
    pub fn with_metrics(mut self, metrics: Arc<ProcessorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Processor configuration
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Filter then split one source
    pub fn filter_and_split(&self, group_id: GroupId, src: &S, parallel: bool) -> Result<ProcessedSources<S>> {
        let timer = Timer::start();
        let keep = match &self.site_filter {
            Some(filter) => !filter
                .sites_within(src, self.config.maximum_distance)?
                .is_empty(),
            None => true,
        };
        let filter_time = timer.stop();

        let timer = Timer::start();
        let mut sources = Vec::new();
        if keep {
            sources = src.split(self.config.area_source_discretization)?;
            for sub in &mut sources {
                sub.set_weight(source_weight(sub, None));
                sub.set_group_id(group_id);
            }
        }
        let split_time = timer.stop();

        debug!(
            source_id = src.source_id(),
            group_id = %group_id,
            num_split = sources.len(),
            "Processed source"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_source(src.kind(), parallel, sources.len(), filter_time, split_time);
        }

        let info = SourceInfo {
            group_id,
            source_id: src.source_id().to_string(),
            source_class: src.kind(),
            num_split: sources.len(),
            filter_time,
            split_time,
        };
        let mut by_group = BTreeMap::new();
        by_group.insert(group_id, sources);
        Ok(ProcessedSources {
            by_group,
            infos: vec![info],
        })
    }

    /// Filter and split every source of the composite model in place
    ///
    /// Each group ends up with its sub-sources sorted by ID. The first error
    /// raised by a filter or a split aborts the pass and leaves the composite
    /// model untouched.
    pub fn process<M: TaskManager>(&self, csm: &mut CompositeSourceModel<S>, manager: &M) -> Result<ProcessingTimes> {
        self.config.validate()?;

        let (heavy, light): (Vec<(GroupId, &S)>, Vec<(GroupId, &S)>) = csm
            .tagged_sources()
            .partition(|(_, src)| src.kind().cost_class() == CostClass::Heavy);
        info!(
            heavy = heavy.len(),
            light = light.len(),
            filtering = self.site_filter.is_some(),
            "Filtering and splitting sources"
        );

        let (parallel, sequential) = std::thread::scope(|scope| {
            let handle = scope.spawn(|| {
                let timer = Timer::start();
                let result = manager.map_reduce(
                    heavy,
                    |(group_id, src)| self.filter_and_split(group_id, src, true),
                    ProcessedSources::merge,
                );
                (result, timer.stop())
            });

            let timer = Timer::start();
            let result = light
                .into_iter()
                .try_fold(
                    ProcessedSources::default(),
                    |acc, (group_id, src)| -> Result<ProcessedSources<S>> {
                        Ok(acc.merge(self.filter_and_split(group_id, src, false)?))
                    },
                );
            let sequential = (result, timer.stop());

            match handle.join() {
                Ok(parallel) => (parallel, sequential),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        });

        let (parallel, parallel_time) = parallel;
        let (sequential, sequential_time) = sequential;
        let processed = sequential?.merge(parallel?);
        let times = ProcessingTimes {
            sequential: sequential_time,
            parallel: parallel_time,
        };

        let ProcessedSources {
            mut by_group,
            infos,
        } = processed;
        let mut replacements = Vec::new();
        for group in csm.groups() {
            let mut sources = by_group.remove(&group.id).unwrap_or_default();
            sources.sort_by(|a, b| a.source_id().cmp(b.source_id()));
            group.check_replacement(&sources)?;
            replacements.push(sources);
        }
        for (group, sources) in csm.groups_mut().zip(replacements) {
            group.replace_sources(sources)?;
            group.count_ruptures(true);
            if group.is_empty() {
                warn!(
                    group_id = %group.id,
                    trt = %group.trt,
                    "No sources survived filtering for this tectonic region type"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_empty_group();
                }
            }
        }

        let report = ProcessingReport::new(infos, times);
        info!(
            run_id = %report.run_id,
            split = report.num_split(),
            discarded = report.num_discarded(),
            sequential_secs = times.sequential,
            parallel_secs = times.parallel,
            "Source processing complete"
        );
        csm.set_processing_report(report);
        Ok(times)
    }
}

impl<S> std::fmt::Debug for SourceProcessor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceProcessor")
            .field("filtering", &self.site_filter.is_some())
            .field("config", &self.config)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}
