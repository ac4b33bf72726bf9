//! Sources, source groups and source models
//!
//! ## Table of Contents
//! - **Source**: Trait implemented by seismic source objects
//! - **source_weight**: Computational weight of a source
//! - **SourceGroup**: Sources sharing a tectonic region type (TRT)
//! - **SourceModel**: Weighted branch of the source model logic tree

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use crate::error::{CompositeError, Result};
use crate::logictree::BoxedChoiceTree;
use crate::types::{GroupId, SourceKind};

/// A seismic source as seen by the composite model
///
/// The physics behind a source is opaque here: the composite model only
/// needs its identity, its typology, its magnitude range and the number of
/// ruptures it generates, plus the ability to split it into sub-sources.
pub trait Source: Clone + Send + Sync {
    /// Unique identifier of the source
    fn source_id(&self) -> &str;

    /// Tectonic region type of the source
    fn tectonic_region_type(&self) -> &str;

    /// Typology of the source
    fn kind(&self) -> SourceKind;

    /// Minimum and maximum magnitude
    fn min_max_mag(&self) -> (f64, f64);

    /// Number of ruptures generated by the source
    fn count_ruptures(&self) -> u64;

    /// Split the source into sub-sources at the given discretization (km)
    fn split(&self, discretization: f64) -> Result<Vec<Self>>;

    /// Store the computational weight
    fn set_weight(&mut self, weight: f64);

    /// Group the source was tagged with, if the source keeps a tag
    fn group_id(&self) -> Option<GroupId> {
        None
    }

    /// Tag the source with its group; sources without a tag field ignore it
    fn set_group_id(&mut self, _id: GroupId) {}
}

/// Computational weight of a source
///
/// Point sources are cheaper per rupture than any other typology. When
/// `num_ruptures` is `None` (or zero) the ruptures are counted.
pub fn source_weight<S: Source>(source: &S, num_ruptures: Option<u64>) -> f64 {
    let num_ruptures = match num_ruptures {
        Some(n) if n > 0 => n,
        _ => source.count_ruptures(),
    };
    num_ruptures as f64 * source.kind().weight_factor()
}

/// Sources sharing a tectonic region type
#[derive(Debug, Clone)]
pub struct SourceGroup<S> {
    /// Tectonic region type
    pub trt: String,
    sources: Vec<S>,
    /// Cached number of ruptures (0 means not counted)
    pub num_ruptures: u64,
    /// Minimum magnitude among the sources
    pub min_mag: Option<f64>,
    /// Maximum magnitude among the sources
    pub max_mag: Option<f64>,
    /// GSIMs associated to the tectonic region type
    pub gsims: Vec<String>,
    /// Group ID, used as a join key by the realization association
    pub id: GroupId,
}

impl<S: Source> SourceGroup<S> {
    /// Create an empty group
    pub fn new(trt: impl Into<String>) -> Self {
        Self {
            trt: trt.into(),
            sources: Vec::new(),
            num_ruptures: 0,
            min_mag: None,
            max_mag: None,
            gsims: Vec::new(),
            id: GroupId::default(),
        }
    }

    /// Create a group from an initial list of sources
    pub fn with_sources(trt: impl Into<String>, sources: Vec<S>) -> Result<Self> {
        let mut group = Self::new(trt);
        for src in sources {
            group.update(src)?;
        }
        Ok(group)
    }

    /// Set the group ID
    pub fn with_id(mut self, id: GroupId) -> Self {
        self.id = id;
        self
    }

    /// Append a source and widen the magnitude range
    pub fn update(&mut self, src: S) -> Result<()> {
        if src.tectonic_region_type() != self.trt {
            return Err(CompositeError::TrtMismatch {
                expected: self.trt.clone(),
                found: src.tectonic_region_type().to_string(),
                source_id: src.source_id().to_string(),
            });
        }
        let (min_mag, max_mag) = src.min_max_mag();
        if self.min_mag.map_or(true, |prev| min_mag < prev) {
            self.min_mag = Some(min_mag);
        }
        if self.max_mag.map_or(true, |prev| max_mag > prev) {
            self.max_mag = Some(max_mag);
        }
        self.sources.push(src);
        Ok(())
    }

    /// Recount the ruptures if the cache is empty or `force` is set
    pub fn count_ruptures(&mut self, force: bool) -> u64 {
        if self.num_ruptures == 0 || force {
            self.num_ruptures = self.sources.iter().map(Source::count_ruptures).sum();
        }
        self.num_ruptures
    }

    /// Check that `sources` may replace the content of the group: same TRT,
    /// no repeated source ID
    pub fn check_replacement(&self, sources: &[S]) -> Result<()> {
        let mut seen = HashSet::with_capacity(sources.len());
        for src in sources {
            if src.tectonic_region_type() != self.trt {
                return Err(CompositeError::TrtMismatch {
                    expected: self.trt.clone(),
                    found: src.tectonic_region_type().to_string(),
                    source_id: src.source_id().to_string(),
                });
            }
            if !seen.insert(src.source_id()) {
                return Err(CompositeError::DuplicatedId {
                    source_id: src.source_id().to_string(),
                    scope: format!("group {}", self.id),
                });
            }
        }
        Ok(())
    }

    /// Replace the sources wholesale, returning the old ones
    ///
    /// The ID and TRT are kept and the magnitude range is recomputed from the
    /// new sources. The rupture count is left for `count_ruptures(true)`.
    pub fn replace_sources(&mut self, sources: Vec<S>) -> Result<Vec<S>> {
        self.check_replacement(&sources)?;
        self.min_mag = None;
        self.max_mag = None;
        for src in &sources {
            let (min_mag, max_mag) = src.min_max_mag();
            self.min_mag = Some(self.min_mag.map_or(min_mag, |prev| prev.min(min_mag)));
            self.max_mag = Some(self.max_mag.map_or(max_mag, |prev| prev.max(max_mag)));
        }
        Ok(std::mem::replace(&mut self.sources, sources))
    }

    /// Tag every source with the group ID
    pub fn tag_sources(&mut self) {
        let id = self.id;
        for src in &mut self.sources {
            src.set_group_id(id);
        }
    }
}

impl<S> SourceGroup<S> {
    /// Sources in the group
    pub fn sources(&self) -> &[S] {
        &self.sources
    }

    /// Iterate over the sources
    pub fn iter(&self) -> std::slice::Iter<'_, S> {
        self.sources.iter()
    }

    /// Number of sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// True if the group holds no sources
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Deterministic ordering: fewer sources first, then by TRT
    pub fn ordering(&self, other: &Self) -> Ordering {
        self.len()
            .cmp(&other.len())
            .then_with(|| self.trt.cmp(&other.trt))
    }

    /// Copy of the group without sources
    pub fn skeleton(&self) -> Self {
        Self {
            trt: self.trt.clone(),
            sources: Vec::new(),
            num_ruptures: self.num_ruptures,
            min_mag: self.min_mag,
            max_mag: self.max_mag,
            gsims: self.gsims.clone(),
            id: self.id,
        }
    }
}

impl<'a, S> IntoIterator for &'a SourceGroup<S> {
    type Item = &'a S;
    type IntoIter = std::slice::Iter<'a, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.sources.iter()
    }
}

impl<S> std::ops::Index<usize> for SourceGroup<S> {
    type Output = S;

    fn index(&self, i: usize) -> &S {
        &self.sources[i]
    }
}

impl<S> fmt::Display for SourceGroup<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<SourceGroup #{} {}, {} source(s), {} rupture(s)>",
            self.id,
            self.trt,
            self.sources.len(),
            self.num_ruptures
        )
    }
}

/// A branch of the source model logic tree
#[derive(Debug, Clone)]
pub struct SourceModel<S> {
    /// Source model name
    pub name: String,
    /// Branch weight
    pub weight: f64,
    /// Logic tree path identifying the branch
    pub path: Vec<String>,
    /// Source groups, one per tectonic region type
    pub groups: Vec<SourceGroup<S>>,
    /// GSIM logic tree of the branch
    pub gsim_lt: BoxedChoiceTree,
    /// Ordinal of the branch
    pub ordinal: usize,
    /// How many times the branch is sampled
    pub samples: usize,
}

impl<S> SourceModel<S> {
    /// Path joined with underscores
    pub fn path_str(&self) -> String {
        self.path.join("_")
    }

    /// True if the branch is drawn more than once
    pub fn is_oversampled(&self) -> bool {
        self.samples > 1
    }

    /// Copy of the model with all groups emptied
    pub fn skeleton(&self) -> Self {
        Self {
            name: self.name.clone(),
            weight: self.weight,
            path: self.path.clone(),
            groups: self.groups.iter().map(SourceGroup::skeleton).collect(),
            gsim_lt: self.gsim_lt.clone(),
            ordinal: self.ordinal,
            samples: self.samples,
        }
    }

    /// Total number of sources
    pub fn num_sources(&self) -> usize {
        self.groups.iter().map(SourceGroup::len).sum()
    }
}
