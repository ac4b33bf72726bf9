//! Composition of a composite source model
//!
//! Collections exist only for oversampled source models: every
//! (group, sample index) pair of such a model receives a collection ID, so
//! that stochastic results produced for one draw can be routed back to the
//! realization that draw belongs to.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::assoc::Realization;
use crate::error::{CompositeError, Result};
use crate::source::SourceModel;
use crate::types::{CollectionId, GroupId};

/// Lightweight description of one source model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    /// Logic tree path
    pub path: Vec<String>,
    /// Source model name
    pub name: String,
    /// IDs of the groups of the model
    pub group_ids: Vec<GroupId>,
    /// Nominal number of realizations (GSIM paths times samples)
    pub num_realizations: usize,
}

/// Immutable snapshot of how collections map onto source groups
#[derive(Debug, Clone, Default)]
pub struct CompositionInfo {
    col_dict: BTreeMap<(GroupId, usize), CollectionId>,
    num_samples: BTreeMap<GroupId, usize>,
    models: Vec<ModelSummary>,
    num_collections: u32,
}

impl CompositionInfo {
    /// Allocate collection IDs for the given source models, in order
    pub fn new<S>(source_models: &[SourceModel<S>]) -> Self {
        let mut info = Self::default();
        let mut col_id = 0u32;
        for sm in source_models {
            if sm.is_oversampled() {
                for group in &sm.groups {
                    info.num_samples.insert(group.id, sm.samples);
                    for idx in 0..sm.samples {
                        info.col_dict.insert((group.id, idx), CollectionId(col_id));
                        col_id += 1;
                    }
                }
            }
            info.models.push(ModelSummary {
                path: sm.path.clone(),
                name: sm.name.clone(),
                group_ids: sm.groups.iter().map(|g| g.id).collect(),
                num_realizations: sm.gsim_lt.num_paths() * sm.samples,
            });
        }
        info.num_collections = col_id;
        info
    }

    /// Total number of collections
    pub fn num_collections(&self) -> u32 {
        self.num_collections
    }

    /// Maximum number of samples among the oversampled models (1 if none)
    pub fn max_samples(&self) -> usize {
        self.num_samples.values().copied().max().unwrap_or(1)
    }

    /// How many times the sources of a group are to be sampled
    pub fn num_samples(&self, group_id: GroupId) -> usize {
        self.num_samples.get(&group_id).copied().unwrap_or(1)
    }

    /// Collection of the given group and sample index, if allocated
    pub fn collection_id(&self, group_id: GroupId, idx: usize) -> Option<CollectionId> {
        self.col_dict.get(&(group_id, idx)).copied()
    }

    /// Group a collection belongs to
    pub fn group_of(&self, col_id: CollectionId) -> Result<GroupId> {
        self.col_dict
            .iter()
            .find(|(_, cid)| **cid == col_id)
            .map(|(&(group_id, _), _)| group_id)
            .ok_or(CompositeError::UnknownCollection(col_id))
    }

    /// Collections of a group, by sample index
    pub fn collections_of(&self, group_id: GroupId) -> Vec<CollectionId> {
        self.col_dict
            .range((group_id, 0)..=(group_id, usize::MAX))
            .map(|(_, &cid)| cid)
            .collect()
    }

    /// Triples (group, sample index, collection) ordered by group and index
    pub fn triples(&self) -> impl Iterator<Item = (GroupId, usize, CollectionId)> + '_ {
        self.col_dict
            .iter()
            .map(|(&(group_id, idx), &col_id)| (group_id, idx, col_id))
    }

    /// Groups whose results are relevant for a realization
    pub fn relevant_groups(&self, rlz: &Realization) -> Vec<GroupId> {
        if !rlz.col_ids.is_empty() {
            let mut groups: Vec<GroupId> = rlz
                .col_ids
                .iter()
                .filter_map(|&col| self.group_of(col).ok())
                .collect();
            groups.dedup();
            return groups;
        }
        self.models
            .iter()
            .filter(|m| m.path == rlz.sm_lt_path)
            .flat_map(|m| m.group_ids.iter().copied())
            .collect()
    }

    /// Summaries of the source models
    pub fn models(&self) -> &[ModelSummary] {
        &self.models
    }
}

impl fmt::Display for CompositionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "<CompositionInfo")?;
        for model in &self.models {
            let ids: Vec<String> = model.group_ids.iter().map(GroupId::to_string).collect();
            writeln!(
                f,
                "{}, {}, trt=[{}]: {} realization(s)",
                model.path.join("_"),
                model.name,
                ids.join(", "),
                model.num_realizations
            )?;
        }
        write!(f, ">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logictree::{Branch, BranchSetTree};
    use crate::source::SourceGroup;
    use crate::testing::FakeSource;

    fn model(ordinal: usize, samples: usize, first_group: u32, num_groups: u32) -> SourceModel<FakeSource> {
        let tree = BranchSetTree::new()
            .with_branch_set("T", vec![Branch::new("b1", "G1", 1.0)])
            .unwrap();
        SourceModel {
            name: format!("sm{}", ordinal),
            weight: 0.25,
            path: vec![format!("b{}", ordinal)],
            groups: (first_group..first_group + num_groups)
                .map(|id| SourceGroup::new("T").with_id(GroupId(id)))
                .collect(),
            gsim_lt: tree.into_shared(),
            ordinal,
            samples,
        }
    }

    #[test]
    fn test_collection_ids_are_contiguous() {
        // samples [1, 3, 1, 2]
        let models = vec![
            model(0, 1, 1, 2),
            model(1, 3, 3, 2),
            model(2, 1, 5, 1),
            model(3, 2, 6, 3),
        ];
        let info = CompositionInfo::new(&models);

        assert_eq!(info.num_collections(), 3 * 2 + 2 * 3);
        let triples: Vec<(u32, usize, u32)> = info
            .triples()
            .map(|(g, i, c)| (g.0, i, c.0))
            .collect();
        assert_eq!(
            triples,
            vec![
                (3, 0, 0),
                (3, 1, 1),
                (3, 2, 2),
                (4, 0, 3),
                (4, 1, 4),
                (4, 2, 5),
                (6, 0, 6),
                (6, 1, 7),
                (7, 0, 8),
                (7, 1, 9),
                (8, 0, 10),
                (8, 1, 11),
            ]
        );
        assert_eq!(info.collection_id(GroupId(1), 0), None);
        assert_eq!(info.max_samples(), 3);
        assert_eq!(info.num_samples(GroupId(4)), 3);
        assert_eq!(info.num_samples(GroupId(5)), 1);
    }

    #[test]
    fn test_lookups() {
        let info = CompositionInfo::new(&[model(0, 2, 1, 2)]);

        assert_eq!(info.group_of(CollectionId(3)).unwrap(), GroupId(2));
        assert!(matches!(
            info.group_of(CollectionId(9)),
            Err(CompositeError::UnknownCollection(_))
        ));
        assert_eq!(
            info.collections_of(GroupId(2)),
            vec![CollectionId(2), CollectionId(3)]
        );
        assert!(info.collections_of(GroupId(7)).is_empty());
    }

    #[test]
    fn test_no_collections_without_oversampling() {
        let info = CompositionInfo::new(&[model(0, 1, 1, 3), model(1, 1, 4, 1)]);
        assert_eq!(info.num_collections(), 0);
        assert_eq!(info.max_samples(), 1);
        assert_eq!(info.models().len(), 2);
        assert_eq!(info.models()[0].group_ids.len(), 3);
    }

    #[test]
    fn test_display() {
        let info = CompositionInfo::new(&[model(0, 2, 1, 1)]);
        let text = info.to_string();
        assert!(text.contains("b0, sm0, trt=[1]: 2 realization(s)"));
    }
}
