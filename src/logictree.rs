//! GSIM logic trees
//!
//! ## Table of Contents
//! - **ChoiceTree**: Trait for the per-model tree of ground-motion alternatives
//! - **ChoicePath**: One fully resolved path through a choice tree
//! - **Branch**: A weighted alternative within a branch set
//! - **BranchSetTree**: In-memory tree with one branch set per tectonic region type

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{CompositeError, Result};

/// Shared, immutable choice tree
pub type BoxedChoiceTree = Arc<dyn ChoiceTree>;

/// A fully resolved path through a choice tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoicePath {
    /// Branch IDs along the path
    pub branch_ids: Vec<String>,
    /// Selected GSIM per tectonic region type
    pub choices: BTreeMap<String, String>,
    /// Path probability
    pub weight: f64,
}

impl ChoicePath {
    /// Create a path with the given weight
    pub fn new(weight: f64) -> Self {
        Self {
            branch_ids: Vec::new(),
            choices: BTreeMap::new(),
            weight,
        }
    }

    /// Add a selected branch for a tectonic region type
    pub fn with_choice(
        mut self,
        trt: impl Into<String>,
        branch_id: impl Into<String>,
        gsim: impl Into<String>,
    ) -> Self {
        self.branch_ids.push(branch_id.into());
        self.choices.insert(trt.into(), gsim.into());
        self
    }

    /// Unique identifier of the path
    pub fn uid(&self) -> String {
        self.branch_ids.join("_")
    }

    /// GSIM selected for the given tectonic region type
    pub fn gsim(&self, trt: &str) -> Option<&str> {
        self.choices.get(trt).map(String::as_str)
    }
}

/// Tree of ground-motion alternatives attached to a source model
///
/// Implementations must be cheap to share: a composite model hands the same
/// tree to every skeleton copy, and [`ChoiceTree::reduce`] builds a new tree
/// instead of mutating the shared one.
pub trait ChoiceTree: fmt::Debug + Send + Sync {
    /// Tectonic region types the tree has branch sets for
    fn tectonic_region_types(&self) -> BTreeSet<String>;

    /// Every path with its probability, each exactly once
    fn enumerate_paths(&self) -> Vec<ChoicePath>;

    /// Draw `n` paths with repetition
    fn sample_paths(&self, n: usize, rng: &mut StdRng) -> Vec<ChoicePath>;

    /// A tree restricted to the given tectonic region types
    fn reduce(&self, trts: &BTreeSet<String>) -> BoxedChoiceTree;

    /// Admissible GSIMs for a tectonic region type
    fn values(&self, trt: &str) -> Vec<String>;

    /// Number of distinct paths
    fn num_paths(&self) -> usize;

    /// GSIM chosen by `path` for `trt`, if the tree covers that type
    fn choice_for(&self, path: &ChoicePath, trt: &str) -> Option<String> {
        path.gsim(trt).map(str::to_string)
    }
}

/// A weighted alternative inside a branch set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    /// Branch ID, unique within the tree
    pub id: String,
    /// GSIM name
    pub gsim: String,
    /// Branch probability
    pub weight: f64,
}

impl Branch {
    /// Create a new branch
    pub fn new(id: impl Into<String>, gsim: impl Into<String>, weight: f64) -> Self {
        Self {
            id: id.into(),
            gsim: gsim.into(),
            weight,
        }
    }
}

/// Choice tree with one independent branch set per tectonic region type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchSetTree {
    branch_sets: BTreeMap<String, Vec<Branch>>,
}

impl BranchSetTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the branch set of a tectonic region type
    ///
    /// The set must be non-empty, its weights must add up to one and the
    /// type must not already have a set.
    pub fn with_branch_set(mut self, trt: impl Into<String>, branches: Vec<Branch>) -> Result<Self> {
        let trt = trt.into();
        if self.branch_sets.contains_key(&trt) {
            return Err(CompositeError::logic_tree(format!(
                "duplicated branch set for {}",
                trt
            )));
        }
        if branches.is_empty() {
            return Err(CompositeError::logic_tree(format!(
                "empty branch set for {}",
                trt
            )));
        }
        if let Some(branch) = branches.iter().find(|b| !(b.weight >= 0.0)) {
            return Err(CompositeError::logic_tree(format!(
                "branch {} has invalid weight {}",
                branch.id, branch.weight
            )));
        }
        let total: f64 = branches.iter().map(|b| b.weight).sum();
        if (total - 1.0).abs() > 1e-9 {
            return Err(CompositeError::logic_tree(format!(
                "branch weights for {} sum to {}, not 1",
                trt, total
            )));
        }
        self.branch_sets.insert(trt, branches);
        Ok(self)
    }

    /// Wrap the tree for sharing between source models
    pub fn into_shared(self) -> BoxedChoiceTree {
        Arc::new(self)
    }

    /// Branches of a tectonic region type
    pub fn branches(&self, trt: &str) -> Option<&[Branch]> {
        self.branch_sets.get(trt).map(Vec::as_slice)
    }
}

impl ChoiceTree for BranchSetTree {
    fn tectonic_region_types(&self) -> BTreeSet<String> {
        self.branch_sets.keys().cloned().collect()
    }

    fn enumerate_paths(&self) -> Vec<ChoicePath> {
        if self.branch_sets.is_empty() {
            return Vec::new();
        }
        let mut paths = vec![ChoicePath::new(1.0)];
        for (trt, branches) in &self.branch_sets {
            paths = paths
                .into_iter()
                .flat_map(|path| {
                    branches.iter().map(move |branch| {
                        let mut next = path.clone().with_choice(trt, &branch.id, &branch.gsim);
                        next.weight *= branch.weight;
                        next
                    })
                })
                .collect();
        }
        paths
    }

    fn sample_paths(&self, n: usize, rng: &mut StdRng) -> Vec<ChoicePath> {
        if self.branch_sets.is_empty() {
            return Vec::new();
        }
        let dists: Vec<(&String, &Vec<Branch>, Option<WeightedIndex<f64>>)> = self
            .branch_sets
            .iter()
            .map(|(trt, branches)| {
                let dist = WeightedIndex::new(branches.iter().map(|b| b.weight)).ok();
                (trt, branches, dist)
            })
            .collect();

        (0..n)
            .map(|_| {
                let mut path = ChoicePath::new(1.0);
                for (trt, branches, dist) in &dists {
                    let idx = match dist {
                        Some(d) => d.sample(&mut *rng),
                        None => 0,
                    };
                    let branch = &branches[idx];
                    path = path.with_choice(trt.as_str(), &branch.id, &branch.gsim);
                    path.weight *= branch.weight;
                }
                path
            })
            .collect()
    }

    fn reduce(&self, trts: &BTreeSet<String>) -> BoxedChoiceTree {
        let branch_sets = self
            .branch_sets
            .iter()
            .filter(|(trt, _)| trts.contains(*trt))
            .map(|(trt, branches)| (trt.clone(), branches.clone()))
            .collect();
        Arc::new(Self { branch_sets })
    }

    fn values(&self, trt: &str) -> Vec<String> {
        self.branch_sets
            .get(trt)
            .map(|branches| branches.iter().map(|b| b.gsim.clone()).collect())
            .unwrap_or_default()
    }

    fn num_paths(&self) -> usize {
        if self.branch_sets.is_empty() {
            return 0;
        }
        self.branch_sets.values().map(Vec::len).product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn two_trt_tree() -> BranchSetTree {
        BranchSetTree::new()
            .with_branch_set(
                "Active Shallow Crust",
                vec![
                    Branch::new("b11", "BooreAtkinson2008", 0.6),
                    Branch::new("b12", "ChiouYoungs2008", 0.4),
                ],
            )
            .unwrap()
            .with_branch_set(
                "Stable Continental Crust",
                vec![
                    Branch::new("b21", "Campbell2003", 0.5),
                    Branch::new("b22", "ToroEtAl2002", 0.3),
                    Branch::new("b23", "AtkinsonBoore2006", 0.2),
                ],
            )
            .unwrap()
    }

    #[test]
    fn test_enumerate_is_cartesian_product() {
        let tree = two_trt_tree();
        let paths = tree.enumerate_paths();
        assert_eq!(paths.len(), 6);
        assert_eq!(tree.num_paths(), 6);

        let total: f64 = paths.iter().map(|p| p.weight).sum();
        assert!((total - 1.0).abs() < 1e-12);

        assert_eq!(paths[0].uid(), "b11_b21");
        assert_eq!(paths[0].gsim("Active Shallow Crust"), Some("BooreAtkinson2008"));
        assert!((paths[0].weight - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_sampling_is_reproducible() {
        let tree = two_trt_tree();
        let a = tree.sample_paths(20, &mut StdRng::seed_from_u64(42));
        let b = tree.sample_paths(20, &mut StdRng::seed_from_u64(42));
        assert_eq!(a.len(), 20);
        assert_eq!(a, b);
        assert!(a.iter().all(|p| p.choices.len() == 2));
    }

    #[test]
    fn test_reduce_keeps_original() {
        let tree = two_trt_tree();
        let keep: BTreeSet<String> = ["Stable Continental Crust".to_string()].into();
        let reduced = tree.reduce(&keep);

        assert_eq!(reduced.tectonic_region_types(), keep);
        assert_eq!(reduced.num_paths(), 3);
        assert_eq!(tree.num_paths(), 6);
        assert!(reduced.values("Active Shallow Crust").is_empty());
    }

    #[test]
    fn test_empty_tree_has_no_paths() {
        let tree = BranchSetTree::new();
        assert!(tree.enumerate_paths().is_empty());
        assert!(tree.sample_paths(3, &mut StdRng::seed_from_u64(1)).is_empty());
        assert_eq!(tree.num_paths(), 0);
    }

    #[test]
    fn test_rejects_bad_branch_sets() {
        let unbalanced = BranchSetTree::new()
            .with_branch_set("A", vec![Branch::new("a", "X", 0.7)]);
        assert!(matches!(unbalanced, Err(CompositeError::InvalidLogicTree(_))));

        let empty = BranchSetTree::new().with_branch_set("A", Vec::new());
        assert!(empty.is_err());

        let duplicated = BranchSetTree::new()
            .with_branch_set("A", vec![Branch::new("a", "X", 1.0)])
            .unwrap()
            .with_branch_set("A", vec![Branch::new("b", "Y", 1.0)]);
        assert!(duplicated.is_err());
    }
}
